// crates/server/src/routes/corpora.rs
//! Corpus data maintenance.
//!
//! - POST /corpora/{corpusId}/_syncData - Copy corpus data from the source
//!   to the target directory in the background (201)

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use crate::error::ApiResult;
use crate::jobs::{CompactJobView, JobInfo};
use crate::state::AppState;

/// POST /api/corpora/{corpusId}/_syncData
async fn sync_data(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
) -> ApiResult<(StatusCode, Json<CompactJobView>)> {
    let job = state.maintenance.start_corpus_sync(&corpus_id)?;
    tracing::info!(job_id = %job.id(), corpus_id = %corpus_id, "corpus sync started");
    Ok((StatusCode::CREATED, Json(job.compact())))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/corpora/{corpus_id}/_syncData", post(sync_data))
}
