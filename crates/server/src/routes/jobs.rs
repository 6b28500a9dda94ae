// crates/server/src/routes/jobs.rs
//! API routes for job management.
//!
//! - GET    /jobs                          - Compact list of all jobs
//! - GET    /jobs/{jobId}                  - Full record by id or unambiguous prefix
//! - DELETE /jobs/{jobId}                  - Stop (if running) and remove
//! - GET    /jobs/{jobId}/clearIfFinished  - Remove only a finished job
//! - POST   /jobs/{jobId}/stop             - Ask a running extraction to stop

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::jobs::{ClearOutcome, CompactJobView, JobInfo, JobRecord};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub cleared: bool,
    pub job: CompactJobView,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    /// False when the job has nothing running to interrupt.
    pub interrupted: bool,
    pub job: CompactJobView,
}

fn find_job(state: &AppState, id: &str) -> ApiResult<JobRecord> {
    state
        .registry
        .lookup(id)
        .ok_or_else(|| ApiError::JobNotFound(id.to_string()))
}

/// GET /api/jobs
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<CompactJobView>> {
    Json(state.registry.list_compact())
}

/// GET /api/jobs/{jobId}
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    Ok(Json(find_job(&state, &job_id)?))
}

/// DELETE /api/jobs/{jobId}
async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CompactJobView>> {
    let job = find_job(&state, &job_id)?;
    if state.extraction.stop(job.id()) {
        tracing::info!(job_id = %job.id(), "running job stopped for removal");
    }
    let removed = state.registry.remove(job.id()).unwrap_or(job);
    Ok(Json(removed.compact()))
}

/// GET /api/jobs/{jobId}/clearIfFinished
async fn clear_if_finished(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ClearResponse>> {
    let job = find_job(&state, &job_id)?;
    match state.registry.clear_if_finished(job.id()) {
        ClearOutcome::Removed(job) => Ok(Json(ClearResponse {
            cleared: true,
            job: job.compact(),
        })),
        ClearOutcome::Unfinished(job) => Ok(Json(ClearResponse {
            cleared: false,
            job: job.compact(),
        })),
        ClearOutcome::NotFound => Err(ApiError::JobNotFound(job_id)),
    }
}

/// POST /api/jobs/{jobId}/stop
async fn stop_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StopResponse>> {
    let job = find_job(&state, &job_id)?;
    let interrupted = match &job {
        JobRecord::Extraction(_) => state.extraction.stop(job.id()),
        _ => false,
    };
    Ok(Json(StopResponse {
        interrupted,
        job: job.compact(),
    }))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}", get(get_job).delete(delete_job))
        .route("/jobs/{job_id}/clearIfFinished", get(clear_if_finished))
        .route("/jobs/{job_id}/stop", post(stop_job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::runner::tests::{wait_for, ScriptedExtractor};
    use crate::jobs::types::tests::extraction_job;
    use crate::state::tests::{test_state, test_state_with};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new().nest("/api", router()).with_state(state)
    }

    #[tokio::test]
    async fn test_list_and_get_by_prefix() {
        let (state, _rx) = test_state().await;
        state.registry.register(extraction_job("abc123", "syn").into());
        state.registry.register(extraction_job("abd456", "syn2").into());

        let (status, body) = send(app(state.clone()), "GET", "/api/jobs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, body) = send(app(state.clone()), "GET", "/api/jobs/abc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "abc123");
        assert_eq!(body["type"], "liveattrs");

        let (status, body) = send(app(state), "GET", "/api/jobs/ab").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Job not found");
    }

    #[tokio::test]
    async fn test_clear_if_finished() {
        let (state, _rx) = test_state().await;
        state.registry.register(extraction_job("running", "syn").into());
        let mut done = extraction_job("done", "syn2");
        done.set_finished();
        state.registry.register(done.into());

        let (status, body) = send(app(state.clone()), "GET", "/api/jobs/running/clearIfFinished").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared"], false);

        let (_, body) = send(app(state.clone()), "GET", "/api/jobs/done/clearIfFinished").await;
        assert_eq!(body["cleared"], true);
        assert!(state.registry.get("done").is_none());
        assert!(state.registry.get("running").is_some());
    }

    #[tokio::test]
    async fn test_stop_and_delete_running_extraction() {
        let (extractor, mut runs) = ScriptedExtractor::new();
        let (state, _rx) = test_state_with(Arc::new(extractor)).await;
        let job = state
            .extraction
            .create(crate::jobs::types::tests::sample_conf("syn"), false)
            .await
            .unwrap();
        let _tx = runs.recv().await.unwrap();

        let (status, body) = send(app(state.clone()), "POST", &format!("/api/jobs/{}/stop", job.id())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["interrupted"], true);
        wait_for(|| state.registry.get(job.id()).unwrap().is_finished()).await;

        let (status, body) = send(app(state.clone()), "DELETE", &format!("/api/jobs/{}", job.id())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], false);
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_stop_non_extraction_is_noop() {
        let (state, _rx) = test_state().await;
        let job = state.maintenance.start_index_update("syn", 2).unwrap();
        let (status, body) = send(app(state), "POST", &format!("/api/jobs/{}/stop", job.id())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["interrupted"], false);
    }
}
