// crates/server/src/routes/health.rs
//! Liveness report: service identity, uptime and how many extraction or
//! index jobs are still running.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub name: String,
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Jobs in the registry that have not finished yet.
    pub running_jobs: usize,
}

/// GET /api/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        running_jobs: state.registry.unfinished().len(),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::tests::extraction_job;
    use crate::state::tests::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn fetch(state: Arc<AppState>) -> HealthResponse {
        let app = router().with_state(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_counts_running_jobs() {
        let (state, _rx) = test_state().await;
        let idle = fetch(state.clone()).await;
        assert_eq!(idle.name, "corpadm-server");
        assert_eq!(idle.status, "ok");
        assert_eq!(idle.running_jobs, 0);

        let _updater = state.registry.register(extraction_job("j1", "syn").into());
        let busy = fetch(state).await;
        assert_eq!(busy.running_jobs, 1);
    }
}
