// crates/server/src/routes/mod.rs
//! API route handlers for the corpus admin server.

pub mod corpora;
pub mod health;
pub mod jobs;
pub mod liveattrs;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET    /api/health - Health check
/// - GET    /api/jobs - Compact list of all jobs
/// - GET    /api/jobs/{jobId} - Full job record (id or unique prefix)
/// - DELETE /api/jobs/{jobId} - Stop and remove a job
/// - GET    /api/jobs/{jobId}/clearIfFinished - Remove a finished job
/// - POST   /api/jobs/{jobId}/stop - Stop a running extraction
/// - POST   /api/liveAttributes/{corpusId}/data - Start an extraction
/// - GET    /api/liveAttributes/{corpusId}/conf - Stored extraction configuration
/// - POST   /api/liveAttributes/{corpusId}/query - Attribute value query
/// - POST   /api/liveAttributes/{corpusId}/attrValAutocomplete - Autocomplete query
/// - POST   /api/liveAttributes/{corpusId}/selectionSubcSize - Subcorpus size
/// - POST   /api/liveAttributes/{corpusId}/getBibliography - Bibliography item
/// - POST   /api/liveAttributes/{corpusId}/findBibTitles - Bibliography labels
/// - POST   /api/liveAttributes/{corpusId}/fillAttrs - Complete attributes from a known value
/// - GET    /api/liveAttributes/{corpusId}/stats - Attribute usage
/// - POST   /api/liveAttributes/{corpusId}/updateIndexes - Start an index update
/// - POST   /api/corpora/{corpusId}/_syncData - Start a corpus data sync
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", liveattrs::router())
        .nest("/api", corpora::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;

    #[tokio::test]
    async fn test_api_routes_creation() {
        let (state, _rx) = test_state().await;
        let _router = api_routes(state);
    }
}
