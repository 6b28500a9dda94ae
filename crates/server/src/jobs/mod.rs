// crates/server/src/jobs/mod.rs
//! Background job system.
//!
//! Provides:
//! - `JobRecord` and its per-kind payloads, persisted with a `type` tag
//! - `JobRegistry`, the single owner of job state
//! - `ExtractionRunner` for attribute extraction with stop and restart
//! - `MaintenanceRunner` for index updates and corpus sync

pub mod install;
pub mod maintenance;
pub mod registry;
pub mod runner;
pub mod types;

pub use install::Installer;
pub use maintenance::MaintenanceRunner;
pub use registry::{ClearOutcome, JobRegistry, JobUpdater};
pub use runner::ExtractionRunner;
pub use types::{CompactJobView, JobInfo, JobRecord};

use std::path::PathBuf;

use corpadm_core::ExtractionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("job {id} ({job_type}) is already running for corpus {corpus_id}")]
    AlreadyRunning {
        corpus_id: String,
        job_type: String,
        id: String,
    },

    #[error("failed to allocate a unique job id")]
    IdAllocation,

    #[error("job {id} reached the maximum number of restarts ({max})")]
    RestartLimit { id: String, max: u32 },

    #[error("job {0} is still running")]
    StillRunning(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Cannot write job status file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot encode job status data: {0}")]
    Encode(#[from] serde_json::Error),
}

pub(crate) fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Reset `job` for another run: same id and start, one more restart.
pub(crate) fn prepare_restart<J: JobInfo>(job: &mut J, max_num_restarts: u32) -> Result<(), JobsError> {
    let meta = job.meta_mut();
    if meta.num_restarts >= max_num_restarts {
        return Err(JobsError::RestartLimit {
            id: meta.id.clone(),
            max: max_num_restarts,
        });
    }
    meta.num_restarts += 1;
    meta.finished = false;
    meta.error = None;
    meta.touch();
    Ok(())
}

/// Restart every unfinished job found in the registry at startup.
///
/// Such jobs were cut off by a crash or a shutdown. Jobs that cannot be
/// restarted, including those at the restart limit, are dropped from the
/// registry. Returns the number of restarted jobs.
pub async fn resubmit_orphaned_jobs(
    registry: &JobRegistry,
    extraction: &std::sync::Arc<ExtractionRunner>,
    maintenance: &MaintenanceRunner,
) -> usize {
    let mut restarted = 0;
    for job in registry.unfinished() {
        let id = job.id().to_string();
        let result = match job {
            JobRecord::Extraction(j) => extraction.restart(j).await.map(|_| ()),
            JobRecord::IndexUpdate(j) => maintenance.restart_index_update(j).map(|_| ()),
            JobRecord::CorpusSync(j) => maintenance.restart_corpus_sync(j).map(|_| ()),
        };
        match result {
            Ok(()) => restarted += 1,
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "orphaned job discarded");
                registry.remove(&id);
            }
        }
    }
    if restarted > 0 {
        tracing::info!(restarted, "orphaned jobs resubmitted");
    }
    restarted
}
