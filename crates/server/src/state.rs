// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use corpadm_core::{AppConfig, Extractor};
use corpadm_db::Database;

use crate::jobs::{ExtractionRunner, Installer, JobRegistry, MaintenanceRunner};
use crate::liveattrs::{ExtractionConfLoader, QueryCache, UsageRecorder};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: AppConfig,
    /// Metadata store: corpora, extracted rows, usage counters.
    pub db: Database,
    pub registry: Arc<JobRegistry>,
    pub extraction: Arc<ExtractionRunner>,
    pub maintenance: Arc<MaintenanceRunner>,
    pub conf_loader: ExtractionConfLoader,
    pub cache: QueryCache,
    pub usage: UsageRecorder,
}

impl AppState {
    /// Wire up the job runners around `registry` and wrap everything in an
    /// `Arc` for sharing.
    pub fn new(
        config: AppConfig,
        db: Database,
        registry: Arc<JobRegistry>,
        extractor: Arc<dyn Extractor>,
        usage: UsageRecorder,
    ) -> Arc<Self> {
        let installer = Installer::new(
            config.liveattrs.text_types_db_dir_path.clone(),
            config.kontext_soft_reset_url.clone(),
        );
        let extraction = ExtractionRunner::new(
            Arc::clone(&registry),
            extractor,
            installer,
            config.jobs.max_num_restarts,
        );
        let maintenance = MaintenanceRunner::new(
            Arc::clone(&registry),
            db.clone(),
            config.corpus_sync.clone(),
            config.jobs.max_num_restarts,
        );
        Arc::new(Self {
            start_time: Instant::now(),
            conf_loader: ExtractionConfLoader::new(config.liveattrs.conf_dir_path.clone()),
            config,
            db,
            registry,
            extraction,
            maintenance,
            cache: QueryCache::new(),
            usage,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
