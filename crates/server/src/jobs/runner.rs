// crates/server/src/jobs/runner.rs
//! Runs attribute extraction jobs: one background worker per job, fed by the
//! extractor's progress stream and stopped through a per-job cancellation
//! token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use corpadm_core::{ExtractionConf, ExtractionProgress, Extractor};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::install::Installer;
use super::registry::{JobRegistry, JobUpdater};
use super::types::{ExtractionArgs, ExtractionJob, JobInfo};
use super::{new_job_id, prepare_restart, JobsError};

/// Error recorded on a job stopped on request.
pub const INTERRUPTED_MESSAGE: &str = "extraction interrupted";

pub struct ExtractionRunner {
    registry: Arc<JobRegistry>,
    extractor: Arc<dyn Extractor>,
    installer: Installer,
    max_num_restarts: u32,
    /// Parent of every job token; cancelled on process shutdown.
    shutdown: CancellationToken,
    signals: Mutex<HashMap<String, CancellationToken>>,
}

enum WorkerExit {
    Done,
    Interrupted,
    ShuttingDown,
}

impl ExtractionRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        extractor: Arc<dyn Extractor>,
        installer: Installer,
        max_num_restarts: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            extractor,
            installer,
            max_num_restarts,
            shutdown: CancellationToken::new(),
            signals: Mutex::new(HashMap::new()),
        })
    }

    fn signals(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        match self.signals.lock() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!("Mutex poisoned on job signals: {e}");
                e.into_inner()
            }
        }
    }

    /// Start a new extraction of `conf.corpus`.
    ///
    /// Fails with a conflict while another extraction of the same corpus is
    /// unfinished. If the extractor cannot be started the job is unregistered
    /// again.
    pub async fn create(
        self: &Arc<Self>,
        conf: ExtractionConf,
        append: bool,
    ) -> Result<ExtractionJob, JobsError> {
        let job = ExtractionJob::new(new_job_id(), ExtractionArgs { conf, append });
        let updater = self.registry.register_exclusive(job.clone().into())?;
        if let Err(e) = self.launch(job.clone(), updater).await {
            self.registry.remove(job.id());
            return Err(e);
        }
        tracing::info!(job_id = %job.id(), corpus_id = %job.meta.corpus_id, append, "extraction job started");
        Ok(job)
    }

    /// Run `job` again with its original arguments, keeping its id.
    pub async fn restart(self: &Arc<Self>, job: ExtractionJob) -> Result<ExtractionJob, JobsError> {
        if self.signals().contains_key(job.id()) {
            return Err(JobsError::StillRunning(job.id().to_string()));
        }
        let mut job = job;
        prepare_restart(&mut job, self.max_num_restarts)?;
        let updater = self.registry.register(job.clone().into());
        if let Err(e) = self.launch(job.clone(), updater).await {
            let mut failed = job;
            failed.meta.fail(e.to_string());
            self.registry.register(failed.into());
            return Err(e);
        }
        tracing::info!(job_id = %job.id(), num_restarts = job.meta.num_restarts, "extraction job restarted");
        Ok(job)
    }

    async fn launch(self: &Arc<Self>, job: ExtractionJob, updater: JobUpdater) -> Result<(), JobsError> {
        let token = self.shutdown.child_token();
        let progress = self
            .extractor
            .start(&job.args.conf, job.args.append, token.clone())
            .await?;
        self.signals().insert(job.id().to_string(), token.clone());
        tokio::spawn(Arc::clone(self).run_worker(job, updater, progress, token));
        Ok(())
    }

    async fn run_worker(
        self: Arc<Self>,
        mut job: ExtractionJob,
        updater: JobUpdater,
        mut progress: mpsc::Receiver<ExtractionProgress>,
        token: CancellationToken,
    ) {
        let exit = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    if self.shutdown.is_cancelled() {
                        break WorkerExit::ShuttingDown;
                    }
                    break WorkerExit::Interrupted;
                }
                event = progress.recv() => match event {
                    Some(event) => {
                        job.result.processed_atoms = event.processed_atoms;
                        job.result.processed_lines = event.processed_lines;
                        if let Some(err) = event.error {
                            tracing::error!(job_id = %job.id(), error = %err, "extraction failed");
                            job.meta.fail(err);
                            break WorkerExit::Done;
                        }
                        job.meta.touch();
                        updater.send(job.clone());
                    }
                    None => {
                        if let Err(e) = self.installer.install(&job.args.conf).await {
                            tracing::error!(job_id = %job.id(), error = %e, "installation failed");
                            job.meta.fail(e.to_string());
                        } else {
                            job.set_finished();
                        }
                        break WorkerExit::Done;
                    }
                },
            }
        };

        // The signal goes before the final snapshot so that a restart, which
        // needs a finished record, never races with this removal.
        self.signals().remove(job.id());
        match exit {
            WorkerExit::Done => {
                tracing::info!(
                    job_id = %job.id(),
                    processed_lines = job.result.processed_lines,
                    ok = job.meta.error.is_none(),
                    "extraction job finished"
                );
                updater.send(job);
            }
            WorkerExit::Interrupted => {
                tracing::info!(job_id = %job.id(), "extraction job stopped");
                job.meta.fail(INTERRUPTED_MESSAGE);
                updater.send(job);
            }
            WorkerExit::ShuttingDown => {
                // Left unfinished on purpose: the next startup restarts it.
                tracing::info!(job_id = %job.id(), "extraction job suspended by shutdown");
            }
        }
    }

    /// Ask a running extraction to stop. Returns false when `id` has no
    /// running extraction.
    pub fn stop(&self, id: &str) -> bool {
        match self.signals().get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.signals().contains_key(id)
    }

    /// Interrupt every running extraction without finishing its record.
    pub fn shutdown(&self) {
        let running = self.signals().len();
        tracing::info!(running, "stopping extraction jobs for shutdown");
        self.shutdown.cancel();
    }
}
