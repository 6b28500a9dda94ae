// crates/server/src/jobs/maintenance.rs
//! Single-shot jobs: usage-driven index updates and corpus data sync.
//!
//! Both register a record, do their work in one background task and report
//! once when done. Neither has a progress stream or a stop signal.

use std::process::Stdio;
use std::sync::Arc;

use corpadm_core::config::CorpusSyncConfig;
use corpadm_db::Database;

use super::registry::{JobRegistry, JobUpdater};
use super::types::{
    CorpusSyncArgs, CorpusSyncJob, CorpusSyncResult, IndexUpdateArgs, IndexUpdateJob, JobInfo,
    JobMeta,
};
use super::{new_job_id, prepare_restart, JobsError};

/// Bytes of sync command output kept in the job result.
const OUTPUT_TAIL_LEN: usize = 4096;

pub struct MaintenanceRunner {
    registry: Arc<JobRegistry>,
    db: Database,
    sync: CorpusSyncConfig,
    max_num_restarts: u32,
}

impl MaintenanceRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        db: Database,
        sync: CorpusSyncConfig,
        max_num_restarts: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            db,
            sync,
            max_num_restarts,
        })
    }

    /// Start an index update of `corpus_id` keeping at most `max_columns`
    /// attribute indexes.
    pub fn start_index_update(&self, corpus_id: &str, max_columns: usize) -> Result<IndexUpdateJob, JobsError> {
        let job = IndexUpdateJob {
            meta: JobMeta::new(new_job_id(), corpus_id),
            args: IndexUpdateArgs { max_columns },
            result: Default::default(),
        };
        let updater = self.registry.register_exclusive(job.clone().into())?;
        self.spawn_index_update(job.clone(), updater);
        Ok(job)
    }

    pub fn restart_index_update(&self, mut job: IndexUpdateJob) -> Result<IndexUpdateJob, JobsError> {
        prepare_restart(&mut job, self.max_num_restarts)?;
        let updater = self.registry.register(job.clone().into());
        self.spawn_index_update(job.clone(), updater);
        Ok(job)
    }

    fn spawn_index_update(&self, mut job: IndexUpdateJob, updater: JobUpdater) {
        let db = self.db.clone();
        tokio::spawn(async move {
            match db.update_indexes(&job.meta.corpus_id, job.args.max_columns).await {
                Ok(outcome) => {
                    job.result = outcome;
                    job.set_finished();
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id(), error = %e, "index update failed");
                    job.meta.fail(e.to_string());
                }
            }
            updater.send(job);
        });
    }

    /// Start copying the data directory of `corpus_id` from the source tree
    /// to the target tree.
    pub fn start_corpus_sync(&self, corpus_id: &str) -> Result<CorpusSyncJob, JobsError> {
        let job = CorpusSyncJob {
            meta: JobMeta::new(new_job_id(), corpus_id),
            args: CorpusSyncArgs {
                source_dir: format!("{}/{corpus_id}/", self.sync.source_dir.display()),
                target_dir: format!("{}/{corpus_id}/", self.sync.target_dir.display()),
            },
            result: CorpusSyncResult::default(),
        };
        let updater = self.registry.register_exclusive(job.clone().into())?;
        self.spawn_corpus_sync(job.clone(), updater);
        Ok(job)
    }

    pub fn restart_corpus_sync(&self, mut job: CorpusSyncJob) -> Result<CorpusSyncJob, JobsError> {
        prepare_restart(&mut job, self.max_num_restarts)?;
        job.result = CorpusSyncResult::default();
        let updater = self.registry.register(job.clone().into());
        self.spawn_corpus_sync(job.clone(), updater);
        Ok(job)
    }

    fn spawn_corpus_sync(&self, mut job: CorpusSyncJob, updater: JobUpdater) {
        let command = self.sync.command.clone();
        let args = self.sync.args.clone();
        tokio::spawn(async move {
            let output = tokio::process::Command::new(&command)
                .args(&args)
                .arg(&job.args.source_dir)
                .arg(&job.args.target_dir)
                .stdin(Stdio::null())
                .output()
                .await;
            match output {
                Ok(output) => {
                    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                    job.result = CorpusSyncResult {
                        ok: output.status.success(),
                        exit_code: output.status.code(),
                        output: tail(&text, OUTPUT_TAIL_LEN).to_string(),
                    };
                    if !job.result.ok {
                        tracing::warn!(job_id = %job.id(), exit_code = ?job.result.exit_code, "corpus sync failed");
                    }
                    job.set_finished();
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id(), command = %command, error = %e, "cannot run sync command");
                    job.meta.fail(format!("cannot run {command}: {e}"));
                }
            }
            updater.send(job);
        });
    }
}

/// Last `max` bytes of `s`, cut at a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::runner::tests::wait_for;
    use crate::jobs::types::JobRecord;
    use pretty_assertions::assert_eq;

    async fn runner(sync: CorpusSyncConfig) -> (Arc<MaintenanceRunner>, Arc<JobRegistry>, Database) {
        let db = Database::new_in_memory().await.unwrap();
        let registry = Arc::new(JobRegistry::new());
        let runner = MaintenanceRunner::new(Arc::clone(&registry), db.clone(), sync, 2);
        (runner, registry, db)
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ščř", 3), "ř");
    }

    #[tokio::test]
    async fn test_index_update_job() {
        let (runner, registry, db) = runner(CorpusSyncConfig::default()).await;
        db.insert_liveattrs_entry("syn", "d1", 10, &[("doc_author", "Čapek")])
            .await
            .unwrap();
        db.record_usage("syn", &["doc.author".to_string()]).await.unwrap();

        let job = runner.start_index_update("syn", 3).unwrap();
        wait_for(|| registry.get(job.id()).unwrap().is_finished()).await;
        let Some(JobRecord::IndexUpdate(done)) = registry.get(job.id()) else {
            panic!("wrong variant");
        };
        assert!(done.meta.error.is_none());
        assert_eq!(done.result.used_indexes, vec!["doc.author"]);
    }

    #[tokio::test]
    async fn test_index_update_failure_recorded() {
        let (runner, registry, _db) = runner(CorpusSyncConfig::default()).await;
        let job = runner.start_index_update("bad name", 3).unwrap();
        wait_for(|| registry.get(job.id()).unwrap().is_finished()).await;
        let view = registry.get(job.id()).unwrap().compact();
        assert!(!view.ok);
    }

    #[tokio::test]
    async fn test_corpus_sync_job() {
        let sync = CorpusSyncConfig {
            command: "sh".into(),
            args: vec!["-c".into(), "echo copying $0 to $1".into()],
            source_dir: "/src".into(),
            target_dir: "/dst".into(),
        };
        let (runner, registry, _db) = runner(sync).await;
        let job = runner.start_corpus_sync("syn").unwrap();
        assert_eq!(job.args.source_dir, "/src/syn/");
        wait_for(|| registry.get(job.id()).unwrap().is_finished()).await;
        let Some(JobRecord::CorpusSync(done)) = registry.get(job.id()) else {
            panic!("wrong variant");
        };
        assert!(done.result.ok);
        assert_eq!(done.result.exit_code, Some(0));
        assert_eq!(done.result.output.trim(), "copying /src/syn/ to /dst/syn/");
        assert!(done.compact().ok);
    }

    #[tokio::test]
    async fn test_corpus_sync_nonzero_exit() {
        let sync = CorpusSyncConfig {
            command: "sh".into(),
            args: vec!["-c".into(), "echo no such dir >&2; exit 23".into()],
            ..CorpusSyncConfig::default()
        };
        let (runner, registry, _db) = runner(sync).await;
        let job = runner.start_corpus_sync("syn").unwrap();
        wait_for(|| registry.get(job.id()).unwrap().is_finished()).await;
        let JobRecord::CorpusSync(done) = registry.get(job.id()).unwrap() else {
            panic!("wrong variant");
        };
        assert!(!done.result.ok);
        assert_eq!(done.result.exit_code, Some(23));
        assert!(done.result.output.contains("no such dir"));
        assert!(done.meta.error.is_none());
        assert!(!done.compact().ok);
    }

    #[tokio::test]
    async fn test_restart_limit() {
        let (runner, registry, _db) = runner(CorpusSyncConfig::default()).await;
        let mut job = runner.start_index_update("syn", 1).unwrap();
        wait_for(|| registry.get(job.id()).unwrap().is_finished()).await;
        job.meta.num_restarts = 2;
        let err = runner.restart_index_update(job).unwrap_err();
        assert!(matches!(err, JobsError::RestartLimit { .. }));
    }
}
