// crates/server/src/jobs/registry.rs
//! In-memory store of all known jobs, persisted to a single JSON file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};

use super::types::{CompactJobView, JobInfo, JobRecord};
use super::JobsError;

/// Records whose `start` is older than this are evicted by [`JobRegistry::cleanup`].
pub const RETENTION_HOURS: i64 = 7 * 24;

/// Outcome of [`JobRegistry::clear_if_finished`].
#[derive(Debug)]
pub enum ClearOutcome {
    NotFound,
    Removed(JobRecord),
    Unfinished(JobRecord),
}

/// Single source of truth for job state.
///
/// All operations serialize on one `RwLock`. Workers never touch the map
/// directly; they push snapshots through the [`JobUpdater`] returned by
/// `register`.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobRecord>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                e.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobRecord>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!("RwLock poisoned writing jobs map: {e}");
                e.into_inner()
            }
        }
    }

    /// Store `job`, replacing any record with the same id, and hand out the
    /// update channel for it.
    pub fn register(self: &Arc<Self>, job: JobRecord) -> JobUpdater {
        let id = job.id().to_string();
        self.write().insert(id.clone(), job);
        JobUpdater {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Like [`register`](Self::register), but refuses to add a second
    /// unfinished job of the same type for the same corpus. The check and the
    /// insert happen under one lock.
    pub fn register_exclusive(self: &Arc<Self>, job: JobRecord) -> Result<JobUpdater, JobsError> {
        let id = job.id().to_string();
        {
            let mut jobs = self.write();
            if jobs.contains_key(&id) {
                return Err(JobsError::IdAllocation);
            }
            if let Some(running) = find_unfinished_in(&jobs, &job.meta().corpus_id, job.job_type()) {
                return Err(JobsError::AlreadyRunning {
                    corpus_id: running.meta().corpus_id.clone(),
                    job_type: running.job_type().to_string(),
                    id: running.id().to_string(),
                });
            }
            jobs.insert(id.clone(), job);
        }
        Ok(JobUpdater {
            registry: Arc::clone(self),
            id,
        })
    }

    /// Overwrite the stored record with a worker's snapshot.
    ///
    /// Snapshots for removed jobs are dropped, and so is a snapshot that
    /// would turn a finished record back into an unfinished one.
    fn apply_update(&self, id: &str, job: JobRecord) -> bool {
        let mut jobs = self.write();
        match jobs.get_mut(id) {
            Some(current) if current.is_finished() && !job.is_finished() => false,
            Some(current) => {
                *current = job;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.read().get(id).cloned()
    }

    /// First unfinished job of `job_type` for `corpus_id`, in map order.
    pub fn find_unfinished(&self, corpus_id: &str, job_type: &str) -> Option<JobRecord> {
        find_unfinished_in(&self.read(), corpus_id, job_type).cloned()
    }

    /// The only job whose id starts with `prefix`. `None` when nothing or
    /// more than one job matches.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<JobRecord> {
        let jobs = self.read();
        let mut matches = jobs.values().filter(|j| j.id().starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(job), None) => Some(job.clone()),
            _ => None,
        }
    }

    /// Exact id first, then unambiguous prefix.
    pub fn lookup(&self, id_or_prefix: &str) -> Option<JobRecord> {
        self.get(id_or_prefix)
            .or_else(|| self.find_by_prefix(id_or_prefix))
    }

    /// Compact views ordered by start time.
    pub fn list_compact(&self) -> Vec<CompactJobView> {
        let mut views: Vec<CompactJobView> = self.read().values().map(|j| j.compact()).collect();
        views.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        views
    }

    pub fn unfinished(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self
            .read()
            .values()
            .filter(|j| !j.is_finished())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.meta().start.cmp(&b.meta().start));
        jobs
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn remove(&self, id: &str) -> Option<JobRecord> {
        self.write().remove(id)
    }

    pub fn clear_if_finished(&self, id: &str) -> ClearOutcome {
        let mut jobs = self.write();
        match jobs.get(id) {
            None => ClearOutcome::NotFound,
            Some(job) if !job.is_finished() => ClearOutcome::Unfinished(job.clone()),
            Some(_) => match jobs.remove(id) {
                Some(job) => ClearOutcome::Removed(job),
                None => ClearOutcome::NotFound,
            },
        }
    }

    /// Evict records started more than [`RETENTION_HOURS`] ago, finished or
    /// not. Returns the number of evicted records.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let retention = Duration::hours(RETENTION_HOURS);
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| now.signed_duration_since(job.meta().start) <= retention);
        let removed = before - jobs.len();
        if removed > 0 {
            tracing::info!(removed, "evicted old job records");
        }
        removed
    }

    /// Write all records to `path` (temp file, then rename).
    pub async fn persist(&self, path: &Path) -> Result<(), JobsError> {
        let mut records: Vec<JobRecord> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.meta().start.cmp(&b.meta().start));
        let data = serde_json::to_vec_pretty(&records)?;

        let tmp = tmp_path(path);
        let persist_err = |source| JobsError::Persist {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(persist_err)?;
        }
        tokio::fs::write(&tmp, &data).await.map_err(persist_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(persist_err)?;
        tracing::info!(path = %path.display(), count = records.len(), "job registry saved");
        Ok(())
    }

    /// Load a registry saved by [`persist`](Self::persist). A missing or
    /// unreadable file yields an empty registry.
    pub async fn restore(path: &Path) -> Self {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no job status file, starting empty");
                return Self::new();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read job status file, starting empty");
                return Self::new();
            }
        };
        match serde_json::from_slice::<Vec<JobRecord>>(&data) {
            Ok(records) => {
                tracing::info!(path = %path.display(), count = records.len(), "job registry restored");
                Self {
                    jobs: RwLock::new(
                        records
                            .into_iter()
                            .map(|j| (j.id().to_string(), j))
                            .collect(),
                    ),
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt job status file, starting empty");
                Self::new()
            }
        }
    }
}

fn find_unfinished_in<'a>(
    jobs: &'a HashMap<String, JobRecord>,
    corpus_id: &str,
    job_type: &str,
) -> Option<&'a JobRecord> {
    jobs.values().find(|j| {
        !j.is_finished() && j.meta().corpus_id == corpus_id && j.job_type() == job_type
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write side of one job's record. Only the job's worker holds it.
pub struct JobUpdater {
    registry: Arc<JobRegistry>,
    id: String,
}

impl JobUpdater {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Replace the stored record with `job`. Visible to readers immediately.
    pub fn send(&self, job: impl Into<JobRecord>) {
        if !self.registry.apply_update(&self.id, job.into()) {
            tracing::debug!(job_id = %self.id, "job update dropped");
        }
    }
}
