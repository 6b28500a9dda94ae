// crates/server/src/jobs/types.rs
//! Job records: the shared metadata block, one struct per job kind, and the
//! tagged [`JobRecord`] that the registry stores and persists.

use chrono::{DateTime, Utc};
use corpadm_core::ExtractionConf;
use corpadm_db::IndexUpdateOutcome;
use serde::{Deserialize, Serialize};

pub const EXTRACTION_JOB: &str = "liveattrs";
pub const INDEX_UPDATE_JOB: &str = "liveattrs-idx-update";
pub const CORPUS_SYNC_JOB: &str = "sync-corpus";

/// Terminal error of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Identity and lifecycle fields common to every job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    pub id: String,
    pub corpus_id: String,
    pub start: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default)]
    pub num_restarts: u32,
}

impl JobMeta {
    pub fn new(id: impl Into<String>, corpus_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            corpus_id: corpus_id.into(),
            start: now,
            last_update: now,
            finished: false,
            error: None,
            num_restarts: 0,
        }
    }

    /// Advance `last_update`. Never moves it before `start`.
    pub fn touch(&mut self) {
        self.last_update = Utc::now().max(self.start);
    }

    /// Record a terminal error and finish the job.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(JobError::new(message));
        self.finished = true;
        self.touch();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionArgs {
    pub conf: ExtractionConf,
    #[serde(default)]
    pub append: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub processed_atoms: u64,
    pub processed_lines: u64,
}

/// Attribute extraction over the vertical files of one corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    pub args: ExtractionArgs,
    #[serde(default)]
    pub result: ExtractionResult,
}

impl ExtractionJob {
    pub fn new(id: impl Into<String>, args: ExtractionArgs) -> Self {
        Self {
            meta: JobMeta::new(id, args.conf.corpus.clone()),
            args,
            result: ExtractionResult::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexUpdateArgs {
    pub max_columns: usize,
}

/// Usage-driven index maintenance for one corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexUpdateJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    pub args: IndexUpdateArgs,
    #[serde(default)]
    pub result: IndexUpdateOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusSyncArgs {
    pub source_dir: String,
    pub target_dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusSyncResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub output: String,
}

/// Copy of one corpus's data directory from the source to the target tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusSyncJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    pub args: CorpusSyncArgs,
    #[serde(default)]
    pub result: CorpusSyncResult,
}

/// Any job known to the registry, tagged by its kind on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobRecord {
    #[serde(rename = "liveattrs")]
    Extraction(ExtractionJob),
    #[serde(rename = "liveattrs-idx-update")]
    IndexUpdate(IndexUpdateJob),
    #[serde(rename = "sync-corpus")]
    CorpusSync(CorpusSyncJob),
}

/// Reduced projection used in job listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactJobView {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub corpus_id: String,
    pub start: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub finished: bool,
    pub ok: bool,
}

/// Capabilities shared by all job kinds.
pub trait JobInfo {
    fn meta(&self) -> &JobMeta;
    fn meta_mut(&mut self) -> &mut JobMeta;
    fn job_type(&self) -> &'static str;

    /// False when the kind-specific result reports a partial failure.
    fn result_ok(&self) -> bool {
        true
    }

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn is_finished(&self) -> bool {
        self.meta().finished
    }

    fn set_finished(&mut self) {
        let meta = self.meta_mut();
        meta.finished = true;
        meta.touch();
    }

    fn compact(&self) -> CompactJobView {
        let meta = self.meta();
        CompactJobView {
            id: meta.id.clone(),
            job_type: self.job_type().to_string(),
            corpus_id: meta.corpus_id.clone(),
            start: meta.start,
            last_update: meta.last_update,
            finished: meta.finished,
            ok: meta.error.is_none() && self.result_ok(),
        }
    }
}

impl JobInfo for ExtractionJob {
    fn meta(&self) -> &JobMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut JobMeta {
        &mut self.meta
    }

    fn job_type(&self) -> &'static str {
        EXTRACTION_JOB
    }
}

impl JobInfo for IndexUpdateJob {
    fn meta(&self) -> &JobMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut JobMeta {
        &mut self.meta
    }

    fn job_type(&self) -> &'static str {
        INDEX_UPDATE_JOB
    }
}

impl JobInfo for CorpusSyncJob {
    fn meta(&self) -> &JobMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut JobMeta {
        &mut self.meta
    }

    fn job_type(&self) -> &'static str {
        CORPUS_SYNC_JOB
    }

    fn result_ok(&self) -> bool {
        // An unfinished sync has no verdict yet.
        !self.meta.finished || self.result.ok
    }
}

impl JobInfo for JobRecord {
    fn meta(&self) -> &JobMeta {
        match self {
            JobRecord::Extraction(j) => &j.meta,
            JobRecord::IndexUpdate(j) => &j.meta,
            JobRecord::CorpusSync(j) => &j.meta,
        }
    }

    fn meta_mut(&mut self) -> &mut JobMeta {
        match self {
            JobRecord::Extraction(j) => &mut j.meta,
            JobRecord::IndexUpdate(j) => &mut j.meta,
            JobRecord::CorpusSync(j) => &mut j.meta,
        }
    }

    fn job_type(&self) -> &'static str {
        match self {
            JobRecord::Extraction(j) => j.job_type(),
            JobRecord::IndexUpdate(j) => j.job_type(),
            JobRecord::CorpusSync(j) => j.job_type(),
        }
    }

    fn result_ok(&self) -> bool {
        match self {
            JobRecord::Extraction(j) => j.result_ok(),
            JobRecord::IndexUpdate(j) => j.result_ok(),
            JobRecord::CorpusSync(j) => j.result_ok(),
        }
    }
}

impl From<ExtractionJob> for JobRecord {
    fn from(job: ExtractionJob) -> Self {
        JobRecord::Extraction(job)
    }
}

impl From<IndexUpdateJob> for JobRecord {
    fn from(job: IndexUpdateJob) -> Self {
        JobRecord::IndexUpdate(job)
    }
}

impl From<CorpusSyncJob> for JobRecord {
    fn from(job: CorpusSyncJob) -> Self {
        JobRecord::CorpusSync(job)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use corpadm_core::{create_conf, ConfRequest, CorpusInfo};
    use std::collections::BTreeMap;

    pub(crate) fn sample_conf(corpus: &str) -> ExtractionConf {
        let info = CorpusInfo {
            name: corpus.to_string(),
            subcorp_attrs: BTreeMap::from([(
                "doc".to_string(),
                vec!["author".to_string(), "title".to_string()],
            )]),
            indexed_structs: vec!["doc".to_string()],
            ..Default::default()
        };
        create_conf(&info, &ConfRequest::default()).unwrap()
    }

    pub(crate) fn extraction_job(id: &str, corpus: &str) -> ExtractionJob {
        ExtractionJob::new(
            id,
            ExtractionArgs {
                conf: sample_conf(corpus),
                append: false,
            },
        )
    }

    #[test]
    fn test_record_roundtrip_keeps_variant() {
        let mut job = extraction_job("a1b2", "syn2020");
        job.result.processed_lines = 42;
        let idx = IndexUpdateJob {
            meta: JobMeta::new("c3d4", "syn2020"),
            args: IndexUpdateArgs { max_columns: 5 },
            result: IndexUpdateOutcome::default(),
        };
        let records = vec![JobRecord::from(job), JobRecord::from(idx)];

        let json = serde_json::to_string(&records).unwrap();
        let back: Vec<JobRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, records);
        assert!(matches!(back[0], JobRecord::Extraction(_)));
        assert!(matches!(back[1], JobRecord::IndexUpdate(_)));
    }

    #[test]
    fn test_record_wire_shape() {
        let job = JobRecord::from(extraction_job("a1b2", "syn2020"));
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "liveattrs");
        assert_eq!(value["id"], "a1b2");
        assert_eq!(value["corpusId"], "syn2020");
        assert_eq!(value["numRestarts"], 0);
        assert_eq!(value["args"]["conf"]["corpus"], "syn2020");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type":"mystery","id":"x","corpusId":"c","start":"2024-01-01T00:00:00Z","lastUpdate":"2024-01-01T00:00:00Z","finished":true}"#;
        assert!(serde_json::from_str::<JobRecord>(json).is_err());
    }

    #[test]
    fn test_compact_ok_reflects_error() {
        let mut job = extraction_job("a1b2", "syn2020");
        assert!(job.compact().ok);
        job.meta.fail("broken vertical");
        let view = job.compact();
        assert!(!view.ok);
        assert!(view.finished);
        assert_eq!(view.job_type, "liveattrs");
    }

    #[test]
    fn test_compact_ok_reflects_sync_result() {
        let mut job = CorpusSyncJob {
            meta: JobMeta::new("s1", "syn2020"),
            args: CorpusSyncArgs {
                source_dir: "/src/syn2020/".into(),
                target_dir: "/dst/syn2020/".into(),
            },
            result: CorpusSyncResult::default(),
        };
        assert!(job.compact().ok);
        job.set_finished();
        assert!(!job.compact().ok);
        job.result.ok = true;
        assert!(JobRecord::from(job).compact().ok);
    }

    #[test]
    fn test_last_update_not_before_start() {
        let mut meta = JobMeta::new("x", "c");
        meta.touch();
        assert!(meta.last_update >= meta.start);
    }
}
