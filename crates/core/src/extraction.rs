// crates/core/src/extraction.rs
//! Extraction configuration and the seam to the external extraction tool.
//!
//! The tool turns vertical corpus files into attribute rows. This crate only
//! builds its configuration, starts it, and relays its progress reports.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::corpus::CorpusInfo;
use crate::error::{ConfError, ExtractionError};
use crate::query::import_key;

/// Where extracted rows end up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    /// The shared metadata store queried by this service.
    #[default]
    Shared,
    /// A standalone database file installed into the text types directory.
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTarget {
    pub kind: DbKind,
    pub name: String,
    /// Output file of a file-backed extraction, installed once it completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibView {
    pub id_attr: String,
    pub cols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfJoin {
    pub arg_columns: Vec<String>,
    pub generator_fn: String,
}

/// Immutable input of one extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionConf {
    pub corpus: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_corpus: Option<String>,
    pub atom_structure: String,
    pub structures: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bib_view: Option<BibView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_join: Option<SelfJoin>,
    #[serde(default)]
    pub vertical_files: Vec<String>,
    pub max_num_errors: u32,
    pub encoding: String,
    pub db: DbTarget,
}

impl ExtractionConf {
    /// Subcorpus attributes in dot notation, ordered by structure then
    /// configuration order.
    pub fn subcorp_attrs(&self) -> Vec<String> {
        self.structures
            .iter()
            .flat_map(|(stru, attrs)| attrs.iter().map(move |a| format!("{stru}.{a}")))
            .collect()
    }
}

/// Caller-supplied options for generating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfRequest {
    pub atom_structure: Option<String>,
    /// Dot notation.
    pub bib_id_attr: Option<String>,
    /// Dot notation, e.g. `div.group`.
    pub merge_attrs: Vec<String>,
    pub merge_fn: Option<String>,
    pub db_kind: DbKind,
    /// Directory receiving the output file of a file-backed extraction.
    pub sqlite_output_dir: Option<PathBuf>,
}

/// Generate an extraction configuration from corpus metadata.
pub fn create_conf(corpus: &CorpusInfo, req: &ConfRequest) -> Result<ExtractionConf, ConfError> {
    let mut structures = corpus.subcorp_attrs.clone();

    let bib_view = req
        .bib_id_attr
        .as_deref()
        .filter(|a| !a.is_empty())
        .map(|id_attr| BibView {
            id_attr: import_key(id_attr),
            cols: structures
                .iter()
                .flat_map(|(stru, attrs)| attrs.iter().map(move |a| format!("{stru}_{a}")))
                .collect(),
        });

    let atom_structure = match req.atom_structure.as_deref().filter(|a| !a.is_empty()) {
        Some(atom) => atom.to_string(),
        None => {
            if structures.len() != 1 {
                return Err(ConfError::AtomNotInferable);
            }
            let inferred = structures.keys().next().cloned().unwrap_or_default();
            tracing::info!(corpus = %corpus.name, atom = %inferred, "no atom structure given, inferred");
            inferred
        }
    };
    if !corpus.indexed_structs.contains(&atom_structure) {
        return Err(ConfError::UnknownAtom {
            atom: atom_structure,
            corpus: corpus.name.clone(),
        });
    }

    let self_join = if req.merge_attrs.is_empty() {
        None
    } else {
        let mut arg_columns = Vec::with_capacity(req.merge_attrs.len());
        for merge_attr in &req.merge_attrs {
            let Some((stru, attr)) = merge_attr.split_once('.') else {
                return Err(ConfError::InvalidMergeAttr(merge_attr.clone()));
            };
            if stru.is_empty() || attr.is_empty() || attr.contains('.') {
                return Err(ConfError::InvalidMergeAttr(merge_attr.clone()));
            }
            arg_columns.push(format!("{stru}_{attr}"));
            let attrs = structures.entry(stru.to_string()).or_default();
            if !attrs.iter().any(|a| a == attr) {
                attrs.push(attr.to_string());
            }
        }
        Some(SelfJoin {
            arg_columns,
            generator_fn: req.merge_fn.clone().unwrap_or_else(|| "identity".to_string()),
        })
    };

    Ok(ExtractionConf {
        corpus: corpus.name.clone(),
        parallel_corpus: corpus.parallel_corpus.clone().filter(|p| !p.is_empty()),
        atom_structure,
        structures,
        bib_view,
        self_join,
        vertical_files: corpus.vertical_path.iter().cloned().collect(),
        max_num_errors: 1000,
        encoding: "UTF-8".to_string(),
        db: DbTarget {
            kind: req.db_kind,
            name: corpus.grouped_name().to_string(),
            path: match req.db_kind {
                DbKind::Sqlite => req
                    .sqlite_output_dir
                    .as_ref()
                    .map(|dir| dir.join(format!("{}.db.new", corpus.grouped_name()))),
                DbKind::Shared => None,
            },
        },
    })
}

/// One progress report of a running extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionProgress {
    #[serde(default)]
    pub processed_atoms: u64,
    #[serde(default)]
    pub processed_lines: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Something that can run an extraction and stream its progress.
///
/// `start` fails only if the extraction could not be started at all. Once
/// running, failures arrive as a progress event with `error` set, after which
/// the stream ends. Cancelling `interrupt` stops the extraction; the stream
/// then closes without a further event.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn start(
        &self,
        conf: &ExtractionConf,
        append: bool,
        interrupt: CancellationToken,
    ) -> Result<mpsc::Receiver<ExtractionProgress>, ExtractionError>;
}

/// Runs the extraction tool as a child process.
///
/// Command: `{command} {args..} create {conf.json} [--append]`. The tool
/// prints one JSON progress object per stdout line.
pub struct ProcessExtractor {
    command: String,
    args: Vec<String>,
}

impl ProcessExtractor {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl Extractor for ProcessExtractor {
    async fn start(
        &self,
        conf: &ExtractionConf,
        append: bool,
        interrupt: CancellationToken,
    ) -> Result<mpsc::Receiver<ExtractionProgress>, ExtractionError> {
        let mut conf_file = tempfile::Builder::new()
            .prefix("corpadm-extraction-")
            .suffix(".json")
            .tempfile()?;
        conf_file.write_all(&serde_json::to_vec(conf)?)?;
        conf_file.flush()?;

        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.args(&self.args)
            .arg("create")
            .arg(conf_file.path());
        if append {
            cmd.arg("--append");
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        tracing::info!(
            command = %self.command,
            corpus = %conf.corpus,
            append,
            "extraction: spawning"
        );
        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!(error = %e, "extraction: failed to spawn");
            ExtractionError::SpawnFailed(e.to_string())
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractionError::SpawnFailed("failed to capture stdout".to_string()))?;

        let (tx, rx) = mpsc::channel::<ExtractionProgress>(64);

        tokio::spawn(async move {
            // The tool reads its configuration lazily; keep the file until it exits.
            let _conf_file = conf_file;
            let mut lines = BufReader::new(stdout).lines();
            let mut last = ExtractionProgress::default();

            loop {
                tokio::select! {
                    biased;
                    _ = interrupt.cancelled() => {
                        if let Err(e) = child.kill().await {
                            tracing::warn!(error = %e, "extraction: failed to kill interrupted process");
                        }
                        return;
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) if line.trim().is_empty() => {}
                        Ok(Some(line)) => match serde_json::from_str::<ExtractionProgress>(&line) {
                            Ok(progress) => {
                                last = progress.clone();
                                if tx.send(progress).await.is_err() {
                                    let _ = child.kill().await;
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, line = %line, "extraction: skipping non-progress output");
                            }
                        },
                        Ok(None) => break,
                        Err(e) => {
                            let _ = child.kill().await;
                            let _ = tx
                                .send(ExtractionProgress {
                                    error: Some(format!("failed to read extraction output: {e}")),
                                    ..last
                                })
                                .await;
                            return;
                        }
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    tracing::warn!(exit_code = ?status.code(), "extraction: non-zero exit");
                    if last.error.is_none() {
                        let _ = tx
                            .send(ExtractionProgress {
                                error: Some(format!("extraction process exited with {status}")),
                                ..last
                            })
                            .await;
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(ExtractionProgress {
                            error: Some(format!("failed to wait for extraction process: {e}")),
                            ..last
                        })
                        .await;
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn corpus() -> CorpusInfo {
        CorpusInfo {
            name: "syn2020".into(),
            active: true,
            locale: "cs_CZ".into(),
            subcorp_attrs: BTreeMap::from([(
                "doc".to_string(),
                vec!["author".to_string(), "title".to_string()],
            )]),
            indexed_structs: vec!["doc".into(), "p".into()],
            vertical_path: Some("/corpora/vert/syn2020".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_conf_infers_atom() {
        let conf = create_conf(&corpus(), &ConfRequest::default()).unwrap();
        assert_eq!(conf.atom_structure, "doc");
        assert_eq!(conf.db.name, "syn2020");
        assert_eq!(conf.db.kind, DbKind::Shared);
        assert_eq!(conf.vertical_files, vec!["/corpora/vert/syn2020"]);
        assert_eq!(conf.subcorp_attrs(), vec!["doc.author", "doc.title"]);
        assert!(conf.bib_view.is_none());
    }

    #[test]
    fn test_create_conf_requires_atom_for_many_structures() {
        let mut info = corpus();
        info.subcorp_attrs
            .insert("text".into(), vec!["genre".into()]);
        let err = create_conf(&info, &ConfRequest::default()).unwrap_err();
        assert!(matches!(err, ConfError::AtomNotInferable));

        let req = ConfRequest {
            atom_structure: Some("p".into()),
            ..Default::default()
        };
        assert_eq!(create_conf(&info, &req).unwrap().atom_structure, "p");
    }

    #[test]
    fn test_create_conf_rejects_unindexed_atom() {
        let req = ConfRequest {
            atom_structure: Some("s".into()),
            ..Default::default()
        };
        let err = create_conf(&corpus(), &req).unwrap_err();
        assert!(matches!(err, ConfError::UnknownAtom { .. }));
    }

    #[test]
    fn test_create_conf_bib_view_and_parallel_db() {
        let mut info = corpus();
        info.parallel_corpus = Some("intercorp".into());
        let req = ConfRequest {
            bib_id_attr: Some("doc.id".into()),
            db_kind: DbKind::Sqlite,
            sqlite_output_dir: Some(PathBuf::from("/var/opt/tt")),
            ..Default::default()
        };
        let conf = create_conf(&info, &req).unwrap();
        assert_eq!(conf.db.path, Some(PathBuf::from("/var/opt/tt/intercorp.db.new")));
        assert_eq!(
            conf.bib_view,
            Some(BibView {
                id_attr: "doc_id".into(),
                cols: vec!["doc_author".into(), "doc_title".into()],
            })
        );
        assert_eq!(conf.db.name, "intercorp");
        assert_eq!(conf.db.kind, DbKind::Sqlite);
    }

    #[test]
    fn test_create_conf_merge_attrs() {
        let req = ConfRequest {
            merge_attrs: vec!["doc.group".into(), "doc.author".into()],
            merge_fn: Some("intercorp".into()),
            ..Default::default()
        };
        let conf = create_conf(&corpus(), &req).unwrap();
        let join = conf.self_join.unwrap();
        assert_eq!(join.arg_columns, vec!["doc_group", "doc_author"]);
        assert_eq!(join.generator_fn, "intercorp");
        assert_eq!(conf.structures["doc"], vec!["author", "title", "group"]);

        let bad = ConfRequest {
            merge_attrs: vec!["nodot".into()],
            ..Default::default()
        };
        assert!(matches!(
            create_conf(&corpus(), &bad),
            Err(ConfError::InvalidMergeAttr(_))
        ));
    }

    #[test]
    fn test_conf_json_roundtrip_shape() {
        let conf = create_conf(&corpus(), &ConfRequest::default()).unwrap();
        let json = serde_json::to_value(&conf).unwrap();
        assert_eq!(json["atomStructure"], "doc");
        assert_eq!(json["db"]["kind"], "shared");
        assert!(json.get("bibView").is_none());
    }

    #[tokio::test]
    async fn test_process_extractor_spawn_failure() {
        let extractor = ProcessExtractor::new("/nonexistent/extraction-tool", vec![]);
        let conf = create_conf(&corpus(), &ConfRequest::default()).unwrap();
        let err = extractor
            .start(&conf, false, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::SpawnFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_extractor_streams_progress() {
        let script = r#"echo '{"processedAtoms":1,"processedLines":10}'; echo 'not json'; echo '{"processedAtoms":2,"processedLines":20}'"#;
        let extractor = ProcessExtractor::new("sh", vec!["-c".into(), script.into(), "sh".into()]);
        let conf = create_conf(&corpus(), &ConfRequest::default()).unwrap();
        let mut rx = extractor
            .start(&conf, false, CancellationToken::new())
            .await
            .unwrap();
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].processed_lines, 20);
        assert!(events.iter().all(|e| e.error.is_none()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_extractor_reports_failed_exit() {
        let script = r#"echo '{"processedAtoms":3,"processedLines":30}'; exit 2"#;
        let extractor = ProcessExtractor::new("sh", vec!["-c".into(), script.into(), "sh".into()]);
        let conf = create_conf(&corpus(), &ConfRequest::default()).unwrap();
        let mut rx = extractor
            .start(&conf, true, CancellationToken::new())
            .await
            .unwrap();
        let mut last = None;
        while let Some(ev) = rx.recv().await {
            last = Some(ev);
        }
        let last = last.unwrap();
        assert_eq!(last.processed_atoms, 3);
        assert!(last.error.unwrap().contains("exited"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_extractor_interrupt_closes_stream() {
        let extractor = ProcessExtractor::new("sh", vec!["-c".into(), "sleep 30".into(), "sh".into()]);
        let conf = create_conf(&corpus(), &ConfRequest::default()).unwrap();
        let token = CancellationToken::new();
        let mut rx = extractor.start(&conf, false, token.clone()).await.unwrap();
        token.cancel();
        let closed = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(closed.is_none());
    }
}
