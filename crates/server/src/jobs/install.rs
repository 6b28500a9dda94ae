// crates/server/src/jobs/install.rs
//! Post-processing of a completed file-backed extraction.

use std::path::PathBuf;

use corpadm_core::{DbKind, ExtractionConf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("extraction did not name an output file")]
    MissingOutput,

    #[error("failed to install {from} as {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to reset the frontend cache: {0}")]
    SoftReset(#[from] reqwest::Error),

    #[error("failed to reset the frontend cache: server responded with {0}")]
    SoftResetStatus(reqwest::StatusCode),
}

/// Moves extracted database files into the text types directory and tells
/// the frontend to drop its cached copies.
#[derive(Debug, Clone)]
pub struct Installer {
    text_types_dir: PathBuf,
    soft_reset_url: Option<String>,
    client: reqwest::Client,
}

impl Installer {
    pub fn new(text_types_dir: impl Into<PathBuf>, soft_reset_url: Option<String>) -> Self {
        Self {
            text_types_dir: text_types_dir.into(),
            soft_reset_url: soft_reset_url.filter(|u| !u.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    /// Where the database of `corpus` lives once installed.
    pub fn target_path(&self, corpus: &str) -> PathBuf {
        self.text_types_dir.join(format!("{corpus}.db"))
    }

    /// Install the output of `conf`. Extractions into the shared store need
    /// nothing and return immediately.
    pub async fn install(&self, conf: &ExtractionConf) -> Result<(), InstallError> {
        if conf.db.kind != DbKind::Sqlite {
            return Ok(());
        }
        let from = conf.db.path.clone().ok_or(InstallError::MissingOutput)?;
        let to = self.target_path(&conf.corpus);
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|source| InstallError::Move {
                from: from.clone(),
                to: to.clone(),
                source,
            })?;
        tracing::info!(corpus_id = %conf.corpus, path = %to.display(), "extracted database installed");

        if let Some(url) = &self.soft_reset_url {
            let resp = self.client.post(url).send().await?;
            if resp.status().as_u16() >= 400 {
                return Err(InstallError::SoftResetStatus(resp.status()));
            }
            tracing::info!(corpus_id = %conf.corpus, "frontend cache reset");
        }
        Ok(())
    }
}
