// crates/server/src/liveattrs/conf.rs
//! Extraction configurations, one JSON file per corpus.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use corpadm_core::{ConfError, ExtractionConf};

/// Loads and saves extraction configurations, memoizing loaded ones.
pub struct ExtractionConfLoader {
    dir: PathBuf,
    loaded: RwLock<HashMap<String, ExtractionConf>>,
}

impl ExtractionConfLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn path_of(&self, corpus_id: &str) -> PathBuf {
        self.dir.join(format!("{corpus_id}.json"))
    }

    fn memoized(&self, corpus_id: &str) -> Option<ExtractionConf> {
        match self.loaded.read() {
            Ok(loaded) => loaded.get(corpus_id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading conf cache: {e}");
                None
            }
        }
    }

    fn memoize(&self, corpus_id: &str, conf: ExtractionConf) {
        match self.loaded.write() {
            Ok(mut loaded) => {
                loaded.insert(corpus_id.to_string(), conf);
            }
            Err(e) => tracing::error!("RwLock poisoned writing conf cache: {e}"),
        }
    }

    /// The stored configuration of `corpus_id`, `None` if there is none.
    pub async fn get(&self, corpus_id: &str) -> Result<Option<ExtractionConf>, ConfError> {
        if let Some(conf) = self.memoized(corpus_id) {
            return Ok(Some(conf));
        }
        let path = self.path_of(corpus_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfError::io(path, e)),
        };
        let conf: ExtractionConf = serde_json::from_slice(&data)
            .map_err(|source| ConfError::Malformed { path: path.clone(), source })?;
        self.memoize(corpus_id, conf.clone());
        Ok(Some(conf))
    }

    pub async fn save(&self, conf: &ExtractionConf) -> Result<(), ConfError> {
        let path = self.path_of(&conf.corpus);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ConfError::io(&self.dir, e))?;
        let data = serde_json::to_vec_pretty(conf)
            .map_err(|source| ConfError::Malformed { path: path.clone(), source })?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| ConfError::io(&path, e))?;
        self.memoize(&conf.corpus, conf.clone());
        tracing::info!(corpus_id = %conf.corpus, path = %path.display(), "extraction configuration saved");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::tests::sample_conf;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_save_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ExtractionConfLoader::new(dir.path().join("conf"));
        assert!(loader.get("syn").await.unwrap().is_none());

        let conf = sample_conf("syn");
        loader.save(&conf).await.unwrap();
        assert_eq!(loader.get("syn").await.unwrap(), Some(conf.clone()));

        // a fresh loader reads the file
        let fresh = ExtractionConfLoader::new(loader.dir());
        assert_eq!(fresh.get("syn").await.unwrap(), Some(conf));
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ExtractionConfLoader::new(dir.path());
        std::fs::write(loader.path_of("syn"), b"{").unwrap();
        let err = loader.get("syn").await.unwrap_err();
        assert!(matches!(err, ConfError::Malformed { .. }));
    }
}
