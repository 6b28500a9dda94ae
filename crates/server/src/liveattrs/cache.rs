// crates/server/src/liveattrs/cache.rs
//! Process-lifetime cache of attribute query answers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use corpadm_core::{QueryAns, QueryPayload};

/// Answers keyed by corpus and normalized query. Entries never expire.
#[derive(Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<(String, String), Arc<QueryAns>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, corpus_id: &str, query: &QueryPayload) -> Option<Arc<QueryAns>> {
        let key = (corpus_id.to_string(), query.cache_key());
        match self.entries.read() {
            Ok(entries) => entries.get(&key).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading query cache: {e}");
                None
            }
        }
    }

    /// Store `ans`; a concurrent write for the same key is replaced (last
    /// write wins).
    pub fn set(&self, corpus_id: &str, query: &QueryPayload, ans: QueryAns) -> Arc<QueryAns> {
        let ans = Arc::new(ans);
        let key = (corpus_id.to_string(), query.cache_key());
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(key, Arc::clone(&ans));
            }
            Err(e) => tracing::error!("RwLock poisoned writing query cache: {e}"),
        }
        ans
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
