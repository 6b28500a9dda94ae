// crates/core/src/corpus.rs
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Corpus metadata as provided by the corpus registry.
///
/// Attribute names (`bib_label_attr`, `bib_id_attr`) use dot notation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusInfo {
    pub name: String,
    pub active: bool,
    pub bib_label_attr: Option<String>,
    pub bib_id_attr: Option<String>,
    pub bib_group_duplicates: bool,
    pub locale: String,
    /// Name shared by all corpora of a parallel corpus group.
    pub parallel_corpus: Option<String>,
    /// Structure → attributes offered for subcorpus selection.
    pub subcorp_attrs: BTreeMap<String, Vec<String>>,
    pub indexed_structs: Vec<String>,
    pub vertical_path: Option<String>,
}

impl CorpusInfo {
    /// Name of the data group the corpus belongs to: the parallel corpus
    /// name if any, the corpus itself otherwise.
    pub fn grouped_name(&self) -> &str {
        self.parallel_corpus
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.name)
    }
}
