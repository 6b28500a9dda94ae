// crates/db/src/queries.rs
// Query modules for the metadata store. Each submodule adds methods to `Database`.

mod bibliography;
mod corpora;
mod fill;
mod indexes;
mod rows;
mod usage;

pub use fill::FilledAttrs;

use serde::Serialize;

/// One attribute of a bibliography item, dot-notation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BibliographyEntry {
    pub attr: String,
    pub value: String,
}

/// How often an attribute was used in queries on a corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    pub struct_attr: String,
    pub num_used: i64,
}

/// Result of an index maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexUpdateOutcome {
    pub used_indexes: Vec<String>,
    pub removed_indexes: Vec<String>,
}
