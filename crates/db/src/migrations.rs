/// Inline SQL migrations for the metadata store.
///
/// Attribute columns of `liveattrs_entry` (`doc_author`, `doc_title`, ...)
/// are not part of the migrations: they depend on the corpora being extracted
/// and are added on demand by `Database::ensure_liveattrs_columns`.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: corpus registry
    r#"
CREATE TABLE IF NOT EXISTS corpora (
    name TEXT PRIMARY KEY,
    active INTEGER NOT NULL DEFAULT 1,
    bib_label_attr TEXT,
    bib_id_attr TEXT,
    bib_group_duplicates INTEGER NOT NULL DEFAULT 0,
    locale TEXT NOT NULL DEFAULT 'en_US',
    parallel_corpus TEXT,
    subcorp_attrs TEXT NOT NULL DEFAULT '{}',
    indexed_structs TEXT NOT NULL DEFAULT '[]',
    vertical_path TEXT
);
"#,
    // Migration 2: extracted attribute rows
    r#"
CREATE TABLE IF NOT EXISTS liveattrs_entry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    corpus_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    poscount INTEGER NOT NULL DEFAULT 0
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_liveattrs_entry_corpus_item ON liveattrs_entry(corpus_id, item_id);
"#,
    // Migration 4: attribute usage statistics
    r#"
CREATE TABLE IF NOT EXISTS usage (
    corpus_id TEXT NOT NULL,
    struct_attr TEXT NOT NULL,
    num_used INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (corpus_id, struct_attr)
);
"#,
];
