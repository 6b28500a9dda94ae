// crates/db/src/queries/corpora.rs
// Corpus registry: metadata consumed by extraction and aggregation.

use std::collections::BTreeMap;

use corpadm_core::CorpusInfo;
use sqlx::Row;

use crate::{Database, DbError, DbResult};

impl Database {
    /// Load metadata of one corpus; `None` if the corpus is not registered.
    pub async fn load_corpus_info(&self, name: &str) -> DbResult<Option<CorpusInfo>> {
        let row = sqlx::query(
            r#"
            SELECT name, active, bib_label_attr, bib_id_attr, bib_group_duplicates,
                   locale, parallel_corpus, subcorp_attrs, indexed_structs, vertical_path
            FROM corpora WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let corrupt = |source| DbError::CorruptMetadata {
            corpus: name.to_string(),
            source,
        };
        let subcorp_attrs: String = row.try_get("subcorp_attrs")?;
        let subcorp_attrs: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&subcorp_attrs).map_err(corrupt)?;
        let indexed_structs: String = row.try_get("indexed_structs")?;
        let indexed_structs: Vec<String> =
            serde_json::from_str(&indexed_structs).map_err(corrupt)?;

        Ok(Some(CorpusInfo {
            name: row.try_get("name")?,
            active: row.try_get("active")?,
            bib_label_attr: row.try_get("bib_label_attr")?,
            bib_id_attr: row.try_get("bib_id_attr")?,
            bib_group_duplicates: row.try_get("bib_group_duplicates")?,
            locale: row.try_get("locale")?,
            parallel_corpus: row.try_get("parallel_corpus")?,
            subcorp_attrs,
            indexed_structs,
            vertical_path: row.try_get("vertical_path")?,
        }))
    }

    /// Insert or replace a corpus registry entry.
    pub async fn upsert_corpus(&self, info: &CorpusInfo) -> DbResult<()> {
        let subcorp_attrs = serde_json::to_string(&info.subcorp_attrs).map_err(|source| {
            DbError::CorruptMetadata {
                corpus: info.name.clone(),
                source,
            }
        })?;
        let indexed_structs = serde_json::to_string(&info.indexed_structs).map_err(|source| {
            DbError::CorruptMetadata {
                corpus: info.name.clone(),
                source,
            }
        })?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO corpora
                (name, active, bib_label_attr, bib_id_attr, bib_group_duplicates,
                 locale, parallel_corpus, subcorp_attrs, indexed_structs, vertical_path)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&info.name)
        .bind(info.active)
        .bind(&info.bib_label_attr)
        .bind(&info.bib_id_attr)
        .bind(info.bib_group_duplicates)
        .bind(&info.locale)
        .bind(&info.parallel_corpus)
        .bind(subcorp_attrs)
        .bind(indexed_structs)
        .bind(&info.vertical_path)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
