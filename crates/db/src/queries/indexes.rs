// crates/db/src/queries/indexes.rs
// Usage-driven maintenance of per-corpus partial indexes on attribute columns.

use corpadm_core::{export_key, import_key};

use super::IndexUpdateOutcome;
use crate::filter::check_ident;
use crate::{Database, DbResult};

fn index_prefix(corpus_id: &str) -> String {
    format!("idx_la_{corpus_id}__")
}

impl Database {
    /// Keep indexes on the `max_columns` most used attributes of a corpus and
    /// drop its other attribute indexes.
    pub async fn update_indexes(
        &self,
        corpus_id: &str,
        max_columns: usize,
    ) -> DbResult<IndexUpdateOutcome> {
        // The corpus id ends up in index names and in the partial index predicate.
        check_ident(corpus_id)?;
        let known = self.liveattrs_columns().await?;
        let wanted: Vec<String> = self
            .load_usage(corpus_id)
            .await?
            .into_iter()
            .map(|u| import_key(&u.struct_attr))
            .filter(|col| known.contains(col))
            .take(max_columns)
            .collect();

        let prefix = index_prefix(corpus_id);
        let existing: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'liveattrs_entry' \
             AND substr(name, 1, ?) = ?",
        )
        .bind(prefix.len() as i64)
        .bind(&prefix)
        .fetch_all(self.pool())
        .await?;

        let mut outcome = IndexUpdateOutcome::default();
        for col in &wanted {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS \"{prefix}{col}\" ON liveattrs_entry(\"{col}\") \
                 WHERE corpus_id = '{corpus_id}'"
            ))
            .execute(self.pool())
            .await?;
            outcome.used_indexes.push(export_key(col));
        }
        for (name,) in existing {
            let col = &name[prefix.len()..];
            if wanted.iter().any(|w| w == col) {
                continue;
            }
            sqlx::query(&format!("DROP INDEX IF EXISTS \"{name}\""))
                .execute(self.pool())
                .await?;
            outcome.removed_indexes.push(export_key(col));
        }
        tracing::info!(
            corpus_id,
            used = outcome.used_indexes.len(),
            removed = outcome.removed_indexes.len(),
            "attribute indexes updated"
        );
        Ok(outcome)
    }
}
