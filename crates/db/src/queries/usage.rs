// crates/db/src/queries/usage.rs
// Per-corpus attribute usage counters.

use super::UsageEntry;
use crate::{Database, DbResult};

impl Database {
    /// Count one use of each attribute (dot notation) in a query on `corpus_id`.
    pub async fn record_usage(&self, corpus_id: &str, attrs: &[String]) -> DbResult<()> {
        let mut tx = self.pool().begin().await?;
        for attr in attrs {
            sqlx::query(
                r#"
                INSERT INTO usage (corpus_id, struct_attr, num_used) VALUES (?, ?, 1)
                ON CONFLICT (corpus_id, struct_attr) DO UPDATE SET num_used = num_used + 1
                "#,
            )
            .bind(corpus_id)
            .bind(attr)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Usage counters of a corpus, most used first.
    pub async fn load_usage(&self, corpus_id: &str) -> DbResult<Vec<UsageEntry>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT struct_attr, num_used FROM usage WHERE corpus_id = ? ORDER BY num_used DESC, struct_attr",
        )
        .bind(corpus_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(struct_attr, num_used)| UsageEntry {
                struct_attr,
                num_used,
            })
            .collect())
    }
}
