// crates/db/src/queries/rows.rs
// Extracted attribute rows: schema discovery, writes, grouped streaming reads.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_stream::try_stream;
use corpadm_core::{AttrConstraint, ResultRow, RowQuery};
use futures_util::{Stream, TryStreamExt};
use sqlx::Row;

use crate::filter::{self, check_ident, FIXED_COLUMNS};
use crate::{Database, DbResult};

impl Database {
    /// Attribute columns currently present in `liveattrs_entry`.
    pub async fn liveattrs_columns(&self) -> DbResult<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('liveattrs_entry')")
                .fetch_all(self.pool())
                .await?;
        Ok(rows
            .into_iter()
            .map(|r| r.0)
            .filter(|name| !FIXED_COLUMNS.contains(&name.as_str()))
            .collect())
    }

    /// Add missing attribute columns (underscore notation).
    pub async fn ensure_liveattrs_columns(&self, columns: &[String]) -> DbResult<()> {
        let known = self.liveattrs_columns().await?;
        for col in columns {
            check_ident(col)?;
            if known.contains(col) || FIXED_COLUMNS.contains(&col.as_str()) {
                continue;
            }
            sqlx::query(&format!("ALTER TABLE liveattrs_entry ADD COLUMN \"{col}\" TEXT"))
                .execute(self.pool())
                .await?;
            tracing::debug!(column = %col, "added liveattrs column");
        }
        Ok(())
    }

    /// Store one extracted item. Used by extraction backends writing into the
    /// shared store.
    pub async fn insert_liveattrs_entry(
        &self,
        corpus_id: &str,
        item_id: &str,
        poscount: u64,
        attrs: &[(&str, &str)],
    ) -> DbResult<()> {
        let cols: Vec<String> = attrs.iter().map(|(k, _)| k.to_string()).collect();
        self.ensure_liveattrs_columns(&cols).await?;

        let mut sql = String::from("INSERT INTO liveattrs_entry (corpus_id, item_id, poscount");
        for col in &cols {
            sql.push_str(&format!(", \"{col}\""));
        }
        sql.push_str(") VALUES (?, ?, ?");
        sql.push_str(&", ?".repeat(cols.len()));
        sql.push(')');

        let mut q = sqlx::query(&sql)
            .bind(corpus_id)
            .bind(item_id)
            .bind(poscount as i64);
        for (_, value) in attrs {
            q = q.bind(*value);
        }
        q.execute(self.pool()).await?;
        Ok(())
    }

    /// Stream grouped position counts for `query`, one row per distinct
    /// combination of the selected columns.
    pub fn stream_rows<'a>(
        &'a self,
        query: &'a RowQuery,
    ) -> impl Stream<Item = DbResult<ResultRow>> + Send + 'a {
        try_stream! {
            let known = self.liveattrs_columns().await?;
            let stmt = filter::grouped_rows(
                &query.corpus_id,
                &query.select,
                &query.filters,
                &query.aligned,
                &known,
            );
            let mut q = sqlx::query(&stmt.sql);
            for value in &stmt.binds {
                q = q.bind(value);
            }
            let mut rows = q.fetch(self.pool());
            while let Some(row) = rows.try_next().await? {
                let poscount: Option<i64> = row.try_get("poscount")?;
                let Some(poscount) = poscount else {
                    continue;
                };
                let mut attrs = HashMap::with_capacity(stmt.columns.len());
                for col in &stmt.columns {
                    let value: String = row.try_get(col.as_str())?;
                    attrs.insert(col.clone(), value);
                }
                yield ResultRow {
                    poscount: poscount.max(0) as u64,
                    attrs,
                };
            }
        }
    }

    /// Total position count of an ad-hoc subcorpus.
    pub async fn subc_size(
        &self,
        corpus_id: &str,
        filters: &BTreeMap<String, AttrConstraint>,
        aligned: &[String],
    ) -> DbResult<u64> {
        let known = self.liveattrs_columns().await?;
        let mut binds = Vec::new();
        let cond = filter::where_clause(corpus_id, filters, aligned, &known, &mut binds);
        let sql = format!("SELECT COALESCE(SUM(t.poscount), 0) FROM liveattrs_entry t WHERE {cond}");
        let mut q = sqlx::query_as::<_, (i64,)>(&sql);
        for value in &binds {
            q = q.bind(value);
        }
        let (total,) = q.fetch_one(self.pool()).await?;
        Ok(total.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_columns_rejects_bad_names() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(db
            .ensure_liveattrs_columns(&["doc_author".to_string()])
            .await
            .is_ok());
        assert!(db
            .ensure_liveattrs_columns(&["doc author".to_string()])
            .await
            .is_err());
        let cols = db.liveattrs_columns().await.unwrap();
        assert!(cols.contains("doc_author"));
        assert!(!cols.contains("poscount"));
    }
}
