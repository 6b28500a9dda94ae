// crates/db/src/queries/fill.rs
// Completing attribute values from a known value of one attribute.

use std::collections::BTreeMap;

use corpadm_core::{export_key, EMPTY_VALUE_PLACEHOLDER};
use sqlx::Row;

use crate::{Database, DbError, DbResult};

/// Search value → (fill attribute in dot notation → value).
pub type FilledAttrs = BTreeMap<String, BTreeMap<String, String>>;

impl Database {
    /// For every value of `search_col` in `values`, look up the values of
    /// `fill_cols` on the same item. Columns use underscore notation.
    ///
    /// Fill columns the store does not know are left out. When a search
    /// value occurs on several items, the first stored item wins.
    ///
    /// Returns `DbError::EmptyResult` if no value matches.
    pub async fn fill_attrs(
        &self,
        corpus_id: &str,
        search_col: &str,
        values: &[String],
        fill_cols: &[String],
    ) -> DbResult<FilledAttrs> {
        let known = self.liveattrs_columns().await?;
        if values.is_empty() || !known.contains(search_col) {
            return Err(DbError::EmptyResult);
        }
        let cols: Vec<&String> = fill_cols.iter().filter(|c| known.contains(*c)).collect();

        let mut select = vec![format!("\"{search_col}\"")];
        select.extend(cols.iter().map(|c| format!("\"{c}\"")));
        let marks = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM liveattrs_entry WHERE corpus_id = ? AND \"{search_col}\" IN ({marks}) ORDER BY id",
            select.join(", ")
        );
        let mut q = sqlx::query(&sql).bind(corpus_id);
        for value in values {
            q = q.bind(value);
        }

        let mut ans = FilledAttrs::new();
        for row in q.fetch_all(self.pool()).await? {
            let key: String = row.try_get(0)?;
            if ans.contains_key(&key) {
                continue;
            }
            let mut filled = BTreeMap::new();
            for (i, col) in cols.iter().enumerate() {
                let value: Option<String> = row.try_get(i + 1)?;
                filled.insert(
                    export_key(col),
                    value
                        .filter(|v| !v.is_empty())
                        .unwrap_or_else(|| EMPTY_VALUE_PLACEHOLDER.to_string()),
                );
            }
            ans.insert(key, filled);
        }
        if ans.is_empty() {
            return Err(DbError::EmptyResult);
        }
        Ok(ans)
    }
}
