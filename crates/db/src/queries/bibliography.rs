// crates/db/src/queries/bibliography.rs
// Bibliography lookups over the extracted rows.

use std::collections::BTreeMap;

use corpadm_core::{export_key, extraction::BibView, EMPTY_VALUE_PLACEHOLDER};
use sqlx::Row;

use super::BibliographyEntry;
use crate::filter::check_ident;
use crate::{Database, DbError, DbResult};

impl Database {
    /// All bibliography columns of one item.
    ///
    /// Returns `DbError::EmptyResult` if the item does not exist.
    pub async fn get_bibliography(
        &self,
        corpus_id: &str,
        bib_view: &BibView,
        item_id: &str,
    ) -> DbResult<Vec<BibliographyEntry>> {
        let known = self.liveattrs_columns().await?;
        if !known.contains(&bib_view.id_attr) {
            return Err(DbError::EmptyResult);
        }
        let cols: Vec<&String> = bib_view.cols.iter().filter(|c| known.contains(*c)).collect();
        if cols.is_empty() {
            return Err(DbError::EmptyResult);
        }
        let select: Vec<String> = cols.iter().map(|c| format!("\"{c}\"")).collect();
        let sql = format!(
            "SELECT {} FROM liveattrs_entry WHERE corpus_id = ? AND \"{}\" = ? LIMIT 1",
            select.join(", "),
            bib_view.id_attr
        );
        let row = sqlx::query(&sql)
            .bind(corpus_id)
            .bind(item_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(DbError::EmptyResult)?;

        let mut entries = Vec::with_capacity(cols.len());
        for (i, col) in cols.iter().enumerate() {
            let value: Option<String> = row.try_get(i)?;
            entries.push(BibliographyEntry {
                attr: export_key(col),
                value: value
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| EMPTY_VALUE_PLACEHOLDER.to_string()),
            });
        }
        Ok(entries)
    }

    /// Map bibliography ids to their labels. Unknown ids are left out.
    ///
    /// Returns `DbError::EmptyResult` if none of the ids exist.
    pub async fn find_bib_titles(
        &self,
        corpus_id: &str,
        id_col: &str,
        label_col: &str,
        ids: &[String],
    ) -> DbResult<BTreeMap<String, String>> {
        check_ident(id_col)?;
        check_ident(label_col)?;
        let known = self.liveattrs_columns().await?;
        if ids.is_empty() || !known.contains(id_col) || !known.contains(label_col) {
            return Err(DbError::EmptyResult);
        }
        let marks = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT \"{id_col}\", \"{label_col}\" FROM liveattrs_entry \
             WHERE corpus_id = ? AND \"{id_col}\" IN ({marks})"
        );
        let mut q = sqlx::query_as::<_, (String, Option<String>)>(&sql).bind(corpus_id);
        for id in ids {
            q = q.bind(id);
        }
        let titles: BTreeMap<String, String> = q
            .fetch_all(self.pool())
            .await?
            .into_iter()
            .map(|(id, label)| (id, label.unwrap_or_default()))
            .collect();
        if titles.is_empty() {
            return Err(DbError::EmptyResult);
        }
        Ok(titles)
    }
}
