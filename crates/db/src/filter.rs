// crates/db/src/filter.rs
// SQL generation for filtered, grouped reads of `liveattrs_entry`.

use std::collections::{BTreeMap, HashSet};

use corpadm_core::{AttrConstraint, EMPTY_VALUE_PLACEHOLDER};

use crate::{DbError, DbResult};

/// Columns of `liveattrs_entry` that are not corpus attributes.
pub(crate) const FIXED_COLUMNS: &[&str] = &["id", "corpus_id", "item_id", "poscount"];

/// SQL text plus its positional bind values.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Statement {
    pub sql: String,
    pub binds: Vec<String>,
    /// Attribute columns the statement returns, in select order.
    pub columns: Vec<String>,
}

/// Attribute column names are interpolated into SQL, so only plain
/// identifiers are accepted.
pub(crate) fn check_ident(name: &str) -> DbResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

fn empty_value(col: &str) -> String {
    format!("(t.\"{col}\" IS NULL OR t.\"{col}\" = '')")
}

/// `WHERE` conditions for one corpus, its attribute filters and aligned
/// corpora. Filters on columns the store does not know never match.
pub(crate) fn where_clause(
    corpus_id: &str,
    filters: &BTreeMap<String, AttrConstraint>,
    aligned: &[String],
    known: &HashSet<String>,
    binds: &mut Vec<String>,
) -> String {
    let mut conds = vec!["t.corpus_id = ?".to_string()];
    binds.push(corpus_id.to_string());

    for (col, constraint) in filters {
        if !known.contains(col) {
            conds.push("0 = 1".to_string());
            continue;
        }
        match constraint {
            AttrConstraint::Single(v) if v == EMPTY_VALUE_PLACEHOLDER => {
                conds.push(empty_value(col));
            }
            AttrConstraint::Single(v) => {
                conds.push(format!("t.\"{col}\" = ?"));
                binds.push(v.clone());
            }
            AttrConstraint::Multiple(values) => {
                if values.is_empty() {
                    continue;
                }
                let mut alts = Vec::new();
                let concrete: Vec<&String> = values
                    .iter()
                    .filter(|v| v.as_str() != EMPTY_VALUE_PLACEHOLDER)
                    .collect();
                if !concrete.is_empty() {
                    let marks = vec!["?"; concrete.len()].join(", ");
                    alts.push(format!("t.\"{col}\" IN ({marks})"));
                    binds.extend(concrete.into_iter().cloned());
                }
                if values.iter().any(|v| v == EMPTY_VALUE_PLACEHOLDER) {
                    alts.push(empty_value(col));
                }
                conds.push(format!("({})", alts.join(" OR ")));
            }
            AttrConstraint::Pattern { like } => {
                conds.push(format!("t.\"{col}\" LIKE ?"));
                binds.push(like.clone());
            }
        }
    }

    for corpus in aligned {
        conds.push(
            "t.item_id IN (SELECT a.item_id FROM liveattrs_entry a WHERE a.corpus_id = ?)"
                .to_string(),
        );
        binds.push(corpus.clone());
    }

    conds.join(" AND ")
}

/// Grouped position counts for every combination of the selected columns.
///
/// Selected columns the store does not know are left out of the statement;
/// missing and empty values come back as the placeholder.
pub(crate) fn grouped_rows(
    corpus_id: &str,
    select: &[String],
    filters: &BTreeMap<String, AttrConstraint>,
    aligned: &[String],
    known: &HashSet<String>,
) -> Statement {
    let columns: Vec<String> = select
        .iter()
        .filter(|c| known.contains(*c))
        .cloned()
        .collect();
    let mut binds = Vec::new();
    let exprs: Vec<String> = columns
        .iter()
        .map(|c| format!("COALESCE(NULLIF(t.\"{c}\", ''), '{EMPTY_VALUE_PLACEHOLDER}') AS \"{c}\""))
        .collect();
    let cond = where_clause(corpus_id, filters, aligned, known, &mut binds);

    let sql = if columns.is_empty() {
        format!("SELECT SUM(t.poscount) AS poscount FROM liveattrs_entry t WHERE {cond}")
    } else {
        let group: Vec<String> = (1..=columns.len()).map(|i| i.to_string()).collect();
        format!(
            "SELECT {}, SUM(t.poscount) AS poscount FROM liveattrs_entry t WHERE {cond} GROUP BY {}",
            exprs.join(", "),
            group.join(", ")
        )
    };
    Statement {
        sql,
        binds,
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn known(cols: &[&str]) -> HashSet<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_check_ident() {
        assert!(check_ident("doc_author").is_ok());
        assert!(check_ident("doc author").is_err());
        assert!(check_ident("doc\"; DROP").is_err());
        assert!(check_ident("1doc").is_err());
        assert!(check_ident("").is_err());
    }

    #[test]
    fn test_where_clause_shapes() {
        let filters = BTreeMap::from([
            ("doc_author".to_string(), AttrConstraint::Single("Karel".into())),
            (
                "doc_year".to_string(),
                AttrConstraint::Multiple(vec!["1990".into(), "?".into()]),
            ),
            (
                "doc_title".to_string(),
                AttrConstraint::Pattern { like: "%war%".into() },
            ),
        ]);
        let mut binds = Vec::new();
        let sql = where_clause(
            "syn",
            &filters,
            &["intercorp_en".to_string()],
            &known(&["doc_author", "doc_year", "doc_title"]),
            &mut binds,
        );
        assert_eq!(
            sql,
            "t.corpus_id = ? AND t.\"doc_author\" = ? AND t.\"doc_title\" LIKE ? \
             AND (t.\"doc_year\" IN (?) OR (t.\"doc_year\" IS NULL OR t.\"doc_year\" = '')) \
             AND t.item_id IN (SELECT a.item_id FROM liveattrs_entry a WHERE a.corpus_id = ?)"
        );
        assert_eq!(binds, vec!["syn", "Karel", "%war%", "1990", "intercorp_en"]);
    }

    #[test]
    fn test_unknown_filter_never_matches() {
        let filters = BTreeMap::from([(
            "doc_nonexistent".to_string(),
            AttrConstraint::Single("x".into()),
        )]);
        let mut binds = Vec::new();
        let sql = where_clause("syn", &filters, &[], &known(&[]), &mut binds);
        assert_eq!(sql, "t.corpus_id = ? AND 0 = 1");
    }

    #[test]
    fn test_grouped_rows_skips_unknown_columns() {
        let stmt = grouped_rows(
            "syn",
            &["doc_author".to_string(), "doc_nope".to_string()],
            &BTreeMap::new(),
            &[],
            &known(&["doc_author"]),
        );
        assert_eq!(stmt.columns, vec!["doc_author"]);
        assert!(stmt.sql.contains("GROUP BY 1"));
        assert!(!stmt.sql.contains("doc_nope"));
    }
}
