// crates/core/src/aggregate.rs
//! Streaming grouped-count aggregation of attribute rows.
//!
//! The backing store yields one row per distinct combination of the selected
//! attributes together with the number of corpus positions it covers. Rows are
//! folded into per-attribute value lists as they arrive; nothing but the
//! accumulators is kept in memory.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use futures_util::{Stream, TryStreamExt};

use crate::corpus::CorpusInfo;
use crate::error::QueryError;
use crate::query::{import_key, AttrConstraint, QueryPayload};
use crate::response::{self, AttrValues, ListedValue, QueryAns};

/// One grouped row from the backing store. Keys use underscore notation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRow {
    pub poscount: u64,
    pub attrs: HashMap<String, String>,
}

/// Store-facing part of an aggregation: what to select and how to filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    pub corpus_id: String,
    /// Columns to group by, underscore notation.
    pub select: Vec<String>,
    /// Column → constraint, underscore notation.
    pub filters: BTreeMap<String, AttrConstraint>,
    /// Items must also exist in each of these corpora.
    pub aligned: Vec<String>,
}

/// Everything needed to turn a row stream into a [`QueryAns`].
#[derive(Debug, Clone)]
pub struct AggregationPlan {
    pub row_query: RowQuery,
    /// Attributes returned in the answer, dot notation.
    pub search_attrs: BTreeSet<String>,
    /// Attributes whose lists are never collapsed, dot notation.
    pub expand_attrs: BTreeSet<String>,
    pub bib_label_attr: Option<String>,
    pub bib_id_attr: Option<String>,
    pub group_bib_duplicates: bool,
    pub locale: String,
    pub max_attr_list_size: usize,
}

impl AggregationPlan {
    /// Resolve the search and expand sets for `query` and derive the store
    /// query.
    ///
    /// `default_attrs` are the corpus's configured subcorpus attributes.
    /// An autocomplete attribute is forced into both sets and its constraint
    /// becomes a "contains" pattern built from its first selected value.
    pub fn build(
        corpus: &CorpusInfo,
        default_attrs: &[String],
        query: &QueryPayload,
        default_max_list_size: usize,
    ) -> Result<Self, QueryError> {
        let mut attrs = query.attrs.clone();
        let mut search_attrs: BTreeSet<String> = default_attrs.iter().cloned().collect();
        let mut expand_attrs = BTreeSet::new();

        let bib_label_attr = corpus.bib_label_attr.clone().filter(|a| !a.is_empty());
        let bib_id_attr = corpus.bib_id_attr.clone().filter(|a| !a.is_empty());
        if let Some(label) = &bib_label_attr {
            search_attrs.insert(label.clone());
        }

        if let Some(ac_attr) = query.autocomplete() {
            search_attrs.insert(ac_attr.to_string());
            expand_attrs.insert(ac_attr.to_string());
            let values = query.listing_of(ac_attr)?;
            attrs.insert(ac_attr.to_string(), AttrConstraint::contains(&values[0]));
        }

        for (attr, constraint) in &attrs {
            if constraint.is_range() {
                expand_attrs.insert(attr.clone());
            }
        }

        let mut select: Vec<String> = search_attrs.iter().map(|a| import_key(a)).collect();
        if let (Some(_), Some(id)) = (&bib_label_attr, &bib_id_attr) {
            let id_col = import_key(id);
            if !select.contains(&id_col) {
                select.push(id_col);
            }
        }

        Ok(Self {
            row_query: RowQuery {
                corpus_id: corpus.name.clone(),
                select,
                filters: attrs
                    .into_iter()
                    .map(|(k, v)| (import_key(&k), v))
                    .collect(),
                aligned: query.aligned.clone(),
            },
            search_attrs,
            expand_attrs,
            bib_label_attr,
            bib_id_attr,
            group_bib_duplicates: corpus.bib_group_duplicates,
            locale: corpus.locale.clone(),
            max_attr_list_size: query
                .max_attr_list_size
                .filter(|n| *n > 0)
                .unwrap_or(default_max_list_size),
        })
    }

    /// Attributes allowed to switch to a running total during streaming: a
    /// collapsed list can never be re-expanded, so only attributes that are
    /// neither expanded nor regrouped afterwards qualify.
    fn may_collapse_early(&self, attr: &str) -> bool {
        !self.expand_attrs.contains(attr)
            && !(self.group_bib_duplicates && self.bib_label_attr.as_deref() == Some(attr))
    }
}

enum Accumulator {
    Listed {
        items: Vec<ListedValue>,
        index: HashMap<String, usize>,
    },
    Counted(u64),
}

impl Accumulator {
    fn new() -> Self {
        Self::Listed {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add(&mut self, ident: &str, label: &str, poscount: u64) {
        match self {
            Self::Listed { items, index } => match index.get(ident) {
                Some(&idx) => items[idx].count += poscount,
                None => {
                    index.insert(ident.to_string(), items.len());
                    items.push(ListedValue::new(ident, label, poscount));
                }
            },
            Self::Counted(total) => *total += poscount,
        }
    }

    fn collapse_if_longer(&mut self, max: usize) {
        if let Self::Listed { items, .. } = self {
            if items.len() > max {
                *self = Self::Counted(items.iter().map(|v| v.count).sum());
            }
        }
    }

    fn into_values(self) -> AttrValues {
        match self {
            Self::Listed { items, .. } => AttrValues::Listed(items),
            Self::Counted(total) => AttrValues::Count(total),
        }
    }
}

/// Fold a stream of grouped rows into an answer for `plan`.
///
/// The total position count covers every row regardless of any later list
/// collapsing. Attributes that never occur in the stream end up as empty
/// lists.
pub async fn aggregate<S, E>(plan: &AggregationPlan, rows: S) -> Result<QueryAns, E>
where
    S: Stream<Item = Result<ResultRow, E>>,
{
    let columns: Vec<(String, String, bool)> = plan
        .search_attrs
        .iter()
        .map(|attr| (attr.clone(), import_key(attr), plan.may_collapse_early(attr)))
        .collect();
    let bib_id_col = plan.bib_id_attr.as_deref().map(import_key);
    let mut acc: HashMap<String, Accumulator> = plan
        .search_attrs
        .iter()
        .map(|attr| (attr.clone(), Accumulator::new()))
        .collect();
    let mut poscount = 0u64;

    futures_util::pin_mut!(rows);
    while let Some(row) = rows.try_next().await? {
        poscount += row.poscount;
        for (attr, col, collapsible) in &columns {
            let Some(value) = row.attrs.get(col) else {
                continue;
            };
            let ident = if plan.bib_label_attr.as_deref() == Some(attr.as_str()) {
                bib_id_col
                    .as_ref()
                    .and_then(|c| row.attrs.get(c))
                    .unwrap_or(value)
            } else {
                value
            };
            if let Some(entry) = acc.get_mut(attr) {
                entry.add(ident, value, row.poscount);
                if *collapsible {
                    entry.collapse_if_longer(plan.max_attr_list_size);
                }
            }
        }
    }

    let mut ans = QueryAns {
        poscount,
        attr_values: acc
            .into_iter()
            .map(|(attr, entry)| (attr, entry.into_values()))
            .collect(),
        aligned: Vec::new(),
    };
    if plan.group_bib_duplicates {
        if let Some(label) = &plan.bib_label_attr {
            response::group_bib_items(&mut ans, label);
        }
    }
    response::export_attr_values(
        &mut ans,
        &plan.row_query.aligned,
        &plan.expand_attrs,
        &plan.locale,
        plan.max_attr_list_size,
    );
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryAttrs;
    use pretty_assertions::assert_eq;
    use std::convert::Infallible;

    fn corpus() -> CorpusInfo {
        CorpusInfo {
            name: "syn2020".into(),
            active: true,
            locale: "cs_CZ".into(),
            ..Default::default()
        }
    }

    fn row(poscount: u64, attrs: &[(&str, &str)]) -> ResultRow {
        ResultRow {
            poscount,
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn stream(rows: Vec<ResultRow>) -> impl Stream<Item = Result<ResultRow, Infallible>> {
        futures_util::stream::iter(rows.into_iter().map(Ok))
    }

    fn listed<'a>(ans: &'a QueryAns, attr: &str) -> &'a Vec<ListedValue> {
        match &ans.attr_values[attr] {
            AttrValues::Listed(v) => v,
            AttrValues::Count(n) => panic!("expected list for {attr}, got count {n}"),
        }
    }

    fn query(attrs: &[(&str, AttrConstraint)]) -> QueryPayload {
        QueryPayload {
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<QueryAttrs>(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_grouped_counts() {
        let mut q = query(&[]);
        q.attrs.insert(
            "doc.a".into(),
            AttrConstraint::Multiple(vec!["x".into(), "y".into()]),
        );
        let plan = AggregationPlan::build(&corpus(), &["doc.a".into()], &q, 30).unwrap();
        assert!(plan.expand_attrs.contains("doc.a"));

        let rows = vec![
            row(3, &[("doc_a", "x")]),
            row(2, &[("doc_a", "x")]),
            row(5, &[("doc_a", "y")]),
        ];
        let ans = aggregate(&plan, stream(rows)).await.unwrap();
        assert_eq!(ans.poscount, 10);
        let items = listed(&ans, "doc.a");
        assert_eq!(items.len(), 2);
        assert_eq!((items[0].id.as_str(), items[0].count, items[0].grouping), ("x", 5, 1));
        assert_eq!((items[1].id.as_str(), items[1].count, items[1].grouping), ("y", 5, 1));
    }

    #[test]
    fn test_autocomplete_rewrite_and_expand() {
        let mut q = query(&[("doc.author", AttrConstraint::Single("Karel".into()))]);
        q.autocomplete_attr = Some("doc.author".into());
        let plan = AggregationPlan::build(&corpus(), &["doc.year".into()], &q, 30).unwrap();

        assert!(plan.search_attrs.contains("doc.author"));
        assert!(plan.expand_attrs.contains("doc.author"));
        assert_eq!(
            plan.row_query.filters["doc_author"],
            AttrConstraint::Pattern {
                like: "%Karel%".into()
            }
        );
        assert!(plan.row_query.select.contains(&"doc_author".to_string()));
        // the original query is left untouched
        assert_eq!(q.attrs["doc.author"], AttrConstraint::Single("Karel".into()));
    }

    #[test]
    fn test_autocomplete_without_value_fails() {
        let mut q = query(&[]);
        q.autocomplete_attr = Some("doc.author".into());
        let err = AggregationPlan::build(&corpus(), &[], &q, 30).unwrap_err();
        assert!(matches!(err, QueryError::MissingAutocompleteValue { .. }));
    }

    #[tokio::test]
    async fn test_unusual_attr_name_passes_through() {
        let q = query(&[("doc.pub-year", AttrConstraint::Single("1990".into()))]);
        let plan = AggregationPlan::build(&corpus(), &["doc.pub-year".into()], &q, 30).unwrap();
        assert_eq!(plan.row_query.filters.keys().collect::<Vec<_>>(), vec!["doc_pub-year"]);

        let ans = aggregate(&plan, stream(Vec::new())).await.unwrap();
        assert_eq!(ans.poscount, 0);
        assert!(listed(&ans, "doc.pub-year").is_empty());
    }

    #[tokio::test]
    async fn test_truncation_to_total_count() {
        let plan = AggregationPlan::build(&corpus(), &["doc.genre".into()], &query(&[]), 2).unwrap();
        let rows = vec![
            row(1, &[("doc_genre", "fiction")]),
            row(2, &[("doc_genre", "poetry")]),
            row(4, &[("doc_genre", "news")]),
            row(8, &[("doc_genre", "fiction")]),
        ];
        let ans = aggregate(&plan, stream(rows)).await.unwrap();
        assert_eq!(ans.attr_values["doc.genre"], AttrValues::Count(15));
        assert_eq!(ans.poscount, 15);
    }

    #[tokio::test]
    async fn test_expanded_attr_is_never_truncated() {
        let mut q = query(&[]);
        q.max_attr_list_size = Some(1);
        q.attrs.insert(
            "doc.genre".into(),
            AttrConstraint::Multiple(vec!["fiction".into(), "poetry".into()]),
        );
        let plan = AggregationPlan::build(&corpus(), &["doc.genre".into()], &q, 30).unwrap();
        assert_eq!(plan.max_attr_list_size, 1);
        let rows = vec![
            row(1, &[("doc_genre", "fiction")]),
            row(2, &[("doc_genre", "poetry")]),
        ];
        let ans = aggregate(&plan, stream(rows)).await.unwrap();
        assert_eq!(listed(&ans, "doc.genre").len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_attr_yields_empty_list() {
        let plan =
            AggregationPlan::build(&corpus(), &["doc.nonexistent".into()], &query(&[]), 30).unwrap();
        let ans = aggregate(&plan, stream(vec![row(3, &[("doc_year", "1990")])]))
            .await
            .unwrap();
        assert!(listed(&ans, "doc.nonexistent").is_empty());
        assert_eq!(ans.poscount, 3);
    }

    fn bib_corpus(group: bool) -> CorpusInfo {
        CorpusInfo {
            bib_label_attr: Some("doc.title".into()),
            bib_id_attr: Some("doc.id".into()),
            bib_group_duplicates: group,
            ..corpus()
        }
    }

    fn bib_rows() -> Vec<ResultRow> {
        vec![
            row(4, &[("doc_title", "Babička"), ("doc_id", "b1")]),
            row(6, &[("doc_title", "Babička"), ("doc_id", "b2")]),
            row(1, &[("doc_title", "Krakatit"), ("doc_id", "k1")]),
        ]
    }

    #[tokio::test]
    async fn test_bib_duplicates_grouped() {
        let plan = AggregationPlan::build(&bib_corpus(true), &[], &query(&[]), 30).unwrap();
        assert!(plan.row_query.select.contains(&"doc_id".to_string()));
        let ans = aggregate(&plan, stream(bib_rows())).await.unwrap();
        let items = listed(&ans, "doc.title");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "@Babička");
        assert_eq!(items[0].grouping, 2);
        assert_eq!(items[0].count, 10);
        assert_eq!(items[1].id, "k1");
        assert_eq!(items[1].grouping, 1);
    }

    #[tokio::test]
    async fn test_bib_duplicates_kept_when_disabled() {
        let plan = AggregationPlan::build(&bib_corpus(false), &[], &query(&[]), 30).unwrap();
        let ans = aggregate(&plan, stream(bib_rows())).await.unwrap();
        let ids: Vec<_> = listed(&ans, "doc.title").iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2", "k1"]);
        assert!(listed(&ans, "doc.title").iter().all(|v| v.grouping == 1));
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let plan = AggregationPlan::build(&corpus(), &["doc.a".into()], &query(&[]), 30).unwrap();
        let rows = futures_util::stream::iter(vec![
            Ok(row(1, &[("doc_a", "x")])),
            Err("store went away"),
        ]);
        let err = aggregate(&plan, rows).await.unwrap_err();
        assert_eq!(err, "store went away");
    }
}
