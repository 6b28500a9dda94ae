// crates/core/src/response.rs
//! Attribute value query answers and their export post-processing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::collation;

/// Character budget for shortened labels.
pub const SHORT_LABEL_MAX_LENGTH: usize = 30;

/// One enumerated attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedValue {
    pub id: String,
    pub short_label: String,
    pub label: String,
    pub grouping: u64,
    pub count: u64,
}

impl ListedValue {
    pub fn new(id: impl Into<String>, label: impl Into<String>, count: u64) -> Self {
        let label = label.into();
        Self {
            id: id.into(),
            short_label: shorten_val(&label, SHORT_LABEL_MAX_LENGTH),
            label,
            grouping: 1,
            count,
        }
    }
}

/// Either an enumerated value list or, for lists too long to send, their
/// total position count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValues {
    Listed(Vec<ListedValue>),
    Count(u64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAns {
    pub poscount: u64,
    pub attr_values: BTreeMap<String, AttrValues>,
    pub aligned: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcSize {
    pub total: u64,
}

/// Shorten `value` to at most `max_len` characters, cutting on word
/// boundaries where possible and marking the cut with `...`.
pub fn shorten_val(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        return value.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for word in value.split(' ') {
        let len = word.chars().count();
        let extra = if out.is_empty() { len } else { len + 1 };
        if used + extra > max_len {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        used += extra;
    }
    if out.is_empty() {
        out = value.chars().take(max_len).collect();
    }
    out.push_str("...");
    out
}

/// Merge bibliography entries sharing the same label.
///
/// Merged entries sum their position counts and grouping counters, and an
/// entry standing for more than one item gets the synthetic id `@label`.
/// First-seen order is kept.
pub fn group_bib_items(ans: &mut QueryAns, bib_label: &str) {
    let Some(AttrValues::Listed(items)) = ans.attr_values.get_mut(bib_label) else {
        return;
    };
    let mut grouped: Vec<ListedValue> = Vec::with_capacity(items.len());
    let mut by_label: HashMap<String, usize> = HashMap::new();
    for item in items.drain(..) {
        match by_label.get(&item.label) {
            Some(&idx) => {
                let entry = &mut grouped[idx];
                entry.count += item.count;
                entry.grouping += item.grouping;
                entry.id = format!("@{}", entry.label);
            }
            None => {
                by_label.insert(item.label.clone(), grouped.len());
                grouped.push(item);
            }
        }
    }
    *items = grouped;
}

/// Final shaping of an answer before it leaves the engine.
///
/// Value lists are sorted by label under the collation of `locale`. Lists of
/// attributes outside `expand_attrs` that hold more than `max_attr_list_size`
/// entries are replaced by their total position count.
pub fn export_attr_values(
    ans: &mut QueryAns,
    aligned: &[String],
    expand_attrs: &BTreeSet<String>,
    locale: &str,
    max_attr_list_size: usize,
) {
    ans.aligned = aligned.to_vec();
    for (attr, values) in ans.attr_values.iter_mut() {
        let AttrValues::Listed(items) = values else {
            continue;
        };
        if !expand_attrs.contains(attr) && items.len() > max_attr_list_size {
            *values = AttrValues::Count(items.iter().map(|v| v.count).sum());
            continue;
        }
        items.sort_by(|a, b| {
            collation::compare(locale, &a.label, &b.label).then_with(|| a.id.cmp(&b.id))
        });
    }
}
