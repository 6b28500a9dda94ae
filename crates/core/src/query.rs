// crates/core/src/query.rs
//! Attribute query payloads as sent by query-building clients.
//!
//! Attribute names travel over the wire in dot notation (`doc.author`) and are
//! stored in underscore notation (`doc_author`); [`import_key`] and
//! [`export_key`] convert between the two.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Value standing in for a missing or empty attribute value.
pub const EMPTY_VALUE_PLACEHOLDER: &str = "?";

/// Constraint placed on a single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrConstraint {
    Single(String),
    Multiple(Vec<String>),
    /// SQL `LIKE` pattern (`%` and `_` wildcards).
    Pattern { like: String },
}

impl AttrConstraint {
    /// Values the constraint was built from, in request order.
    pub fn values(&self) -> Vec<String> {
        match self {
            Self::Single(v) => vec![v.clone()],
            Self::Multiple(vs) => vs.clone(),
            Self::Pattern { like } => vec![like.clone()],
        }
    }

    /// A constraint spanning more than one discrete value.
    pub fn is_range(&self) -> bool {
        match self {
            Self::Single(_) => false,
            Self::Multiple(vs) => vs.len() > 1,
            Self::Pattern { .. } => true,
        }
    }

    /// "Contains" pattern derived from `value`.
    pub fn contains(value: &str) -> Self {
        Self::Pattern {
            like: format!("%{value}%"),
        }
    }

    fn normalized(&self) -> Self {
        match self {
            Self::Multiple(vs) => {
                let mut vs = vs.clone();
                vs.sort();
                vs.dedup();
                if vs.len() == 1 {
                    Self::Single(vs.remove(0))
                } else {
                    Self::Multiple(vs)
                }
            }
            other => other.clone(),
        }
    }
}

/// Attribute → constraint map, keyed by dot-notation attribute names.
pub type QueryAttrs = BTreeMap<String, AttrConstraint>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    #[serde(default)]
    pub attrs: QueryAttrs,
    #[serde(default)]
    pub aligned: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autocomplete_attr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attr_list_size: Option<usize>,
}

impl QueryPayload {
    /// The autocomplete attribute, if one is named. Clients send an empty
    /// string to mean "none".
    pub fn autocomplete(&self) -> Option<&str> {
        self.autocomplete_attr
            .as_deref()
            .filter(|attr| !attr.is_empty())
    }

    /// Values currently selected for `attr`.
    pub fn listing_of(&self, attr: &str) -> Result<Vec<String>, QueryError> {
        let values = self
            .attrs
            .get(attr)
            .map(AttrConstraint::values)
            .unwrap_or_default();
        if values.is_empty() {
            return Err(QueryError::MissingAutocompleteValue {
                attr: attr.to_string(),
            });
        }
        Ok(values)
    }

    /// Key identifying semantically identical queries.
    ///
    /// Attribute order is fixed by the `BTreeMap`; value lists and aligned
    /// corpora are compared as sets.
    pub fn cache_key(&self) -> String {
        let mut aligned = self.aligned.clone();
        aligned.sort();
        aligned.dedup();
        let normalized = QueryPayload {
            attrs: self
                .attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.normalized()))
                .collect(),
            aligned,
            autocomplete_attr: self.autocomplete().map(str::to_string),
            max_attr_list_size: self.max_attr_list_size,
        };
        // A map of strings always serializes.
        serde_json::to_string(&normalized).unwrap_or_default()
    }
}

/// `doc.author` → `doc_author`
pub fn import_key(key: &str) -> String {
    key.replacen('.', "_", 1)
}

/// `doc_author` → `doc.author`
pub fn export_key(key: &str) -> String {
    key.replacen('_', ".", 1)
}
