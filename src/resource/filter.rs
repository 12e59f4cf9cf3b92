//! Client-side filtering over an already-fetched collection.
use serde_json::Value;

use crate::catalog::{scalar_to_string, ResourceSpec};

/// Search box text plus an optional category selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub search: String,
    pub category: Option<String>,
}

impl Filter {
    pub fn search(term: &str) -> Self {
        Self {
            search: term.to_string(),
            category: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty() && self.category.is_none()
    }

    pub fn matches(&self, spec: &ResourceSpec, record: &Value) -> bool {
        self.matches_category(spec, record) && self.matches_search(spec, record)
    }

    fn matches_category(&self, spec: &ResourceSpec, record: &Value) -> bool {
        let Some(wanted) = self.category.as_deref() else {
            return true;
        };
        spec.record_category(record)
            .is_some_and(|have| have.eq_ignore_ascii_case(wanted))
    }

    /// Case-insensitive substring match against the descriptor's search
    /// fields, or every top-level scalar when none are configured. The record
    /// id always participates.
    fn matches_search(&self, spec: &ResourceSpec, record: &Value) -> bool {
        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hit = |v: &Value| {
            scalar_to_string(v).is_some_and(|s| s.to_lowercase().contains(&needle))
        };
        if spec.record_id(record).is_some_and(|id| id.to_lowercase().contains(&needle)) {
            return true;
        }
        if spec.search_fields.is_empty() {
            return record
                .as_object()
                .is_some_and(|map| map.values().any(hit));
        }
        spec.search_fields
            .iter()
            .filter_map(|f| record.get(f))
            .any(hit)
    }
}

/// Records passing `filter`, in collection order.
pub fn apply(records: &[Value], spec: &ResourceSpec, filter: &Filter) -> Vec<Value> {
    if filter.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| filter.matches(spec, r))
        .cloned()
        .collect()
}
