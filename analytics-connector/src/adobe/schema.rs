use serde::Serialize;
use std::collections::BTreeMap;

use super::types::{Dimension, Metric};

/// Flattened schema entry, as shown to a query builder.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SchemaEntry {
    pub id: String,
    pub title: String,
    pub name: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&Dimension> for SchemaEntry {
    fn from(d: &Dimension) -> Self {
        Self {
            id: d.id.clone(),
            title: d.title.clone(),
            name: d.name.clone(),
            category: d.category.clone(),
            kind: d.kind.clone(),
        }
    }
}

impl From<&Metric> for SchemaEntry {
    fn from(m: &Metric) -> Self {
        Self {
            id: m.id.clone(),
            title: m.title.clone(),
            name: m.name.clone(),
            category: m.category.clone(),
            kind: m.kind.clone(),
        }
    }
}

/// Entries grouped by their free-text category.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaGroup {
    pub total: usize,
    pub by_category: BTreeMap<String, Vec<SchemaEntry>>,
    pub all: Vec<SchemaEntry>,
}

impl SchemaGroup {
    /// Group entries, keeping provider order inside each category.
    pub fn from_entries(all: Vec<SchemaEntry>) -> Self {
        let mut by_category: BTreeMap<String, Vec<SchemaEntry>> = BTreeMap::new();
        for entry in &all {
            by_category
                .entry(entry.category.clone())
                .or_default()
                .push(entry.clone());
        }

        Self {
            total: all.len(),
            by_category,
            all,
        }
    }
}

/// Dimensions and metrics of one report suite.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SchemaCatalog {
    pub rsid: String,
    pub dimensions: SchemaGroup,
    pub metrics: SchemaGroup,
}

impl SchemaCatalog {
    pub fn new(rsid: impl Into<String>, dimensions: &[Dimension], metrics: &[Metric]) -> Self {
        Self {
            rsid: rsid.into(),
            dimensions: SchemaGroup::from_entries(dimensions.iter().map(SchemaEntry::from).collect()),
            metrics: SchemaGroup::from_entries(metrics.iter().map(SchemaEntry::from).collect()),
        }
    }
}
