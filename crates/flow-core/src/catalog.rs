//! The palette entry catalog supplied by the metamodel.

use crate::error::FlowError;
use crate::model::EntryMetadata;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group name → entry name → type descriptor.
///
/// Groups keep the order the metamodel listed them in; entries within a
/// group are sorted by name. A catalog is always replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    groups: IndexMap<String, BTreeMap<String, EntryMetadata>>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `{"group": {"name": {...metadata...}}}`. Group and name fields
    /// missing from the metadata are filled in from the keys.
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        let mut catalog: Catalog = serde_json::from_str(json).map_err(FlowError::Catalog)?;
        for (group, entries) in catalog.groups.iter_mut() {
            for (name, metadata) in entries.iter_mut() {
                if metadata.group.is_empty() {
                    metadata.group = group.clone();
                }
                if metadata.name.is_empty() {
                    metadata.name = name.clone();
                }
            }
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, metadata: EntryMetadata) {
        self.groups
            .entry(metadata.group.clone())
            .or_default()
            .insert(metadata.name.clone(), metadata);
    }

    pub fn get(&self, group: &str, name: &str) -> Option<&EntryMetadata> {
        self.groups.get(group)?.get(name)
    }

    /// Groups in catalog order, each with its entries sorted by name.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, EntryMetadata>)> {
        self.groups.iter().map(|(g, entries)| (g.as_str(), entries))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(BTreeMap::is_empty)
    }

    pub fn entry_count(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }
}
