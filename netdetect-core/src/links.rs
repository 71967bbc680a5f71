// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Link records accumulated from input tables, and the soft-equality relation

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `(entity_id, attribute_type, attribute_value)`, all normalized
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeLink {
    pub entity_id: String,
    pub attribute_type: String,
    pub attribute_value: String,
}

/// `(entity_id, flag_type, flag_value, count)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagLink {
    pub entity_id: String,
    pub flag_type: String,
    pub flag_value: String,
    pub count: u64,
}

/// `(entity_id, group_attribute, group_value)`; used only for filtering
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupLink {
    pub entity_id: String,
    pub group_attribute: String,
    pub group_value: String,
}

/// How flag columns are turned into flag links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagAggregator {
    /// Every non-empty cell is one flag instance whose value is the cell
    Instance,
    /// Cells are counts, summed per entity; the flag value is the column name
    Count,
}

/// Symmetric soft-equality relation between node labels.
///
/// Inserting a pair always inserts both directions, so `b ∈ I[a]` holds
/// exactly when `a ∈ I[b]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredLinks {
    links: BTreeMap<String, BTreeSet<String>>,
}

impl InferredLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `a ~ b`. Self pairs are ignored.
    pub fn insert_pair(&mut self, a: &str, b: &str) {
        if a == b {
            return;
        }
        self.links.entry(a.to_string()).or_default().insert(b.to_string());
        self.links.entry(b.to_string()).or_default().insert(a.to_string());
    }

    /// Labels softly equal to `label`
    pub fn neighbors(&self, label: &str) -> impl Iterator<Item = &str> {
        self.links
            .get(label)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.links.get(a).is_some_and(|set| set.contains(b))
    }

    /// Number of unordered pairs
    pub fn pair_count(&self) -> usize {
        self.links.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }

    /// Sorted `(text, similar_text)` rows with `text < similar_text`
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.links
            .iter()
            .flat_map(|(a, set)| {
                set.iter()
                    .filter(move |b| a.as_str() < b.as_str())
                    .map(move |b| (a.clone(), b.clone()))
            })
            .collect()
    }

    pub fn is_symmetric(&self) -> bool {
        self.links
            .iter()
            .all(|(a, set)| set.iter().all(|b| self.contains(b, a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inferred_links_symmetric() {
        let mut links = InferredLinks::new();
        links.insert_pair("name==PlusOne", "name==Plus One");
        links.insert_pair("name==PlusOne", "name==PlusOne");

        assert!(links.contains("name==Plus One", "name==PlusOne"));
        assert!(links.is_symmetric());
        assert_eq!(links.pair_count(), 1);
        assert_eq!(
            links.pairs(),
            vec![("name==Plus One".to_string(), "name==PlusOne".to_string())]
        );
    }

    #[test]
    fn test_inferred_links_clear() {
        let mut links = InferredLinks::new();
        links.insert_pair("a==1", "b==1");
        links.clear();
        assert!(links.is_empty());
        assert_eq!(links.neighbors("a==1").count(), 0);
    }
}
