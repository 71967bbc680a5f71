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

//! Flag Integrator
//!
//! Sums flag counts per `(entity, flag)` and derives per-entity and
//! per-network statistics.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::links::FlagLink;
use crate::normalize::{entity_label, qualify};

/// One row of the integrated flag table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRow {
    /// Qualified entity label
    pub entity: String,
    /// Qualified flag label (`flag_type==flag_value`)
    pub flag: String,
    pub count: u64,
}

/// Per-network flag statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagSummary {
    pub community_flags: u64,
    pub flagged_count: usize,
    /// Flagged entities per unflagged entity, 2 dp
    pub flagged_per_unflagged: f64,
    /// Flags per entity, 2 dp
    pub flags_per_entity: f64,
}

/// Integrated flags F
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegratedFlags {
    counts: BTreeMap<(String, String), u64>,
}

impl IntegratedFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate flag links, qualifying labels with `separator`
    pub fn from_links(links: &[FlagLink], separator: &str) -> Self {
        let mut flags = Self::new();
        flags.extend(links, separator);
        flags
    }

    /// Add more links to the running totals
    pub fn extend(&mut self, links: &[FlagLink], separator: &str) {
        for link in links {
            let key = (
                entity_label(&link.entity_id, separator),
                qualify(&link.flag_type, &link.flag_value, separator),
            );
            *self.counts.entry(key).or_default() += link.count;
        }
    }

    /// Row-wise sum of two flag tables
    pub fn merge(&mut self, other: &IntegratedFlags) {
        for (key, count) in &other.counts {
            *self.counts.entry(key.clone()).or_default() += count;
        }
    }

    /// Count for one `(entity, flag)` pair
    pub fn get(&self, entity: &str, flag: &str) -> u64 {
        self.counts
            .get(&(entity.to_string(), flag.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Total flags of one entity (qualified label); zero when absent
    pub fn entity_flags(&self, entity: &str) -> u64 {
        self.counts
            .range((entity.to_string(), String::new())..)
            .take_while(|((e, _), _)| e == entity)
            .map(|(_, c)| c)
            .sum()
    }

    /// Per-entity totals, sorted by entity label
    pub fn entity_totals(&self) -> BTreeMap<String, u64> {
        let mut totals = BTreeMap::new();
        for ((entity, _), count) in &self.counts {
            *totals.entry(entity.clone()).or_default() += count;
        }
        totals
    }

    /// Largest per-entity total
    pub fn max_entity_flags(&self) -> u64 {
        self.entity_totals().into_values().max().unwrap_or(0)
    }

    /// Mean per-entity total over entities with a non-zero total, 2 dp
    pub fn mean_flagged_flags(&self) -> f64 {
        let flagged: Vec<u64> = self
            .entity_totals()
            .into_values()
            .filter(|&c| c > 0)
            .collect();
        if flagged.is_empty() {
            return 0.0;
        }
        round2(flagged.iter().sum::<u64>() as f64 / flagged.len() as f64)
    }

    /// Keep only rows whose entity is in `entities`
    pub fn restrict<'a>(&self, entities: impl IntoIterator<Item = &'a str>) -> IntegratedFlags {
        let keep: BTreeSet<&str> = entities.into_iter().collect();
        IntegratedFlags {
            counts: self
                .counts
                .iter()
                .filter(|((e, _), _)| keep.contains(e.as_str()))
                .map(|(k, c)| (k.clone(), *c))
                .collect(),
        }
    }

    /// Flag statistics for a network given its entity labels
    pub fn network_summary<S: AsRef<str>>(&self, entities: &[S]) -> FlagSummary {
        if entities.is_empty() || self.counts.is_empty() {
            return FlagSummary::default();
        }
        let per_entity: Vec<u64> = entities
            .iter()
            .map(|e| self.entity_flags(e.as_ref()))
            .collect();
        let community_flags: u64 = per_entity.iter().sum();
        let flagged_count = per_entity.iter().filter(|&&c| c > 0).count();
        let unflagged = entities.len() - flagged_count;

        let flagged_per_unflagged = if unflagged == 0 {
            flagged_count as f64
        } else {
            round2(flagged_count as f64 / unflagged as f64)
        };

        FlagSummary {
            community_flags,
            flagged_count,
            flagged_per_unflagged,
            flags_per_entity: round2(community_flags as f64 / entities.len() as f64),
        }
    }

    pub fn rows(&self) -> Vec<FlagRow> {
        self.counts
            .iter()
            .map(|((entity, flag), count)| FlagRow {
                entity: entity.clone(),
                flag: flag.clone(),
                count: *count,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
