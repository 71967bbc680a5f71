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

//! Exposure Analyzer
//!
//! Measures how a selected entity is exposed to flags carried by the other
//! entities of its network, and collects the shortest paths through which
//! that exposure travels.

use netdetect_core::{EngineError, EngineResult, IntegratedFlags, LabeledGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Annotation shown next to a node on an exposure path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAnnotation {
    /// Flag count of an entity
    Flags(u64),
    /// Degree of an attribute in the network subgraph
    Degree(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNode {
    pub label: String,
    pub annotation: Option<NodeAnnotation>,
}

impl fmt::Display for PathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.annotation {
            Some(NodeAnnotation::Flags(count)) => write!(f, "{} (flags: {count})", self.label),
            Some(NodeAnnotation::Degree(degree)) => write!(f, "{} (degree: {degree})", self.label),
            None => f.write_str(&self.label),
        }
    }
}

/// Paths sharing everything after their first node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathGroup {
    /// Flagged entities feeding into the suffix
    pub sources: Vec<PathNode>,
    /// Second node through the selected entity
    pub suffix: Vec<PathNode>,
}

impl PathGroup {
    pub fn source_labels(&self) -> Vec<&str> {
        self.sources.iter().map(|n| n.label.as_str()).collect()
    }

    pub fn suffix_labels(&self) -> Vec<&str> {
        self.suffix.iter().map(|n| n.label.as_str()).collect()
    }
}

impl fmt::Display for PathGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<String> = self.sources.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", sources.join(", "))?;
        for node in &self.suffix {
            write!(f, " -> [{node}]")?;
        }
        Ok(())
    }
}

/// Flag exposure of one entity within its network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureReport {
    pub selected: String,
    pub direct_flags: u64,
    pub indirect_flags: u64,
    pub total_flags: u64,
    /// Flagged entities in the network other than the selected one
    pub flagged_entities: usize,
    pub path_groups: Vec<PathGroup>,
}

impl ExposureReport {
    /// Number of distinct path groups
    pub fn paths(&self) -> usize {
        self.path_groups.len()
    }

    /// Human-readable report
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ExposureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Exposure report for {}", self.selected)?;
        writeln!(f, "Direct flags: {}", self.direct_flags)?;
        writeln!(f, "Indirect flags: {}", self.indirect_flags)?;
        writeln!(f, "Total flags: {}", self.total_flags)?;
        writeln!(f, "Flagged entities in network: {}", self.flagged_entities)?;
        writeln!(f, "Exposure paths: {}", self.paths())?;
        if self.path_groups.is_empty() {
            return writeln!(f, "No exposure paths found.");
        }
        writeln!(f)?;
        for (i, group) in self.path_groups.iter().enumerate() {
            writeln!(f, "{}. {group}", i + 1)?;
        }
        Ok(())
    }
}

/// Analyze exposure of `selected` given network entities `entities` and the
/// materialized network subgraph `network`.
///
/// Only flagged entities of the network act as path sources. Paths are
/// sorted by node sequence before grouping, and groups keep first-seen
/// order.
pub fn analyze_exposure<S: AsRef<str>>(
    flags: &IntegratedFlags,
    network: &LabeledGraph,
    selected: &str,
    entities: &[S],
) -> EngineResult<ExposureReport> {
    if flags.is_empty() {
        return Err(EngineError::EmptyInput("no flags have been integrated".into()));
    }
    let target = network
        .node_id(selected)
        .ok_or_else(|| EngineError::UnknownNode(selected.to_string()))?;

    let totals = flags
        .restrict(entities.iter().map(AsRef::as_ref))
        .entity_totals();
    let flagged: Vec<&String> = totals
        .iter()
        .filter(|(_, &count)| count > 0)
        .map(|(entity, _)| entity)
        .collect();

    let direct_flags = totals.get(selected).copied().unwrap_or(0);
    let total_flags: u64 = totals.values().sum();
    let flagged_entities = flagged.iter().filter(|e| e.as_str() != selected).count();

    let mut raw_paths: Vec<Vec<String>> = Vec::new();
    for source in &flagged {
        let Some(source_id) = network.node_id(source) else {
            continue;
        };
        for path in network.all_shortest_paths(source_id, target) {
            if path.len() <= 1 {
                continue;
            }
            raw_paths.push(path.iter().map(|&id| network.label(id).to_string()).collect());
        }
    }
    raw_paths.sort_by_cached_key(|path| path.join(" -> "));
    raw_paths.dedup();

    let annotate = |label: &str| -> PathNode {
        let annotation = network.node_id(label).and_then(|id| {
            if network.is_entity(id) {
                Some(flags.entity_flags(label))
                    .filter(|&count| count > 0)
                    .map(NodeAnnotation::Flags)
            } else {
                Some(NodeAnnotation::Degree(network.degree(id)))
            }
        });
        PathNode {
            label: label.to_string(),
            annotation,
        }
    };

    let mut path_groups: Vec<PathGroup> = Vec::new();
    let mut group_index: HashMap<Vec<String>, usize> = HashMap::new();
    for path in &raw_paths {
        let suffix = path[1..].to_vec();
        let index = *group_index.entry(suffix).or_insert_with(|| {
            path_groups.push(PathGroup {
                sources: Vec::new(),
                suffix: path[1..].iter().map(|label| annotate(label)).collect(),
            });
            path_groups.len() - 1
        });
        let group = &mut path_groups[index];
        if !group.sources.iter().any(|n| n.label == path[0]) {
            group.sources.push(annotate(&path[0]));
        }
    }

    debug!(
        selected,
        direct_flags,
        total_flags,
        paths = raw_paths.len(),
        groups = path_groups.len(),
        "Analyzed exposure"
    );

    Ok(ExposureReport {
        selected: selected.to_string(),
        direct_flags,
        indirect_flags: total_flags - direct_flags,
        total_flags,
        flagged_entities,
        path_groups,
    })
}
