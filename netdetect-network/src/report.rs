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

//! Report payload handed to an external text-generation service.

use netdetect_core::{EdgeRow, EngineResult, LabeledGraph, NodeRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::exposure::ExposureReport;

/// Everything needed to describe one entity's network exposure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportInput {
    pub entity_id: String,
    pub network_id: usize,
    pub max_entity_flags: u64,
    pub mean_flagged_flags: f64,
    /// Rendered exposure report
    pub exposure_report: String,
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
}

impl ReportInput {
    /// Assemble the payload from an exposure report and the simplified
    /// network subgraph
    pub fn new(
        entity_id: &str,
        network_id: usize,
        max_entity_flags: u64,
        mean_flagged_flags: f64,
        exposure: &ExposureReport,
        simplified: &LabeledGraph,
    ) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            network_id,
            max_entity_flags,
            mean_flagged_flags,
            exposure_report: exposure.render(),
            nodes: simplified.node_rows(),
            edges: simplified.edge_rows(),
        }
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Flat string map for template filling; tables are JSON encoded
    pub fn to_prompt_variables(&self) -> EngineResult<BTreeMap<String, String>> {
        let mut vars = BTreeMap::new();
        vars.insert("entity_id".to_string(), self.entity_id.clone());
        vars.insert("network_id".to_string(), self.network_id.to_string());
        vars.insert("max_entity_flags".to_string(), self.max_entity_flags.to_string());
        vars.insert("mean_flagged_flags".to_string(), format!("{:.2}", self.mean_flagged_flags));
        vars.insert("exposure_report".to_string(), self.exposure_report.clone());
        vars.insert("network_nodes".to_string(), serde_json::to_string(&self.nodes)?);
        vars.insert("network_edges".to_string(), serde_json::to_string(&self.edges)?);
        Ok(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdetect_core::ENTITY_LABEL;

    fn report() -> ReportInput {
        let mut g = LabeledGraph::new();
        let a = g.add_node("ENTITY==A", ENTITY_LABEL);
        let p = g.add_node("phone==1", "phone");
        g.add_edge(a, p, "phone");
        g.node_mut(a).flags = 2;
        g.node_mut(a).network = Some(3);

        let exposure = ExposureReport {
            selected: "ENTITY==A".into(),
            direct_flags: 2,
            indirect_flags: 0,
            total_flags: 2,
            flagged_entities: 0,
            path_groups: Vec::new(),
        };
        ReportInput::new("ENTITY==A", 3, 7, 2.5, &exposure, &g)
    }

    #[test]
    fn test_prompt_variables() {
        let vars = report().to_prompt_variables().unwrap();
        assert_eq!(vars["network_id"], "3");
        assert_eq!(vars["mean_flagged_flags"], "2.50");
        assert!(vars["exposure_report"].contains("Direct flags: 2"));
        assert!(vars["network_edges"].contains("\"type\":\"phone\""));
    }

    #[test]
    fn test_json_payload() {
        let json = report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["entity_id"], "ENTITY==A");
        assert_eq!(value["nodes"][0]["flags"], 2);
        assert_eq!(value["edges"].as_array().map(Vec::len), Some(1));
    }
}
