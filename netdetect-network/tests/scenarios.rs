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

//! End-to-end detection scenarios

use netdetect_core::{
    Cell, EngineError, FlagAggregator, IntegratedFlags, FlagLink, LabeledGraph, NetworkConfig,
    Table, ENTITY_LABEL,
};
use netdetect_index::{EmbeddingIndexer, IndexControl, IndexerOptions, MockEmbedder, RetryPolicy};
use netdetect_network::{analyze_exposure, NetworkWorkflow};
use std::collections::BTreeSet;
use std::sync::Arc;

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn no_exclusions() -> Vec<String> {
    Vec::new()
}

fn workflow_with(configure: impl FnOnce(&mut NetworkConfig)) -> NetworkWorkflow {
    let mut config = NetworkConfig::default();
    configure(&mut config);
    NetworkWorkflow::new(config).unwrap()
}

fn fast_indexer(embedder: MockEmbedder) -> EmbeddingIndexer {
    EmbeddingIndexer::new(
        Arc::new(embedder),
        IndexerOptions {
            retry: RetryPolicy::immediate(5),
            ..IndexerOptions::default()
        },
    )
}

fn assert_exact_cover(workflow: &NetworkWorkflow, cap: usize) {
    let partition = workflow.partition();
    let mut seen = BTreeSet::new();
    for network in &partition.networks {
        assert!(!network.is_empty() && network.len() <= cap);
        for entity in network {
            assert!(seen.insert(entity.clone()), "{entity} appears twice");
        }
    }
    let entities: BTreeSet<String> = workflow
        .projected_graph()
        .entity_ids()
        .map(|id| workflow.projected_graph().label(id).to_string())
        .collect();
    assert_eq!(seen, entities);
}

/// Shared phone number puts A and B in one network
#[test]
fn scenario_a_hard_equality() {
    let mut wf = workflow_with(|_| {});
    let table = Table::new(["id", "phone"])
        .with_row(["A", "555-1"])
        .with_row(["B", "555-1"]);
    wf.add_attribute_links(&table, "id", &cols(&["phone"])).unwrap();

    let partition = wf.identify_networks(&no_exclusions()).unwrap();
    assert_eq!(partition.networks, vec![vec!["ENTITY==A", "ENTITY==B"]]);
    assert_eq!(
        wf.projected_graph().edge_label_pairs(),
        vec![("ENTITY==A".to_string(), "ENTITY==B".to_string())]
    );
}

/// Near-identical names are linked through inference
#[tokio::test]
async fn scenario_b_fuzzy_equality() {
    let mut wf = workflow_with(|_| {});
    let table = Table::new(["id", "name"])
        .with_row(["A", "PlusOne"])
        .with_row(["B", "Plus One"]);
    wf.add_attribute_links(&table, "id", &cols(&["name"])).unwrap();

    wf.identify_networks(&no_exclusions()).unwrap();
    assert_eq!(wf.partition().len(), 2);

    let mut indexer = fast_indexer(
        MockEmbedder::new()
            .with_vector("name==PlusOne", vec![1.0, 0.0])
            .with_vector("name==Plus One", vec![0.99, 0.05]),
    );
    let indexed = wf
        .index_nodes(&mut indexer, &cols(&["name"]), &IndexControl::default())
        .await
        .unwrap();
    assert_eq!(indexed, 2);

    assert_eq!(wf.infer_links(Some(0.1)).unwrap(), 1);
    assert_eq!(
        wf.inferred_links_table(),
        vec![("name==Plus One".to_string(), "name==PlusOne".to_string())]
    );

    wf.identify_networks(&no_exclusions()).unwrap();
    assert_eq!(wf.projected_graph().edge_count(), 1);
    assert_eq!(wf.partition().len(), 1);

    // The bridge is drawn with at least one selected endpoint per edge
    let h = wf.materialize_network(0).unwrap();
    let members: BTreeSet<&str> = ["ENTITY==A", "ENTITY==B"].into();
    for (a, b, _) in h.edges() {
        assert!(members.contains(h.label(a)) || members.contains(h.label(b)));
    }

    wf.clear_inferred_links();
    wf.identify_networks(&no_exclusions()).unwrap();
    assert_eq!(wf.partition().len(), 2);
}

/// A value shared by too many entities is ignored
#[test]
fn scenario_c_trimming() {
    let mut wf = workflow_with(|c| c.detection.max_attribute_degree = 2);
    let table = Table::new(["id", "email"])
        .with_row(["A", "common@example"])
        .with_row(["B", "common@example"])
        .with_row(["C", "common@example"]);
    wf.add_attribute_links(&table, "id", &cols(&["email"])).unwrap();

    wf.identify_networks(&no_exclusions()).unwrap();
    assert!(wf.trim_result().trimmed.contains("email==common@example"));
    assert_eq!(wf.projected_graph().edge_count(), 0);
    assert_eq!(wf.partition().len(), 3);
    assert!(wf.partition().networks.iter().all(|n| n.len() == 1));
}

/// Exposure paths from flagged entities to C
#[test]
fn scenario_d_exposure_paths() {
    let mut h = LabeledGraph::new();
    for id in ["A", "C", "D", "F", "Z"] {
        h.add_node(&format!("ENTITY=={id}"), ENTITY_LABEL);
    }
    for (a, b) in [("A", "C"), ("A", "D"), ("C", "F"), ("D", "F")] {
        let a = h.node_id(&format!("ENTITY=={a}")).unwrap();
        let b = h.node_id(&format!("ENTITY=={b}")).unwrap();
        h.add_edge(a, b, "projected");
    }

    let links: Vec<FlagLink> = [("A", 8), ("C", 2), ("D", 3), ("F", 0), ("Z", 3)]
        .into_iter()
        .map(|(entity, count)| FlagLink {
            entity_id: entity.into(),
            flag_type: "risk".into(),
            flag_value: "1".into(),
            count,
        })
        .collect();
    let flags = IntegratedFlags::from_links(&links, "==");

    let report = analyze_exposure(
        &flags,
        &h,
        "ENTITY==C",
        &["ENTITY==A", "ENTITY==C", "ENTITY==D"],
    )
    .unwrap();

    assert_eq!(report.direct_flags, 2);
    assert_eq!(report.indirect_flags, 11);
    assert_eq!(report.flagged_entities, 2);
    assert_eq!(report.paths(), 3);

    let groups: BTreeSet<(Vec<&str>, Vec<&str>)> = report
        .path_groups
        .iter()
        .map(|g| (g.source_labels(), g.suffix_labels()))
        .collect();
    let expected: BTreeSet<(Vec<&str>, Vec<&str>)> = [
        (vec!["ENTITY==D"], vec!["ENTITY==A", "ENTITY==C"]),
        (vec!["ENTITY==D"], vec!["ENTITY==F", "ENTITY==C"]),
        (vec!["ENTITY==A"], vec!["ENTITY==C"]),
    ]
    .into();
    assert_eq!(groups, expected);

    // Sources all carry flags; F has none and shows no annotation
    for group in &report.path_groups {
        assert!(group.sources.iter().all(|s| s.annotation.is_some()));
    }
    let f_node = report
        .path_groups
        .iter()
        .flat_map(|g| g.suffix.iter())
        .find(|n| n.label == "ENTITY==F")
        .unwrap();
    assert_eq!(f_node.annotation, None);
}

/// A long chain is cut into capped networks
#[test]
fn scenario_e_size_cap() {
    let mut wf = workflow_with(|c| c.detection.max_network_entities = 10);
    let mut table = Table::new(["id", "phone", "fax"]);
    for i in 0..40i64 {
        table.push_row(vec![Cell::from(format!("E{i:02}")), Cell::from(i), Cell::from(i + 1)]);
    }
    wf.add_attribute_links(&table, "id", &cols(&["phone", "fax"])).unwrap();

    wf.identify_networks(&no_exclusions()).unwrap();
    assert_eq!(wf.projected_graph().connected_components().len(), 1);
    assert!(wf.partition().len() >= 4);
    assert_exact_cover(&wf, 10);
}

/// Count links for the same entity and flag add up
#[test]
fn scenario_f_flag_aggregation() {
    let mut wf = workflow_with(|_| {});
    for count in [3i64, 5] {
        let table = Table::new(["id", "risk"]).with_row(vec![Cell::from("A"), Cell::from(count)]);
        wf.add_flag_links(&table, "id", &cols(&["risk"]), FlagAggregator::Count)
            .unwrap();
    }
    let flags = wf.integrated_flags();
    assert_eq!(flags.get("ENTITY==A", "risk==risk"), 8);
    assert!(flags.max_entity_flags() >= 8);
}

#[test]
fn empty_table_yields_no_networks() {
    let mut wf = workflow_with(|_| {});
    let table = Table::new(["id", "phone"]);
    assert_eq!(wf.add_attribute_links(&table, "id", &cols(&["phone"])).unwrap(), 0);
    assert!(wf.main_graph().is_empty());
    assert!(wf.identify_networks(&no_exclusions()).unwrap().is_empty());
}

#[test]
fn single_entity_has_no_exposure_paths() {
    let mut wf = workflow_with(|_| {});
    let mut table = Table::new(["id", "phone"]);
    table.push_row(vec![Cell::from("A"), Cell::Null]);
    wf.add_attribute_links(&table, "id", &cols(&["phone"])).unwrap();
    assert_eq!(wf.main_graph().node_count(), 1);
    let risk = Table::new(["id", "risk"]).with_row(["A", "high"]);
    wf.add_flag_links(&risk, "id", &cols(&["risk"]), FlagAggregator::Instance)
        .unwrap();

    let partition = wf.identify_networks(&no_exclusions()).unwrap();
    assert_eq!(partition.networks, vec![vec!["ENTITY==A"]]);

    let report = wf.entity_exposure("A").unwrap();
    assert_eq!(report.direct_flags, 1);
    assert_eq!(report.paths(), 0);
    assert_eq!(report.flagged_entities, 0);
}

#[test]
fn exposure_without_flags_is_rejected() {
    let mut wf = workflow_with(|_| {});
    let table = Table::new(["id", "phone"]).with_row(["A", "1"]);
    wf.add_attribute_links(&table, "id", &cols(&["phone"])).unwrap();
    wf.identify_networks(&no_exclusions()).unwrap();
    assert!(matches!(wf.entity_exposure("A"), Err(EngineError::EmptyInput(_))));
}

/// With every neighbour inferred equal the cap still holds
#[tokio::test]
async fn loose_threshold_respects_cap() {
    let mut wf = workflow_with(|c| c.detection.max_network_entities = 5);
    let mut table = Table::new(["id", "name"]);
    for i in 0..30 {
        table.push_row([format!("E{i}"), format!("Name {i}")]);
    }
    wf.add_attribute_links(&table, "id", &cols(&["name"])).unwrap();

    let mut indexer = fast_indexer(MockEmbedder::new());
    wf.index_nodes(&mut indexer, &cols(&["name"]), &IndexControl::default())
        .await
        .unwrap();
    wf.infer_links(Some(1.0)).unwrap();
    assert!(wf.inferred_links().is_symmetric());

    wf.identify_networks(&no_exclusions()).unwrap();
    assert_exact_cover(&wf, 5);
}

/// Clearing and re-ingesting gives the same projection, flags and networks
#[test]
fn clear_and_reingest_is_reproducible() {
    let contacts = Table::new(["id", "phone", "email"])
        .with_row(["A", "1", "a@x"])
        .with_row(["B", "1", "b@x"])
        .with_row(["C", "2", "b@x"])
        .with_row(["D", "3", "d@x"]);
    let risk = Table::new(["id", "risk"])
        .with_row(vec![Cell::from("A"), Cell::from(2i64)])
        .with_row(vec![Cell::from("D"), Cell::from(1i64)]);

    let mut wf = workflow_with(|c| c.detection.max_network_entities = 2);
    let run = |wf: &mut NetworkWorkflow| {
        wf.add_attribute_links(&contacts, "id", &cols(&["phone", "email"]))
            .unwrap();
        wf.add_flag_links(&risk, "id", &cols(&["risk"]), FlagAggregator::Count)
            .unwrap();
        wf.identify_networks(&no_exclusions()).unwrap();
        (
            wf.projected_graph().edge_label_pairs(),
            wf.integrated_flags().clone(),
            wf.partition().clone(),
        )
    };

    let first = run(&mut wf);
    wf.clear_data_model();
    let second = run(&mut wf);
    assert_eq!(first, second);
}

#[test]
fn report_payload_uses_simplified_network() {
    let mut wf = workflow_with(|_| {});
    let contacts = Table::new(["id", "phone", "email"])
        .with_row(["A", "1", "solo@x"])
        .with_row(["B", "1", "b@x"]);
    wf.add_attribute_links(&contacts, "id", &cols(&["phone", "email"]))
        .unwrap();
    let risk = Table::new(["id", "risk"]).with_row(["A", "high"]);
    wf.add_flag_links(&risk, "id", &cols(&["risk"]), FlagAggregator::Instance)
        .unwrap();
    wf.identify_networks(&no_exclusions()).unwrap();

    let report = wf.build_report("ENTITY==B").unwrap();
    assert_eq!(report.entity_id, "B");
    assert!(report.nodes.iter().any(|n| n.node == "phone==1"));
    assert!(!report.nodes.iter().any(|n| n.node == "email==solo@x"));
    assert!(report.exposure_report.contains("ENTITY==A (flags: 1)"));

    let vars = report.to_prompt_variables().unwrap();
    assert_eq!(vars["entity_id"], "B");
}
