//! Cross-template integrity checks for the four flow templates (spec §4.3):
//! every node's `local_id` is unique within its template, and every
//! `depends_on` entry resolves to a node that's actually declared. The
//! orchestrator trusts this at submission time rather than re-validating it
//! per tenant request, so a template that violates it would silently drop
//! dependency edges in production.

use std::collections::HashSet;

use aiseo_core::flow::flow_names;

const TEMPLATES: &[&str] = &[
    flow_names::SEO_CONTENT_PIPELINE,
    flow_names::SEO_MONITORING_PIPELINE,
    flow_names::SEO_COMPREHENSIVE_AUDIT,
    flow_names::LOCAL_SEO_OPTIMIZATION,
];

#[test]
fn every_template_has_unique_local_ids_and_resolvable_dependencies() {
    for name in TEMPLATES {
        let nodes = aiseo_core::flow::build(name, &serde_json::json!({})).unwrap_or_else(|| panic!("template {name} should build"));

        let ids: HashSet<&str> = nodes.iter().map(|n| n.local_id.as_str()).collect();
        assert_eq!(ids.len(), nodes.len(), "template {name} declares duplicate local_id");

        for node in &nodes {
            for dep in &node.depends_on {
                assert!(
                    ids.contains(dep.as_str()),
                    "template {name} node {} depends on undeclared node {dep}",
                    node.local_id
                );
            }
        }
    }
}

#[test]
fn every_template_has_at_least_one_root() {
    for name in TEMPLATES {
        let nodes = aiseo_core::flow::build(name, &serde_json::json!({})).unwrap();
        assert!(
            nodes.iter().any(|n| n.depends_on.is_empty()),
            "template {name} has no root node to submit at flow start"
        );
    }
}

#[test]
fn every_template_node_targets_a_known_queue() {
    use aiseo_core::jobs::queue_names::{AUTO_TASKS, ORCHESTRATOR, SMART_AGENTS};

    for name in TEMPLATES {
        let nodes = aiseo_core::flow::build(name, &serde_json::json!({})).unwrap();
        for node in &nodes {
            assert!(
                [ORCHESTRATOR, SMART_AGENTS, AUTO_TASKS].contains(&node.queue.as_str()),
                "template {name} node {} targets unknown queue {}",
                node.local_id,
                node.queue
            );
        }
    }
}
