//! The four first-class workflow templates (spec §4.3). Each is a pure
//! function from caller input to a flat list of DAG nodes; the orchestrator
//! is the only thing that talks to Redis/Postgres.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jobs::queue_names;

/// One node in a flow DAG: which queue/agent it runs on, its payload, and
/// the local ids of the nodes it waits on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobNode {
    /// Id unique within this flow instance, used only to wire dependencies
    /// before the orchestrator assigns real UUIDs.
    pub local_id: String,
    pub queue: String,
    pub agent_id: String,
    pub payload: Value,
    pub depends_on: Vec<String>,
}

impl JobNode {
    fn new(local_id: &str, queue: &str, agent_id: &str, payload: Value) -> Self {
        Self {
            local_id: local_id.to_string(),
            queue: queue.to_string(),
            agent_id: agent_id.to_string(),
            payload,
            depends_on: Vec::new(),
        }
    }

    fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// The four template names the orchestrator recognizes.
pub mod flow_names {
    pub const SEO_CONTENT_PIPELINE: &str = "seo-content-pipeline";
    pub const SEO_MONITORING_PIPELINE: &str = "seo-monitoring-pipeline";
    pub const SEO_COMPREHENSIVE_AUDIT: &str = "seo-comprehensive-audit";
    pub const LOCAL_SEO_OPTIMIZATION: &str = "local-seo-optimization";
}

/// Build the node list for `flow_name`, or `None` if the name isn't a
/// recognized template.
pub fn build(flow_name: &str, input: &Value) -> Option<Vec<JobNode>> {
    match flow_name {
        flow_names::SEO_CONTENT_PIPELINE => Some(seo_content_pipeline(input)),
        flow_names::SEO_MONITORING_PIPELINE => Some(seo_monitoring_pipeline(input)),
        flow_names::SEO_COMPREHENSIVE_AUDIT => Some(seo_comprehensive_audit(input)),
        flow_names::LOCAL_SEO_OPTIMIZATION => Some(local_seo_optimization(input)),
        _ => None,
    }
}

/// research & competitor-analysis (parallel) -> outline -> write -> publish.
/// Publish requires a gated approval flag carried in its own payload; the
/// flag's truthiness is the approval agent's concern, not the orchestrator's.
fn seo_content_pipeline(input: &Value) -> Vec<JobNode> {
    let keyword_research = JobNode::new(
        "keyword-research",
        queue_names::SMART_AGENTS,
        "keyword-researcher",
        input.clone(),
    );
    let competitor_monitoring = JobNode::new(
        "competitor-monitoring",
        queue_names::SMART_AGENTS,
        "competitor-monitor",
        input.clone(),
    );
    let outline = JobNode::new("outline", queue_names::SMART_AGENTS, "content-outliner", input.clone())
        .depends_on(&["keyword-research", "competitor-monitoring"]);
    let write = JobNode::new("write", queue_names::SMART_AGENTS, "content-writer", input.clone())
        .depends_on(&["outline"]);
    let publish = JobNode::new(
        "publish",
        queue_names::ORCHESTRATOR,
        "content-publisher",
        serde_json::json!({ "approved": input.get("approved").cloned().unwrap_or(Value::Bool(false)) }),
    )
    .depends_on(&["write"]);

    vec![keyword_research, competitor_monitoring, outline, write, publish]
}

/// Five independent monitoring jobs, no dependencies between them.
fn seo_monitoring_pipeline(input: &Value) -> Vec<JobNode> {
    [
        ("serp-daily-tracker", "serp-daily-tracker"),
        ("technical-audit", "technical-auditor"),
        ("pagespeed-check", "pagespeed-auditor"),
        ("backlink-discovery", "backlink-discoverer"),
        ("content-refresh-check", "content-refresh-checker"),
    ]
    .into_iter()
    .map(|(local_id, agent_id)| JobNode::new(local_id, queue_names::AUTO_TASKS, agent_id, input.clone()))
    .collect()
}

/// Nine audit jobs fanning into one report-generation job.
fn seo_comprehensive_audit(input: &Value) -> Vec<JobNode> {
    let audit_agents = [
        "technical-audit",
        "pagespeed-audit",
        "backlink-audit",
        "content-audit",
        "serp-audit",
        "schema-audit",
        "mobile-audit",
        "security-audit",
        "accessibility-audit",
    ];

    let mut nodes: Vec<JobNode> = audit_agents
        .iter()
        .map(|name| JobNode::new(name, queue_names::AUTO_TASKS, name, input.clone()))
        .collect();

    let report = JobNode::new("report-generation", queue_names::ORCHESTRATOR, "report-generator", input.clone())
        .depends_on(&audit_agents);
    nodes.push(report);
    nodes
}

/// One local-SEO audit followed by a report-generation job.
fn local_seo_optimization(input: &Value) -> Vec<JobNode> {
    let audit = JobNode::new("local-seo-audit", queue_names::AUTO_TASKS, "local-seo-auditor", input.clone());
    let report = JobNode::new("report-generation", queue_names::ORCHESTRATOR, "report-generator", input.clone())
        .depends_on(&["local-seo-audit"]);
    vec![audit, report]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_pipeline_has_expected_shape() {
        let nodes = seo_content_pipeline(&serde_json::json!({}));
        assert_eq!(nodes.len(), 5);
        let outline = nodes.iter().find(|n| n.local_id == "outline").unwrap();
        assert_eq!(outline.depends_on.len(), 2);
        let publish = nodes.iter().find(|n| n.local_id == "publish").unwrap();
        assert_eq!(publish.depends_on, vec!["write"]);
    }

    #[test]
    fn monitoring_pipeline_is_flat() {
        let nodes = seo_monitoring_pipeline(&serde_json::json!({}));
        assert_eq!(nodes.len(), 5);
        assert!(nodes.iter().all(|n| n.depends_on.is_empty()));
    }

    #[test]
    fn comprehensive_audit_fans_into_single_report() {
        let nodes = seo_comprehensive_audit(&serde_json::json!({}));
        assert_eq!(nodes.len(), 10);
        let report = nodes.iter().find(|n| n.local_id == "report-generation").unwrap();
        assert_eq!(report.depends_on.len(), 9);
    }

    #[test]
    fn local_seo_has_audit_then_report() {
        let nodes = local_seo_optimization(&serde_json::json!({}));
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].depends_on, vec!["local-seo-audit"]);
    }

    #[test]
    fn unknown_flow_name_is_none() {
        assert!(build("no-such-flow", &serde_json::json!({})).is_none());
    }
}
