//! Flow orchestrator (spec §4.3): expands a template into flow-job rows,
//! submits the DAG's root jobs atomically, and releases dependents as their
//! parents complete.
//!
//! Durable state lives in `flow_jobs`/`flow_job_dependencies` (see
//! `db::Database`); `FlowProducer` (C5) only guards the Redis-visibility
//! half of "publish the roots". The petgraph-based `dag::TaskDAG` is not
//! reused here: that module models single in-process task execution with
//! state transitions, while a flow DAG's nodes are durable rows released by
//! out-of-process workers, so the dependency bookkeeping is a join table
//! instead of a graph walked in memory.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AiseoError, Result};
use crate::jobs::{FlowEntry, FlowProducer, JobMetadata, QueuedJob};

use super::templates::{self, JobNode};

/// Result of submitting a flow.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FlowSubmission {
    pub flow_name: String,
    pub flow_job_id: Uuid,
}

pub struct FlowOrchestrator {
    db: Database,
    producer: Arc<FlowProducer>,
}

impl FlowOrchestrator {
    pub fn new(db: Database, producer: Arc<FlowProducer>) -> Self {
        Self { db, producer }
    }

    /// Expand `flow_name` against `input`, persist every node plus its
    /// dependency edges in one transaction, then atomically push the roots
    /// (nodes with no dependencies) onto their queues. Emits `flow.started`
    /// via the outbox once the transaction commits.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, flow_name = %flow_name))]
    pub async fn submit(
        &self,
        flow_name: &str,
        tenant_id: &str,
        project_id: Option<Uuid>,
        input: Value,
    ) -> Result<FlowSubmission> {
        let nodes = templates::build(flow_name, &input)
            .ok_or_else(|| AiseoError::validation(format!("unknown flow template: {flow_name}")))?;

        let flow_job_id = Uuid::new_v4();
        let mut tx = self.db.begin_admin().await?;
        let mut local_to_row: HashMap<String, Uuid> = HashMap::new();

        for node in &nodes {
            let row = self
                .db
                .insert_flow_job(
                    &mut tx,
                    flow_job_id,
                    flow_name,
                    tenant_id,
                    project_id,
                    &node.queue,
                    &node.agent_id,
                    node.payload.clone(),
                    None,
                    3,
                )
                .await?;
            local_to_row.insert(node.local_id.clone(), row.id);
        }

        for node in &nodes {
            let job_row_id = local_to_row[&node.local_id];
            for dep_local_id in &node.depends_on {
                let dep_row_id = *local_to_row.get(dep_local_id).ok_or_else(|| {
                    AiseoError::validation(format!("flow template {flow_name} references unknown node {dep_local_id}"))
                })?;
                self.db.insert_flow_job_dependency(&mut tx, job_row_id, dep_row_id).await?;
            }
        }

        self.db
            .insert_outbox_event(
                &mut tx,
                tenant_id,
                project_id,
                "flow.started",
                None,
                serde_json::json!({ "flowName": flow_name, "flowJobId": flow_job_id }),
            )
            .await?;

        tx.commit().await?;

        self.submit_ready_roots(&nodes, &local_to_row, flow_job_id, tenant_id, project_id).await?;

        info!(flow_name, %flow_job_id, node_count = nodes.len(), "flow submitted");
        Ok(FlowSubmission {
            flow_name: flow_name.to_string(),
            flow_job_id,
        })
    }

    async fn submit_ready_roots(
        &self,
        nodes: &[JobNode],
        local_to_row: &HashMap<String, Uuid>,
        flow_job_id: Uuid,
        tenant_id: &str,
        project_id: Option<Uuid>,
    ) -> Result<()> {
        let entries: Vec<FlowEntry> = nodes
            .iter()
            .filter(|n| n.depends_on.is_empty())
            .map(|n| {
                let row_id = local_to_row[&n.local_id];
                FlowEntry {
                    queue_key: n.queue.clone(),
                    job: queued_job_for(n, row_id, flow_job_id, tenant_id, project_id),
                }
            })
            .collect();

        self.producer.submit_roots(&entries).await
    }

    /// Called when a job's agent invocation succeeds: marks the row
    /// completed, releases any dependents whose last unmet dependency was
    /// this job, and emits `flow.completed` once every node in the run has
    /// reached a terminal state.
    #[instrument(skip(self), fields(%job_id))]
    pub async fn on_job_completed(&self, job_id: Uuid, flow_job_id: Uuid, tenant_id: &str, project_id: Option<Uuid>) -> Result<()> {
        self.db.mark_flow_job_completed(job_id).await?;

        for dependent in self.db.list_dependents(job_id).await? {
            let unmet = self.db.count_unmet_dependencies(dependent.id).await?;
            if unmet == 0 {
                let job = QueuedJob {
                    metadata: JobMetadata::new(dependent.agent_id.clone()).with_correlation_id(flow_job_id.to_string()),
                    data: wire_payload(&dependent.agent_id, dependent.id, flow_job_id, dependent.payload.clone(), tenant_id, dependent.project_id),
                    enqueued_at: chrono::Utc::now(),
                };
                self.producer
                    .submit_roots(&[FlowEntry {
                        queue_key: dependent.queue_name.clone(),
                        job,
                    }])
                    .await?;
            }
        }

        self.maybe_finalize(flow_job_id, tenant_id, project_id).await
    }

    /// Called when a job's agent invocation permanently fails: marks the row
    /// failed and cascades cancellation to every other not-yet-started job
    /// in the same flow run, since downstream stages can never become ready.
    #[instrument(skip(self, error), fields(%job_id))]
    pub async fn on_job_failed(
        &self,
        job_id: Uuid,
        flow_job_id: Uuid,
        attempt: i32,
        error: &str,
        tenant_id: &str,
        project_id: Option<Uuid>,
    ) -> Result<()> {
        self.db.mark_flow_job_failed(job_id, attempt, error).await?;

        let siblings = self.db.list_waiting_siblings(flow_job_id, job_id).await?;
        for sibling in &siblings {
            if let Err(e) = self.db.mark_flow_job_cancelled(sibling.id).await {
                warn!(error = %e, sibling_id = %sibling.id, "failed to cancel waiting sibling");
            }
        }
        if !siblings.is_empty() {
            info!(flow_job_id = %flow_job_id, cancelled = siblings.len(), "cascaded cancellation after permanent job failure");
        }

        self.maybe_finalize(flow_job_id, tenant_id, project_id).await
    }

    async fn maybe_finalize(&self, flow_job_id: Uuid, tenant_id: &str, project_id: Option<Uuid>) -> Result<()> {
        if self.db.count_incomplete_flow_jobs(flow_job_id).await? > 0 {
            return Ok(());
        }

        let failed = self.db.flow_has_failed_job(flow_job_id).await?;
        let event_type = if failed { "flow.failed" } else { "flow.completed" };
        self.db
            .emit_event(
                tenant_id,
                project_id,
                event_type,
                serde_json::json!({ "flowJobId": flow_job_id }),
            )
            .await?;
        Ok(())
    }
}

fn queued_job_for(node: &JobNode, row_id: Uuid, flow_job_id: Uuid, tenant_id: &str, project_id: Option<Uuid>) -> QueuedJob {
    QueuedJob {
        metadata: JobMetadata::new(node.agent_id.clone()).with_correlation_id(flow_job_id.to_string()),
        data: wire_payload(&node.agent_id, row_id, flow_job_id, node.payload.clone(), tenant_id, project_id),
        enqueued_at: chrono::Utc::now(),
    }
}

fn wire_payload(
    agent_id: &str,
    flow_job_row_id: Uuid,
    flow_job_id: Uuid,
    input: Value,
    tenant_id: &str,
    project_id: Option<Uuid>,
) -> Value {
    serde_json::json!({
        "tenantId": tenant_id,
        "projectId": project_id,
        "agentName": agent_id,
        "flowJobId": flow_job_id,
        "flowJobRowId": flow_job_row_id,
        "input": input,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_payload_carries_tenant_and_agent() {
        let value = wire_payload("keyword-researcher", Uuid::nil(), Uuid::nil(), serde_json::json!({"x": 1}), "acme", None);
        assert_eq!(value["tenantId"], "acme");
        assert_eq!(value["agentName"], "keyword-researcher");
    }
}
