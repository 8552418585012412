//! Job worker: the dequeue-execute-ack loop described in spec §4.2.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{AgentRegistry, AgentRunContext, SubagentExecutor};
use crate::db::Database;
use crate::error::{AiseoError, Result};
use crate::events::EventPublisher;
use crate::quota::{QuotaEngine, QuotaKind};

use super::{JobQueue, QueuedJob};

/// Configuration for the job worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum concurrent job executions
    pub concurrency: usize,
    /// Poll interval for checking the queue (milliseconds)
    pub poll_interval_ms: u64,
    /// Grace window for in-flight jobs after SIGINT (seconds)
    pub shutdown_timeout_secs: u64,
    /// Worker name/identifier
    pub name: String,
    /// Root directory under which per-job workspaces are allocated
    pub base_workspace_dir: PathBuf,
    /// Job type names this worker instance should not process, letting a
    /// specialized worker share a queue with the generic agent worker.
    pub skip_job_names: Vec<String>,
    /// Port for the liveness/readiness HTTP endpoint.
    pub liveness_port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1000,
            shutdown_timeout_secs: 30,
            name: "aiseo-worker".to_string(),
            base_workspace_dir: std::env::temp_dir().join("aiseo-jobs"),
            skip_job_names: Vec::new(),
            liveness_port: 3002,
        }
    }
}

/// Statistics for the job worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    pub processed: Arc<AtomicU64>,
    pub succeeded: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
    pub active: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    stats: WorkerStats,
}

impl WorkerHandle {
    /// Signal the worker to stop accepting new jobs and, after the grace
    /// window, abort whatever is still in flight.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}

/// The payload every job on an agent-bearing queue carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentJobPayload {
    pub tenant_id: String,
    pub project_id: Option<String>,
    pub agent_name: String,
    #[serde(default)]
    pub flow_job_id: Option<Uuid>,
    #[serde(default)]
    pub flow_job_row_id: Option<Uuid>,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default)]
    pub quota: Option<QuotaRequirement>,
}

/// A quota dimension this job's agent consumes, checked before invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaRequirement {
    pub kind: String,
    pub amount: i64,
    pub limit: i64,
}

impl QuotaRequirement {
    fn quota_kind(&self) -> Result<QuotaKind> {
        match self.kind.as_str() {
            "api_calls" => Ok(QuotaKind::ApiCalls),
            "serp_jobs" => Ok(QuotaKind::SerpJobs),
            "crawl_jobs" => Ok(QuotaKind::CrawlJobs),
            other => Err(AiseoError::validation(format!("unknown quota kind: {other}"))),
        }
    }
}

/// Shared dependencies every job execution needs. Cheap to clone: everything
/// inside is already an `Arc`/connection-pool handle.
#[derive(Clone)]
pub struct WorkerDeps {
    pub db: Database,
    pub quota: Arc<QuotaEngine>,
    pub registry: AgentRegistry,
    pub events: Arc<dyn EventPublisher>,
    pub orchestrator: Arc<crate::flow::FlowOrchestrator>,
    pub queue_name: String,
}

/// Job worker that processes jobs from a queue.
pub struct JobWorker {
    config: WorkerConfig,
    stats: WorkerStats,
}

impl JobWorker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            stats: WorkerStats::new(),
        }
    }

    /// Start the worker: `concurrency` concurrent executors pulling from
    /// `queue`, plus a liveness HTTP endpoint, until `shutdown` is signalled
    /// or the process receives SIGINT.
    pub fn start(self, queue: Arc<JobQueue>, deps: WorkerDeps) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();
        let config = self.config.clone();
        let shutting_down = Arc::new(AtomicBool::new(false));

        tokio::spawn(serve_liveness(config.liveness_port, shutting_down.clone(), shutdown_rx.clone()));

        let mut sigint_rx = shutdown_rx.clone();
        let sigint_shutdown = shutdown_tx.clone();
        let sigint_flag = shutting_down.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("SIGINT received, starting graceful shutdown");
                    sigint_flag.store(true, Ordering::Relaxed);
                    let _ = sigint_shutdown.send(true);
                }
                _ = sigint_rx.changed() => {}
            }
        });

        tokio::spawn(run_worker_loop(config, stats.clone(), queue, deps, shutdown_rx, shutting_down));

        WorkerHandle {
            shutdown: shutdown_tx,
            stats,
        }
    }
}

async fn run_worker_loop(
    config: WorkerConfig,
    stats: WorkerStats,
    queue: Arc<JobQueue>,
    deps: WorkerDeps,
    mut shutdown_rx: watch::Receiver<bool>,
    shutting_down: Arc<AtomicBool>,
) {
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let poll_interval = Duration::from_millis(config.poll_interval_ms);

    info!(worker = %config.name, concurrency = config.concurrency, "job worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let job = tokio::select! {
            job = queue.dequeue() => job,
            _ = shutdown_rx.changed() => break,
        };

        match job {
            Ok(Some(job)) => {
                if config.skip_job_names.contains(&job.metadata.job_type) {
                    let _ = queue.enqueue(job).await;
                    continue;
                }

                let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
                let stats = stats.clone();
                let deps = deps.clone();
                let base_dir = config.base_workspace_dir.clone();
                let queue_for_retry = queue.clone();

                stats.active.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(async move {
                    let _permit = permit;
                    execute_job(job, &deps, &base_dir, &stats, &queue_for_retry).await;
                    stats.active.fetch_sub(1, Ordering::Relaxed);
                });
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
            Err(err) => {
                warn!(error = %err, "job dequeue error");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }

    shutting_down.store(true, Ordering::Relaxed);
    info!(
        worker = %config.name,
        grace_secs = config.shutdown_timeout_secs,
        "worker draining in-flight jobs"
    );
    tokio::time::sleep(Duration::from_secs(config.shutdown_timeout_secs)).await;
    info!(worker = %config.name, "worker stopped");
}

async fn execute_job(mut job: QueuedJob, deps: &WorkerDeps, base_dir: &std::path::Path, stats: &WorkerStats, queue: &Arc<JobQueue>) {
    stats.processed.fetch_add(1, Ordering::Relaxed);
    job.metadata.mark_running();

    match run_payload(&mut job, deps, base_dir).await {
        Ok(()) => {
            stats.succeeded.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            job.metadata.mark_failed(&err.to_string());
            let will_retry = err.is_retryable() && job.metadata.can_retry();
            warn!(job_id = %job.metadata.id, error = %err, will_retry, "job execution failed");

            if will_retry {
                let delay = super::job::RetryPolicy::default().backoff.delay_for_attempt(job.metadata.attempts);
                let queue = queue.clone();
                let mut retry_job = job.clone();
                retry_job.metadata.status = super::job::JobStatus::Pending;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = queue.enqueue(retry_job).await {
                        error!(error = %e, "failed to re-enqueue retried job");
                    }
                });
            } else {
                job.metadata.mark_dead(&err.to_string());
                queue.dead_letter(job).await;
            }
        }
    }
}

async fn run_payload(job: &mut QueuedJob, deps: &WorkerDeps, base_dir: &std::path::Path) -> Result<()> {
    let payload: AgentJobPayload = serde_json::from_value(job.data.clone())
        .map_err(|e| AiseoError::validation(format!("malformed job payload: {e}")))?;

    if payload.tenant_id.is_empty() {
        return Err(AiseoError::validation("job payload missing tenantId"));
    }

    emit(deps, &payload, "agent.task.started", job, 10, None).await;

    let agent_dir = base_dir.join(&payload.agent_name);
    tokio::fs::create_dir_all(&agent_dir).await.map_err(AiseoError::from)?;
    let workspace = tempfile::Builder::new()
        .prefix(&format!("{}-", job.metadata.id))
        .tempdir_in(&agent_dir)
        .map_err(AiseoError::from)?;

    emit(deps, &payload, "agent.task.started", job, 30, None).await;

    if let Some(quota) = &payload.quota {
        let kind = quota.quota_kind()?;
        let check = deps.quota.check(&payload.tenant_id, kind, quota.amount, quota.limit).await;
        if !check.allowed {
            let err = AiseoError::quota_exceeded(quota.kind.clone(), check.used, check.limit);
            emit_failure(deps, &payload, job, &err, false).await;
            notify_flow_failed(deps, &payload, job, &err).await;
            return Ok(());
        }
    }

    let ctx = AgentRunContext {
        tenant_id: payload.tenant_id.clone(),
        project_id: payload.project_id.clone(),
        agent_id: payload.agent_name.clone(),
        workspace_path: workspace.path().to_path_buf(),
        tools: Arc::new(HashMap::new()),
        event_bus: deps.events.clone(),
        subagents: SubagentExecutor::new(deps.registry.clone(), 0),
        depth: 0,
    };

    let result = deps.registry.invoke(&payload.agent_name, payload.input.clone(), &ctx).await;
    drop(workspace);

    match result {
        Ok(output) => {
            emit(deps, &payload, "agent.task.completed", job, 100, Some(output)).await;
            notify_flow_completed(deps, &payload).await;
            Ok(())
        }
        Err(err) => {
            job.metadata.mark_failed(&err.to_string());
            let will_retry = err.is_retryable() && job.metadata.can_retry();
            emit_failure(deps, &payload, job, &err, will_retry).await;
            if !will_retry {
                notify_flow_failed(deps, &payload, job, &err).await;
            }
            Err(err)
        }
    }
}

async fn emit(
    deps: &WorkerDeps,
    payload: &AgentJobPayload,
    event_type: &str,
    job: &QueuedJob,
    progress: u8,
    result: Option<serde_json::Value>,
) {
    let project_id = payload
        .project_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok());

    let mut body = serde_json::json!({
        "queue": deps.queue_name,
        "agentName": payload.agent_name,
        "jobId": job.metadata.id.to_string(),
        "attempt": job.metadata.attempts,
        "progress": progress,
    });
    if let Some(result) = result {
        body["result"] = result;
    }

    if let Err(err) = deps
        .db
        .emit_event(&payload.tenant_id, project_id, event_type, body)
        .await
    {
        warn!(error = %err, event_type, "failed to emit job lifecycle event");
    }
}

async fn emit_failure(deps: &WorkerDeps, payload: &AgentJobPayload, job: &QueuedJob, err: &AiseoError, will_retry: bool) {
    let project_id = payload
        .project_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok());

    let body = serde_json::json!({
        "queue": deps.queue_name,
        "agentName": payload.agent_name,
        "jobId": job.metadata.id.to_string(),
        "attempt": job.metadata.attempts,
        "error": err.user_message(),
        "willRetry": will_retry,
    });

    if let Err(e) = deps
        .db
        .emit_event(&payload.tenant_id, project_id, "agent.task.failed", body)
        .await
    {
        warn!(error = %e, "failed to emit agent.task.failed");
    }
}

/// Release this job's dependents and check for flow completion, when this
/// job was submitted as part of a flow run rather than standalone.
async fn notify_flow_completed(deps: &WorkerDeps, payload: &AgentJobPayload) {
    let (Some(flow_job_id), Some(flow_job_row_id)) = (payload.flow_job_id, payload.flow_job_row_id) else {
        return;
    };
    let project_id = payload.project_id.as_deref().and_then(|id| Uuid::parse_str(id).ok());
    if let Err(err) = deps
        .orchestrator
        .on_job_completed(flow_job_row_id, flow_job_id, &payload.tenant_id, project_id)
        .await
    {
        error!(error = %err, flow_job_id = %flow_job_id, "failed to release flow dependents after job completion");
    }
}

/// Cascade a permanent job failure to the rest of its flow run, when this
/// job was submitted as part of a flow run rather than standalone.
async fn notify_flow_failed(deps: &WorkerDeps, payload: &AgentJobPayload, job: &QueuedJob, err: &AiseoError) {
    let (Some(flow_job_id), Some(flow_job_row_id)) = (payload.flow_job_id, payload.flow_job_row_id) else {
        return;
    };
    let project_id = payload.project_id.as_deref().and_then(|id| Uuid::parse_str(id).ok());
    if let Err(e) = deps
        .orchestrator
        .on_job_failed(
            flow_job_row_id,
            flow_job_id,
            job.metadata.attempts as i32,
            &err.user_message(),
            &payload.tenant_id,
            project_id,
        )
        .await
    {
        error!(error = %e, flow_job_id = %flow_job_id, "failed to cascade flow failure");
    }
}

async fn serve_liveness(port: u16, shutting_down: Arc<AtomicBool>, mut shutdown_rx: watch::Receiver<bool>) {
    let app = Router::new()
        .route("/healthz", get(liveness_handler))
        .with_state(shutting_down);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, port, "failed to bind worker liveness endpoint");
            return;
        }
    };

    let shutdown = async move {
        let _ = shutdown_rx.changed().await;
    };

    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(error = %err, "worker liveness endpoint exited unexpectedly");
    }
}

async fn liveness_handler(State(shutting_down): State<Arc<AtomicBool>>) -> impl IntoResponse {
    if shutting_down.load(Ordering::Relaxed) {
        (StatusCode::SERVICE_UNAVAILABLE, "stopping")
    } else {
        (StatusCode::OK, "ok")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_default_matches_spec() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert_eq!(config.liveness_port, 3002);
    }

    #[test]
    fn unknown_quota_kind_is_rejected() {
        let req = QuotaRequirement {
            kind: "bogus".to_string(),
            amount: 1,
            limit: 10,
        };
        assert!(req.quota_kind().is_err());
    }

    #[test]
    fn payload_requires_tenant_id() {
        let value = serde_json::json!({
            "tenantId": "",
            "agentName": "content-writer",
        });
        let payload: AgentJobPayload = serde_json::from_value(value).unwrap();
        assert!(payload.tenant_id.is_empty());
    }

    #[test]
    fn payload_deserializes_camel_case_wire_format() {
        let value = serde_json::json!({
            "tenantId": "acme",
            "projectId": "proj-1",
            "agentName": "content-writer",
            "input": {"topic": "rust"},
        });
        let payload: AgentJobPayload = serde_json::from_value(value).unwrap();
        assert_eq!(payload.tenant_id, "acme");
        assert_eq!(payload.project_id.as_deref(), Some("proj-1"));
    }
}
