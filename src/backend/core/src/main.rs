//! aiseo-worker - orchestration substrate entry point.
//!
//! Boots every long-running component described in SPEC_FULL.md §4 as
//! cooperating tasks in one process: the flow orchestrator's cron scheduler,
//! the outbox dispatcher, the quota-aware job workers (one per queue), the
//! webhook delivery worker, and the websocket fan-out router. Exit codes
//! follow spec §6: 0 on a clean shutdown, 1 on a startup failure, 130 on
//! SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aiseo_core::config::Config;
use aiseo_core::db::Database;
use aiseo_core::events::EventBus;
use aiseo_core::flow::FlowOrchestrator;
use aiseo_core::jobs::{
    queue_names, CronScheduler, JobQueue, JobWorker, QueueConfig, RedisQueueBackend, WorkerConfig, WorkerDeps,
};
use aiseo_core::observability;
use aiseo_core::outbox::{DispatchConfig, OutboxDispatcher};
use aiseo_core::quota::QuotaEngine;
use aiseo_core::webhook::WebhookDeliveryWorker;
use aiseo_core::websocket::{ws_fanout_handler, FanoutRouter, WebSocketAuth};
use aiseo_core::agents::AgentRegistry;

const FANOUT_TOKEN_EXPIRATION_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();

    match run().await {
        Ok(()) => std::process::ExitCode::from(0),
        Err(StartupOrShutdown::Interrupted) => std::process::ExitCode::from(130),
        Err(StartupOrShutdown::Failed(e)) => {
            eprintln!("aiseo-worker failed to start: {e:#}");
            std::process::ExitCode::from(1)
        }
    }
}

enum StartupOrShutdown {
    Interrupted,
    Failed(anyhow::Error),
}

impl<E: Into<anyhow::Error>> From<E> for StartupOrShutdown {
    fn from(e: E) -> Self {
        StartupOrShutdown::Failed(e.into())
    }
}

async fn run() -> Result<(), StartupOrShutdown> {
    let config = Config::load()?;

    observability::init("aiseo-worker", config.observability.otlp_endpoint.as_deref())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting aiseo-worker");

    let db = Database::new(&config.database_url).await?;
    tracing::info!("connected to database");

    let bus = EventBus::connect(&config.redis_url).await?;
    let quota = Arc::new(QuotaEngine::connect(&config.redis_url, db.clone()).await?);
    let registry = AgentRegistry::new();

    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|e| anyhow::anyhow!("failed to create redis client: {e}"))?;
    let producer = Arc::new(aiseo_core::jobs::FlowProducer::new(redis_client.clone()));
    let orchestrator = Arc::new(FlowOrchestrator::new(db.clone(), producer));

    let scheduler = Arc::new(CronScheduler::new(db.clone(), orchestrator.clone()));
    scheduler.clone().load_all().await?;
    tracing::info!("cron schedules loaded");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let outbox = Arc::new(OutboxDispatcher::new(db.clone(), bus.clone(), DispatchConfig::default()));
    tokio::spawn(outbox.run(shutdown_rx.clone()));

    let quota_for_sync = quota.clone();
    let mut quota_shutdown_rx = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = quota_for_sync.sync_all().await {
                        tracing::error!(error = %e, "quota usage sync failed");
                    }
                }
                _ = quota_shutdown_rx.changed() => {
                    if *quota_shutdown_rx.borrow() {
                        return;
                    }
                }
            }
        }
    });

    let webhook_worker = WebhookDeliveryWorker::new(db.clone(), bus.clone(), config.encryption_key.0);
    let webhook_redis_url = config.redis_url.clone();
    tokio::spawn(async move {
        if let Err(e) = webhook_worker.run(&webhook_redis_url).await {
            tracing::error!(error = %e, "webhook delivery worker stopped");
        }
    });

    let ws_auth = Arc::new(WebSocketAuth::new(config.jwt_secret.clone(), FANOUT_TOKEN_EXPIRATION_SECS));
    let fanout = FanoutRouter::new(ws_auth);
    let fanout_bus = bus.clone();
    let fanout_redis_url = config.redis_url.clone();
    let fanout_for_run = fanout.clone();
    tokio::spawn(async move {
        if let Err(e) = fanout_for_run.run(fanout_bus, &fanout_redis_url).await {
            tracing::error!(error = %e, "websocket fan-out router stopped");
        }
    });

    let fanout_app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_fanout_handler))
        .with_state(fanout);
    let fanout_addr = SocketAddr::from(([0, 0, 0, 0], config.worker_health_port + 100));
    let fanout_listener = tokio::net::TcpListener::bind(fanout_addr).await?;
    tracing::info!(address = %fanout_addr, "websocket fan-out listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(fanout_listener, fanout_app).await {
            tracing::error!(error = %e, "websocket fan-out http server stopped");
        }
    });

    let events: Arc<dyn aiseo_core::events::EventPublisher> = Arc::new(bus.clone());
    let mut handles = Vec::new();
    for (index, queue_name) in [queue_names::ORCHESTRATOR, queue_names::SMART_AGENTS, queue_names::AUTO_TASKS]
        .into_iter()
        .enumerate()
    {
        let backend = Arc::new(RedisQueueBackend::new(redis_client.clone(), queue_name, QueueConfig::default()));
        let queue = Arc::new(JobQueue::new(backend, QueueConfig::default()));
        let deps = WorkerDeps {
            db: db.clone(),
            quota: quota.clone(),
            registry: registry.clone(),
            events: events.clone(),
            orchestrator: orchestrator.clone(),
            queue_name: queue_name.to_string(),
        };
        let worker_config = WorkerConfig {
            name: format!("aiseo-worker-{queue_name}"),
            liveness_port: config.worker_health_port + index as u16,
            ..Default::default()
        };
        let worker = JobWorker::new(worker_config);
        handles.push(worker.start(queue, deps));
        tracing::info!(queue_name, "job worker started");
    }

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining workers");
    let _ = shutdown_tx.send(true);
    for handle in &handles {
        handle.shutdown();
    }

    observability::shutdown();
    tracing::info!("aiseo-worker shutdown complete");
    Err(StartupOrShutdown::Interrupted)
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
