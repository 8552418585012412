//! Background Job System for Apex Core.
//!
//! This module provides a comprehensive background job system with:
//!
//! - **Job Definitions**: Trait-based job definitions with retry and backoff support
//! - **Scheduler**: DB-backed cron scheduling that submits flows on fire
//! - **Queue**: Redis-backed job queue with priority and dead letter support
//! - **Worker**: Concurrent job execution with graceful shutdown
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                         Background Job System                                │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    ┌─────────────┐  │
//! │  │    Job      │    │  Scheduler  │    │    Queue    │    │   Worker    │  │
//! │  │ Definition  │───▶│  (Cron via  │───▶│  (Redis/    │───▶│  (Executor) │  │
//! │  │             │    │  flow::     │    │  Priority)  │    │             │  │
//! │  │             │    │  Orchestrator)   │             │    │             │  │
//! │  └─────────────┘    └─────────────┘    └─────────────┘    └─────────────┘  │
//! │         │                  │                  │                  │         │
//! │         ▼                  ▼                  ▼                  ▼         │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use aiseo_core::jobs::{JobQueue, QueueConfig, JobWorker, WorkerConfig, CronScheduler, ScheduleSpec};
//!
//! // Start workers
//! let worker = JobWorker::new(WorkerConfig::default());
//! let handle = worker.start(queue, deps);
//!
//! // Register a cron schedule that submits a flow on each fire
//! let scheduler = Arc::new(CronScheduler::new(db, orchestrator));
//! scheduler.load_all().await?;
//! scheduler.upsert_schedule(&ctx, spec).await?;
//! ```

pub mod job;
pub mod scheduler;
pub mod queue;
pub mod worker;

pub use job::{
    Job, JobContext, JobResult, JobStatus, JobError, JobMetadata,
    RetryPolicy, BackoffStrategy, JobPriority, JobId,
};
pub use scheduler::{CronScheduler, ScheduleSpec};
pub use queue::{
    JobQueue, QueueConfig, QueuedJob, DeadLetterQueue,
    QueueStats, QueueBackend, InMemoryQueueBackend, RedisQueueBackend,
    FlowEntry, FlowProducer, RetentionPolicy, default_retry_policy, queue_names,
};
pub use worker::{
    JobWorker, WorkerConfig, WorkerStats, WorkerHandle, WorkerDeps, AgentJobPayload, QuotaRequirement,
};
