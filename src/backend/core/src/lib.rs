#![allow(clippy::result_large_err)]
//! # AISEO Core
//!
//! Orchestration substrate for the multi-tenant SEO automation platform:
//! flow orchestrator, job worker, cron scheduler, event bus, quota engine,
//! outbox dispatcher, webhook delivery, and websocket fan-out.
//!
//! - **`flow`**: First-class workflow templates and the orchestrator that
//!   sequences their steps, including fan-out/fan-in and cascading
//!   completion/failure through a run.
//! - **`jobs`**: The Redis-backed queue abstraction, the job worker that
//!   drains it, and the cron scheduler that seeds it on a schedule.
//! - **`events`**: The tenant-scoped Redis pub/sub event bus.
//! - **`outbox`**: Transactional outbox dispatcher bridging Postgres writes
//!   to the event bus.
//! - **`quota`**: Redis-backed quota accounting with a durable hourly sync.
//! - **`webhook`**: Signed webhook delivery to tenant-registered endpoints.
//! - **`websocket`**: Authenticated real-time fan-out to tenant dashboards.
//! - **`agents`**: The uniform agent execution contract and registry; the
//!   twelve concrete SEO agents are out of scope here.
//! - **`db`**: Connection pooling and row-level-security tenant context.
//! - **`observability`**: Structured logging, distributed tracing, and metrics.
//! - **`config`**: Process configuration, layered from environment variables.

pub mod agents;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod flow;
pub mod jobs;
pub mod observability;
pub mod outbox;
pub mod quota;
pub mod webhook;
pub mod websocket;

pub use error::{AiseoError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};

/// Re-export of the commonly used types across crate consumers.
pub mod prelude {
    pub use crate::agents::{AgentRegistry, AgentRunner};
    pub use crate::error::{AiseoError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};
    pub use crate::events::{BusEvent, EventBus, EventPublisher};
    pub use crate::flow::{FlowOrchestrator, FlowSubmission};
    pub use crate::jobs::{CronScheduler, JobQueue, JobWorker};
    pub use crate::quota::QuotaEngine;
}
