//! Transactional outbox dispatcher.
//!
//! Every stable event type is written to `events_outbox` in the same
//! transaction as its triggering change (spec §4.9's resolved outbox-first
//! default), then picked up here and fanned out onto the event bus and, for
//! event types with subscribed webhooks, handed to the webhook delivery
//! worker's queue.

pub mod dispatcher;

pub use dispatcher::{DispatchConfig, OutboxDispatcher};
