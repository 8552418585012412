//! Per-tenant event bus.
//!
//! Every stable event type (flow/job/quota/webhook lifecycle) is published
//! here after its outbox row lands (see `outbox::dispatcher`), never
//! published directly — see SPEC_FULL.md §4.9. A per-tenant sequence number
//! is assigned with `INCR events.seq.<tenant_id>` immediately before
//! `PUBLISH events.<tenant_id>`; readers are gap-tolerant (a `seq` jump means
//! a publish raced a subscriber's connect, not data loss) per spec §4.6.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::error::Result;

/// The publish half of `EventBus`, pulled out as a trait so components that
/// only ever emit events (the job worker, the cron scheduler) can be built
/// and tested against an in-memory double instead of a live Redis instance.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, tenant_id: &str, event_type: &str, payload: serde_json::Value) -> Result<i64>;
}

/// An event as delivered to a subscriber: the tenant-scoped sequence number
/// plus the raw payload the publisher handed to `publish`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub tenant_id: String,
    pub seq: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

fn seq_key(tenant_id: &str) -> String {
    format!("events.seq.{tenant_id}")
}

fn channel(tenant_id: &str) -> String {
    format!("events.{tenant_id}")
}

/// Thin wrapper over a Redis connection manager handling per-tenant publish
/// and the two subscription shapes spec §4.6 names: exact-tenant and
/// wildcard-all (the latter feeds the websocket fan-out in `ws::fanout`).
#[derive(Clone)]
pub struct EventBus {
    conn: redis::aio::ConnectionManager,
}

impl EventBus {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Assign the next per-tenant sequence number and publish. Returns the
    /// assigned `seq` so callers can stamp it onto a webhook delivery log
    /// entry or an outbox row.
    #[instrument(skip(self, payload), fields(tenant_id = %tenant_id, event_type = %event_type))]
    pub async fn publish(&self, tenant_id: &str, event_type: &str, payload: serde_json::Value) -> Result<i64> {
        let mut conn = self.conn.clone();
        let seq: i64 = conn.incr(seq_key(tenant_id), 1).await?;

        let event = BusEvent {
            tenant_id: tenant_id.to_string(),
            seq,
            event_type: event_type.to_string(),
            payload,
            emitted_at: Utc::now(),
        };

        let body = serde_json::to_string(&event)?;
        let _: i64 = conn.publish(channel(tenant_id), body).await?;
        Ok(seq)
    }

    /// Subscribe to one tenant's channel exactly.
    pub async fn subscribe(&self, redis_url: &str, tenant_id: &str) -> Result<BusSubscription> {
        Self::open_subscription(redis_url, channel(tenant_id), false).await
    }

    /// Subscribe to every tenant's channel via `events.*`. Used by the
    /// websocket fan-out, which owns a single shared consumer rather than one
    /// subscriber per socket.
    pub async fn subscribe_all(&self, redis_url: &str) -> Result<BusSubscription> {
        Self::open_subscription(redis_url, "events.*".to_string(), true).await
    }

    async fn open_subscription(redis_url: &str, pattern: String, is_pattern: bool) -> Result<BusSubscription> {
        let client = redis::Client::open(redis_url)?;
        let pubsub_conn = client.get_async_pubsub().await?;
        Ok(BusSubscription {
            pubsub: pubsub_conn,
            pattern,
            is_pattern,
            started: false,
        })
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, tenant_id: &str, event_type: &str, payload: serde_json::Value) -> Result<i64> {
        EventBus::publish(self, tenant_id, event_type, payload).await
    }
}

/// In-memory `EventPublisher` for unit tests that exercise agent/worker
/// logic without a live Redis instance. Records every call for assertions.
#[derive(Clone, Default)]
pub struct RecordingEventPublisher {
    pub published: std::sync::Arc<tokio::sync::Mutex<Vec<(String, String, serde_json::Value)>>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, tenant_id: &str, event_type: &str, payload: serde_json::Value) -> Result<i64> {
        let mut published = self.published.lock().await;
        published.push((tenant_id.to_string(), event_type.to_string(), payload));
        Ok(published.len() as i64)
    }
}

/// A live subscription. Call `recv` in a loop; drop (or call `stop`) to tear
/// down the underlying connection.
pub struct BusSubscription {
    pubsub: redis::aio::PubSub,
    pattern: String,
    is_pattern: bool,
    started: bool,
}

impl BusSubscription {
    async fn ensure_started(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        if self.is_pattern {
            self.pubsub.psubscribe(&self.pattern).await?;
        } else {
            self.pubsub.subscribe(&self.pattern).await?;
        }
        self.started = true;
        Ok(())
    }

    /// Await the next event. Malformed payloads are logged and skipped rather
    /// than surfaced as an error — a bad payload on the bus must not take the
    /// whole subscriber down.
    pub async fn recv(&mut self) -> Result<BusEvent> {
        use futures::StreamExt;

        self.ensure_started().await?;
        loop {
            let msg = self
                .pubsub
                .on_message()
                .next()
                .await
                .ok_or_else(|| crate::error::AiseoError::internal("event bus subscription stream ended"))?;

            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "failed to decode event bus message payload");
                    continue;
                }
            };

            match serde_json::from_str::<BusEvent>(&payload) {
                Ok(event) => return Ok(event),
                Err(e) => {
                    warn!(error = %e, "failed to deserialize event bus message, skipping");
                    continue;
                }
            }
        }
    }

    /// Explicit teardown, for callers that want to unsubscribe before drop.
    pub async fn stop(mut self) -> Result<()> {
        if self.started {
            if self.is_pattern {
                self.pubsub.punsubscribe(&self.pattern).await?;
            } else {
                self.pubsub.unsubscribe(&self.pattern).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_and_seq_key_are_tenant_scoped() {
        assert_eq!(channel("acme"), "events.acme");
        assert_eq!(seq_key("acme"), "events.seq.acme");
    }

    #[test]
    fn bus_event_round_trips_through_json() {
        let event = BusEvent {
            tenant_id: "acme".into(),
            seq: 42,
            event_type: "flow.completed".into(),
            payload: serde_json::json!({"flow_job_id": "abc"}),
            emitted_at: Utc::now(),
        };
        let body = serde_json::to_string(&event).unwrap();
        let parsed: BusEvent = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.seq, 42);
        assert_eq!(parsed.tenant_id, "acme");
    }
}
