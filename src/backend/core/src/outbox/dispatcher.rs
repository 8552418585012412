//! Drains `events_outbox` onto the event bus.
//!
//! Mirrors the drain-loop/lease-reaper shape used for task-wakeup dispatch
//! elsewhere in this kind of harness: a transaction leases a batch with
//! `FOR UPDATE SKIP LOCKED`, each row is published, and only rows that
//! published cleanly are marked dispatched before commit. A row that fails to
//! publish keeps its `dispatched = false` but gets its retry count bumped in
//! the same transaction, so it is picked up again next cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::db::{Database, OutboxEventRow};
use crate::error::Result;
use crate::events::EventBus;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
        }
    }
}

pub struct OutboxDispatcher {
    db: Database,
    bus: EventBus,
    config: DispatchConfig,
}

impl OutboxDispatcher {
    pub fn new(db: Database, bus: EventBus, config: DispatchConfig) -> Self {
        Self { db, bus, config }
    }

    /// Runs until `shutdown_rx` observes `true`. Intended to be spawned as a
    /// long-lived task alongside the worker loop and cron scheduler.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            if let Err(err) = self.drain_once().await {
                warn!(error = %err, "outbox drain error");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }

    /// One drain cycle: lease a batch, publish each row, commit. Returns the
    /// number of rows successfully dispatched.
    pub async fn drain_once(&self) -> Result<usize> {
        let (mut tx, rows) = self.db.lease_outbox_batch(self.config.batch_size).await?;
        let mut dispatched = 0usize;

        for row in rows {
            match self.publish_row(&row).await {
                Ok(()) => {
                    self.db.mark_outbox_dispatched(&mut tx, row.id).await?;
                    dispatched += 1;
                }
                Err(err) => {
                    warn!(outbox_id = row.id, error = %err, "failed to publish outbox row, will retry");
                    self.db.record_outbox_retry(&mut tx, row.id, &err.to_string()).await?;
                }
            }
        }

        tx.commit().await?;
        if dispatched > 0 {
            info!(dispatched, "outbox drain cycle dispatched events");
        }
        Ok(dispatched)
    }

    async fn publish_row(&self, row: &OutboxEventRow) -> Result<()> {
        self.bus.publish(&row.tenant_id, &row.event_type, row.payload.clone()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_a_tight_poll() {
        let config = DispatchConfig::default();
        assert_eq!(config.batch_size, 100);
        assert!(config.poll_interval <= Duration::from_secs(1));
    }
}
