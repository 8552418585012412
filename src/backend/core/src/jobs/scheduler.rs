//! Cron scheduler (spec §4.5): persists schedule rows and keeps one ticking
//! task per active schedule that submits the configured flow on each fire.
//!
//! Expressions are parsed with the `cron` crate and evaluated against the
//! schedule's own timezone (via `chrono-tz`), not the worker's local clock, so
//! a tenant's "every day at 9am" means 9am in the timezone they set.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule as CronExpr;
use dashmap::DashMap;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::tenant::TenantContext;
use crate::db::{Database, ScheduleRow};
use crate::error::{AiseoError, Result};
use crate::flow::FlowOrchestrator;

/// A schedule upsert request, mirroring spec §4.5's `upsertSchedule` shape.
#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    pub id: Uuid,
    pub tenant_id: String,
    pub project_id: Uuid,
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
    pub flow_name: String,
    pub input: serde_json::Value,
}

/// Owns one `tokio::spawn`'d ticking task per enabled schedule. Dropping or
/// aborting the task is how a schedule gets deregistered; nothing polls the
/// database to decide whether to fire.
pub struct CronScheduler {
    db: Database,
    orchestrator: Arc<FlowOrchestrator>,
    tasks: DashMap<Uuid, tokio::task::JoinHandle<()>>,
}

impl CronScheduler {
    pub fn new(db: Database, orchestrator: Arc<FlowOrchestrator>) -> Self {
        Self {
            db,
            orchestrator,
            tasks: DashMap::new(),
        }
    }

    /// Register every enabled schedule found in the database. Call once at
    /// worker startup before serving traffic. Takes `Arc<Self>` by value
    /// since the registered tasks each hold their own clone of it.
    pub async fn load_all(self: Arc<Self>) -> Result<()> {
        let rows = self.db.list_all_enabled_schedules().await?;
        let count = rows.len();
        for row in rows {
            Arc::clone(&self).register(row);
        }
        info!(count, "cron scheduler loaded enabled schedules");
        Ok(())
    }

    /// Insert or update a schedule row, then (re)register its ticking task to
    /// match the new definition. Disabling a schedule still upserts the row
    /// (so `enabled = false` is visible) and deregisters the task so it can
    /// no longer fire.
    pub async fn upsert_schedule(self: Arc<Self>, ctx: &TenantContext, spec: ScheduleSpec) -> Result<ScheduleRow> {
        validate_cron(&spec.cron)?;
        validate_timezone(&spec.timezone)?;

        let row = self
            .db
            .upsert_schedule(
                ctx,
                spec.id,
                spec.project_id,
                spec.enabled,
                &spec.cron,
                &spec.timezone,
                &spec.flow_name,
                spec.input,
            )
            .await?;

        self.deregister(row.id);
        if row.enabled {
            Arc::clone(&self).register(row.clone());
        }
        Ok(row)
    }

    /// Delete a schedule and stop its ticking task.
    pub async fn remove_schedule(&self, ctx: &TenantContext, id: Uuid) -> Result<()> {
        self.db.delete_schedule(ctx, id).await?;
        self.deregister(id);
        Ok(())
    }

    /// Number of schedules currently ticking, for diagnostics/tests.
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    fn register(self: Arc<Self>, row: ScheduleRow) {
        let id = row.id;
        let this = Arc::clone(&self);
        let handle = tokio::spawn(async move { this.run_schedule(row).await });
        if let Some(old) = self.tasks.insert(id, handle) {
            old.abort();
        }
    }

    fn deregister(&self, id: Uuid) {
        if let Some((_, handle)) = self.tasks.remove(&id) {
            handle.abort();
        }
    }

    async fn run_schedule(self: Arc<Self>, row: ScheduleRow) {
        let expr = match CronExpr::from_str(&row.cron) {
            Ok(e) => e,
            Err(e) => {
                error!(schedule_id = %row.id, error = %e, "invalid cron expression, schedule will never fire");
                return;
            }
        };
        let tz: Tz = match row.timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                error!(schedule_id = %row.id, timezone = %row.timezone, "invalid timezone, schedule will never fire");
                return;
            }
        };

        loop {
            let now_in_tz = Utc::now().with_timezone(&tz);
            let Some(next) = expr.after(&now_in_tz).next() else {
                warn!(schedule_id = %row.id, "cron expression has no future occurrences");
                return;
            };
            let next_utc = next.with_timezone(&Utc);
            let wait = (next_utc - Utc::now()).to_std().unwrap_or(std::time::Duration::from_secs(0));
            tokio::time::sleep(wait).await;

            info!(schedule_id = %row.id, flow_name = %row.flow_name, "cron schedule firing");
            if let Err(e) = self
                .orchestrator
                .submit(&row.flow_name, &row.tenant_id, Some(row.project_id), row.input.clone())
                .await
            {
                error!(schedule_id = %row.id, error = %e, "failed to submit flow from cron schedule");
            }
        }
    }
}

fn validate_cron(expression: &str) -> Result<()> {
    CronExpr::from_str(expression)
        .map(|_| ())
        .map_err(|e| AiseoError::validation(format!("invalid cron expression {expression:?}: {e}")))
}

fn validate_timezone(timezone: &str) -> Result<()> {
    timezone
        .parse::<Tz>()
        .map(|_| ())
        .map_err(|_| AiseoError::validation(format!("unknown timezone: {timezone:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_cron_expression_parses() {
        assert!(validate_cron("0 0 9 * * *").is_ok());
    }

    #[test]
    fn malformed_cron_expression_is_rejected() {
        assert!(validate_cron("not a cron expression").is_err());
    }

    #[test]
    fn valid_timezone_parses() {
        assert!(validate_timezone("America/New_York").is_ok());
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(validate_timezone("Mars/Olympus_Mons").is_err());
    }
}
