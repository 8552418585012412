//! Database layer for the AISEO orchestration substrate.
//!
//! Uses PostgreSQL for persistent storage with sqlx. Tenant-scoped tables are
//! only ever reached through [`tenant::TenantContext`]-bound connections (see
//! `checkout`); the outbox and usage tables have no RLS policy and are queried
//! directly off the pool by the outbox dispatcher and quota-sync job.

pub mod tenant;

use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::error::{AiseoError, Result};
use tenant::{bind_session, Role, TenantContext, TenantConn};

/// Database connection and operations.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AiseoError::from(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check out a connection with `app.current_tenant_id`/`app.current_user_id`/
    /// `app.current_role` bound, so RLS policies on tenant-scoped tables apply.
    pub async fn checkout(&self, ctx: &TenantContext) -> Result<TenantConn> {
        let mut conn = self.pool.acquire().await?;
        bind_session(&mut conn, ctx).await?;
        Ok(TenantConn(conn))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Tenant Operations
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn upsert_tenant(&self, tenant_id: &str, plan: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, plan)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id) DO UPDATE SET plan = EXCLUDED.plan
            "#,
        )
        .bind(tenant_id)
        .bind(plan)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Project Operations
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn insert_project(&self, ctx: &TenantContext, name: &str) -> Result<ProjectRow> {
        let mut conn = self.checkout(ctx).await?;
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            INSERT INTO projects (tenant_id, name)
            VALUES ($1, $2)
            RETURNING id, tenant_id, name, created_at
            "#,
        )
        .bind(&ctx.tenant_id)
        .bind(name)
        .fetch_one(&mut *conn.0)
        .await?;
        Ok(row)
    }

    pub async fn get_project(&self, ctx: &TenantContext, id: Uuid) -> Result<ProjectRow> {
        let mut conn = self.checkout(ctx).await?;
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, tenant_id, name, created_at FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *conn.0)
        .await?
        .ok_or_else(|| AiseoError::not_found("project", id.to_string()))?;
        Ok(row)
    }

    pub async fn list_projects(&self, ctx: &TenantContext) -> Result<Vec<ProjectRow>> {
        let mut conn = self.checkout(ctx).await?;
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, tenant_id, name, created_at FROM projects ORDER BY created_at DESC",
        )
        .fetch_all(&mut *conn.0)
        .await?;
        Ok(rows)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Keyword Operations
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn insert_keyword(&self, ctx: &TenantContext, project_id: Uuid, keyword: &str) -> Result<KeywordRow> {
        let mut conn = self.checkout(ctx).await?;
        let row = sqlx::query_as::<_, KeywordRow>(
            r#"
            INSERT INTO keywords (tenant_id, project_id, keyword)
            VALUES ($1, $2, $3)
            RETURNING id, tenant_id, project_id, keyword, created_at
            "#,
        )
        .bind(&ctx.tenant_id)
        .bind(project_id)
        .bind(keyword)
        .fetch_one(&mut *conn.0)
        .await?;
        Ok(row)
    }

    pub async fn list_keywords(&self, ctx: &TenantContext, project_id: Uuid) -> Result<Vec<KeywordRow>> {
        let mut conn = self.checkout(ctx).await?;
        let rows = sqlx::query_as::<_, KeywordRow>(
            r#"
            SELECT id, tenant_id, project_id, keyword, created_at
            FROM keywords WHERE project_id = $1 ORDER BY created_at
            "#,
        )
        .bind(project_id)
        .fetch_all(&mut *conn.0)
        .await?;
        Ok(rows)
    }

    /// Direct DB count backing the keyword-count quota (no Redis mirror, per
    /// spec §4.4 — this quota is cheap enough to check on the hot path).
    pub async fn count_keywords(&self, ctx: &TenantContext) -> Result<i64> {
        let mut conn = self.checkout(ctx).await?;
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM keywords")
            .fetch_one(&mut *conn.0)
            .await?;
        Ok(count)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Schedule Operations
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn insert_schedule(
        &self,
        ctx: &TenantContext,
        project_id: Uuid,
        cron: &str,
        timezone: &str,
        flow_name: &str,
        input: serde_json::Value,
    ) -> Result<ScheduleRow> {
        let mut conn = self.checkout(ctx).await?;
        let row = sqlx::query_as::<_, ScheduleRow>(
            r#"
            INSERT INTO schedules (tenant_id, project_id, cron, timezone, flow_name, input)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, tenant_id, project_id, enabled, cron, timezone, flow_name, input,
                      created_at, updated_at
            "#,
        )
        .bind(&ctx.tenant_id)
        .bind(project_id)
        .bind(cron)
        .bind(timezone)
        .bind(flow_name)
        .bind(input)
        .fetch_one(&mut *conn.0)
        .await?;
        Ok(row)
    }

    /// Insert-or-update by caller-supplied id, matching the `upsertSchedule`
    /// operation in spec §4.5: a repeated call with the same id updates the
    /// existing row's cron/timezone/flow/enabled/input in place rather than
    /// creating a duplicate schedule.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_schedule(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        project_id: Uuid,
        enabled: bool,
        cron: &str,
        timezone: &str,
        flow_name: &str,
        input: serde_json::Value,
    ) -> Result<ScheduleRow> {
        let mut conn = self.checkout(ctx).await?;
        let row = sqlx::query_as::<_, ScheduleRow>(
            r#"
            INSERT INTO schedules (id, tenant_id, project_id, enabled, cron, timezone, flow_name, input)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                enabled = excluded.enabled,
                cron = excluded.cron,
                timezone = excluded.timezone,
                flow_name = excluded.flow_name,
                input = excluded.input,
                updated_at = now()
            RETURNING id, tenant_id, project_id, enabled, cron, timezone, flow_name, input,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&ctx.tenant_id)
        .bind(project_id)
        .bind(enabled)
        .bind(cron)
        .bind(timezone)
        .bind(flow_name)
        .bind(input)
        .fetch_one(&mut *conn.0)
        .await?;
        Ok(row)
    }

    pub async fn set_schedule_enabled(&self, ctx: &TenantContext, id: Uuid, enabled: bool) -> Result<()> {
        let mut conn = self.checkout(ctx).await?;
        sqlx::query("UPDATE schedules SET enabled = $1, updated_at = now() WHERE id = $2")
            .bind(enabled)
            .bind(id)
            .execute(&mut *conn.0)
            .await?;
        Ok(())
    }

    pub async fn delete_schedule(&self, ctx: &TenantContext, id: Uuid) -> Result<()> {
        let mut conn = self.checkout(ctx).await?;
        sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&mut *conn.0)
            .await?;
        Ok(())
    }

    /// All enabled schedules across every tenant, loaded at scheduler startup
    /// and after any upsert/remove. Runs over the admin connection: the cron
    /// scheduler is a system component, not acting on behalf of one tenant.
    pub async fn list_all_enabled_schedules(&self) -> Result<Vec<ScheduleRow>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT id, tenant_id, project_id, enabled, cron, timezone, flow_name, input,
                   created_at, updated_at
            FROM schedules WHERE enabled = true
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Flow Job Operations
    // ═══════════════════════════════════════════════════════════════════════════

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_flow_job(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        flow_job_id: Uuid,
        flow_name: &str,
        tenant_id: &str,
        project_id: Option<Uuid>,
        queue_name: &str,
        agent_id: &str,
        payload: serde_json::Value,
        parent_job_id: Option<Uuid>,
        max_attempts: i32,
    ) -> Result<FlowJobRow> {
        let row = sqlx::query_as::<_, FlowJobRow>(
            r#"
            INSERT INTO flow_jobs
                (flow_job_id, flow_name, tenant_id, project_id, queue_name, agent_id,
                 payload, parent_job_id, max_attempts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, flow_job_id, flow_name, tenant_id, project_id, queue_name, agent_id,
                      payload, parent_job_id, state, attempt, max_attempts, progress,
                      last_error, created_at, started_at, completed_at
            "#,
        )
        .bind(flow_job_id)
        .bind(flow_name)
        .bind(tenant_id)
        .bind(project_id)
        .bind(queue_name)
        .bind(agent_id)
        .bind(payload)
        .bind(parent_job_id)
        .bind(max_attempts)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }

    pub async fn get_flow_job(&self, ctx: &TenantContext, id: Uuid) -> Result<FlowJobRow> {
        let mut conn = self.checkout(ctx).await?;
        let row = sqlx::query_as::<_, FlowJobRow>(
            r#"
            SELECT id, flow_job_id, flow_name, tenant_id, project_id, queue_name, agent_id,
                   payload, parent_job_id, state, attempt, max_attempts, progress,
                   last_error, created_at, started_at, completed_at
            FROM flow_jobs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn.0)
        .await?
        .ok_or_else(|| AiseoError::flow_job_not_found(id))?;
        Ok(row)
    }

    /// Siblings of `job_id` within the same flow run that have not started
    /// (`state = 'waiting'`), used by cascading cancellation when a sibling's
    /// retries are exhausted.
    pub async fn list_waiting_siblings(&self, flow_job_id: Uuid, exclude: Uuid) -> Result<Vec<FlowJobRow>> {
        let rows = sqlx::query_as::<_, FlowJobRow>(
            r#"
            SELECT id, flow_job_id, flow_name, tenant_id, project_id, queue_name, agent_id,
                   payload, parent_job_id, state, attempt, max_attempts, progress,
                   last_error, created_at, started_at, completed_at
            FROM flow_jobs
            WHERE flow_job_id = $1 AND id != $2 AND state = 'waiting'
            "#,
        )
        .bind(flow_job_id)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_flow_job_active(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE flow_jobs SET state = 'active', started_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_flow_job_completed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE flow_jobs SET state = 'completed', completed_at = now(), progress = 100 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_flow_job_failed(&self, id: Uuid, attempt: i32, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE flow_jobs
            SET state = 'failed', attempt = $2, last_error = $3, completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_flow_job_delayed(&self, id: Uuid, attempt: i32, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE flow_jobs
            SET state = 'delayed', attempt = $2, last_error = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_flow_job_cancelled(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE flow_jobs SET state = 'cancelled', completed_at = now() WHERE id = $1 AND state = 'waiting'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_flow_job_progress(&self, id: Uuid, progress: i32) -> Result<()> {
        sqlx::query("UPDATE flow_jobs SET progress = $2 WHERE id = $1")
            .bind(id)
            .bind(progress)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a dependency edge: `job_id` cannot be released until
    /// `depends_on_job_id` reaches `completed`.
    pub async fn insert_flow_job_dependency(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job_id: Uuid,
        depends_on_job_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO flow_job_dependencies (job_id, depends_on_job_id) VALUES ($1, $2)",
        )
        .bind(job_id)
        .bind(depends_on_job_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// How many of `job_id`'s declared dependencies have not yet completed.
    /// Zero means the job is ready to be pushed onto its queue.
    pub async fn count_unmet_dependencies(&self, job_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT count(*)
            FROM flow_job_dependencies d
            JOIN flow_jobs p ON p.id = d.depends_on_job_id
            WHERE d.job_id = $1 AND p.state != 'completed'
            "#,
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Jobs that declare a dependency on `job_id` (its direct children in the
    /// DAG), regardless of whether they're ready yet.
    pub async fn list_dependents(&self, job_id: Uuid) -> Result<Vec<FlowJobRow>> {
        let rows = sqlx::query_as::<_, FlowJobRow>(
            r#"
            SELECT f.id, f.flow_job_id, f.flow_name, f.tenant_id, f.project_id, f.queue_name,
                   f.agent_id, f.payload, f.parent_job_id, f.state, f.attempt, f.max_attempts,
                   f.progress, f.last_error, f.created_at, f.started_at, f.completed_at
            FROM flow_jobs f
            JOIN flow_job_dependencies d ON d.job_id = f.id
            WHERE d.depends_on_job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Jobs belonging to `flow_job_id` that are still outstanding (not in a
    /// terminal state), used to detect whether a flow run has finished.
    pub async fn count_incomplete_flow_jobs(&self, flow_job_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT count(*) FROM flow_jobs
            WHERE flow_job_id = $1 AND state NOT IN ('completed', 'cancelled', 'failed')
            "#,
        )
        .bind(flow_job_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Whether any job in this flow run ended in `failed`, used to decide
    /// between emitting `flow.completed` and `flow.failed` once the run
    /// drains.
    pub async fn flow_has_failed_job(&self, flow_job_id: Uuid) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM flow_jobs WHERE flow_job_id = $1 AND state = 'failed'",
        )
        .bind(flow_job_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Webhook Operations
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn insert_webhook(
        &self,
        ctx: &TenantContext,
        url: &str,
        events: &[String],
        secret_ciphertext: &[u8],
        secret_nonce: &[u8],
    ) -> Result<WebhookRow> {
        let mut conn = self.checkout(ctx).await?;
        let row = sqlx::query_as::<_, WebhookRow>(
            r#"
            INSERT INTO webhooks (tenant_id, url, events, secret_ciphertext, secret_nonce)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, tenant_id, url, events, enabled, secret_ciphertext, secret_nonce, created_at
            "#,
        )
        .bind(&ctx.tenant_id)
        .bind(url)
        .bind(events)
        .bind(secret_ciphertext)
        .bind(secret_nonce)
        .fetch_one(&mut *conn.0)
        .await?;
        Ok(row)
    }

    pub async fn list_webhooks(&self, ctx: &TenantContext) -> Result<Vec<WebhookRow>> {
        let mut conn = self.checkout(ctx).await?;
        let rows = sqlx::query_as::<_, WebhookRow>(
            r#"
            SELECT id, tenant_id, url, events, enabled, secret_ciphertext, secret_nonce, created_at
            FROM webhooks WHERE enabled = true
            "#,
        )
        .fetch_all(&mut *conn.0)
        .await?;
        Ok(rows)
    }

    /// Webhooks subscribed to `event_type` for one tenant. Run over the admin
    /// connection with an explicit tenant filter: the webhook delivery worker
    /// consumes outbox rows spanning every tenant and binds no session GUC.
    /// An empty `events` array means "subscribe to everything" per spec, so
    /// it matches unconditionally rather than via `ANY` (which is never true
    /// against an empty array).
    pub async fn list_webhooks_for_event(&self, tenant_id: &str, event_type: &str) -> Result<Vec<WebhookRow>> {
        let rows = sqlx::query_as::<_, WebhookRow>(
            r#"
            SELECT id, tenant_id, url, events, enabled, secret_ciphertext, secret_nonce, created_at
            FROM webhooks
            WHERE tenant_id = $1 AND enabled = true
              AND (array_length(events, 1) IS NULL OR $2 = ANY(events))
            "#,
        )
        .bind(tenant_id)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Replace a webhook's signing secret in place (the CLI's `webhook
    /// rotate` command); the old secret stops verifying signatures the
    /// instant this commits, so callers must update subscribers out of band.
    pub async fn rotate_webhook_secret(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        secret_ciphertext: &[u8],
        secret_nonce: &[u8],
    ) -> Result<()> {
        let mut conn = self.checkout(ctx).await?;
        sqlx::query("UPDATE webhooks SET secret_ciphertext = $1, secret_nonce = $2 WHERE id = $3")
            .bind(secret_ciphertext)
            .bind(secret_nonce)
            .bind(id)
            .execute(&mut *conn.0)
            .await?;
        Ok(())
    }

    pub async fn insert_webhook_delivery(
        &self,
        tenant_id: &str,
        webhook_id: Uuid,
        event_type: &str,
        event_seq: Option<i64>,
        status_code: Option<i32>,
        ok: bool,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (tenant_id, webhook_id, event_type, event_seq, status_code, ok, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tenant_id)
        .bind(webhook_id)
        .bind(event_type)
        .bind(event_seq)
        .bind(status_code)
        .bind(ok)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Outbox Operations (admin connection, no RLS)
    // ═══════════════════════════════════════════════════════════════════════════

    /// Insert an outbox row in the same transaction as the triggering write,
    /// per the outbox-first default (SPEC_FULL.md §4.9).
    pub async fn insert_outbox_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: &str,
        project_id: Option<Uuid>,
        event_type: &str,
        seq: Option<i64>,
        payload: serde_json::Value,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO events_outbox (tenant_id, project_id, event_type, seq, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(project_id)
        .bind(event_type)
        .bind(seq)
        .bind(payload)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Open a transaction on the admin pool for callers that need to
    /// compose several of this module's `&mut Transaction` methods into one
    /// atomic unit (e.g. the flow orchestrator persisting a DAG's nodes and
    /// edges alongside its `flow.started` outbox row).
    pub async fn begin_admin(&self) -> Result<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Outbox-first emission for events with no accompanying row write of
    /// their own: opens a single-row transaction just to insert the outbox
    /// record, per spec's "outbox-first for every event type in the stable
    /// set" rule.
    pub async fn emit_event(
        &self,
        tenant_id: &str,
        project_id: Option<Uuid>,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = self
            .insert_outbox_event(&mut tx, tenant_id, project_id, event_type, None, payload)
            .await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Lease up to `limit` undispatched rows for this drain cycle, oldest
    /// first, skipping rows another concurrent dispatcher already locked.
    pub async fn lease_outbox_batch(&self, limit: i64) -> Result<(Transaction<'_, Postgres>, Vec<OutboxEventRow>)> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, OutboxEventRow>(
            r#"
            SELECT id, tenant_id, project_id, event_type, seq, payload, dispatched,
                   dispatched_at, retry_count, last_error, created_at
            FROM events_outbox
            WHERE dispatched = false AND retry_count < 3
            ORDER BY created_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;
        Ok((tx, rows))
    }

    pub async fn mark_outbox_dispatched(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<()> {
        sqlx::query("UPDATE events_outbox SET dispatched = true, dispatched_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn record_outbox_retry(&self, tx: &mut Transaction<'_, Postgres>, id: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE events_outbox SET retry_count = retry_count + 1, last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Tenant Usage Operations (admin connection, no RLS)
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn get_tenant_usage(&self, tenant_id: &str, period: &str) -> Result<Option<TenantUsageRow>> {
        let row = sqlx::query_as::<_, TenantUsageRow>(
            r#"
            SELECT tenant_id, period, api_calls, serp_jobs, crawl_jobs, last_alert_at
            FROM tenant_usage WHERE tenant_id = $1 AND period = $2
            "#,
        )
        .bind(tenant_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Hourly reconciliation: the durable counter becomes `GREATEST(existing,
    /// redis)` for each quota column, so a late durable write never regresses
    /// below what Redis already counted (spec §4.4).
    pub async fn sync_tenant_usage_max(
        &self,
        tenant_id: &str,
        period: &str,
        api_calls: i64,
        serp_jobs: i64,
        crawl_jobs: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenant_usage (tenant_id, period, api_calls, serp_jobs, crawl_jobs)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, period) DO UPDATE SET
                api_calls = GREATEST(tenant_usage.api_calls, EXCLUDED.api_calls),
                serp_jobs = GREATEST(tenant_usage.serp_jobs, EXCLUDED.serp_jobs),
                crawl_jobs = GREATEST(tenant_usage.crawl_jobs, EXCLUDED.crawl_jobs)
            "#,
        )
        .bind(tenant_id)
        .bind(period)
        .bind(api_calls)
        .bind(serp_jobs)
        .bind(crawl_jobs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Conditionally bumps `last_alert_at` only if unset or outside the
    /// monthly throttle window, returning whether an alert should fire.
    pub async fn try_claim_quota_alert(&self, tenant_id: &str, period: &str) -> Result<bool> {
        let claimed: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE tenant_usage
            SET last_alert_at = now()
            WHERE tenant_id = $1 AND period = $2
              AND (last_alert_at IS NULL OR last_alert_at < now() - interval '1 hour')
            RETURNING tenant_id
            "#,
        )
        .bind(tenant_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed.is_some())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Row Types
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KeywordRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub project_id: Uuid,
    pub keyword: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub project_id: Uuid,
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
    pub flow_name: String,
    pub input: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FlowJobRow {
    pub id: Uuid,
    pub flow_job_id: Uuid,
    pub flow_name: String,
    pub tenant_id: String,
    pub project_id: Option<Uuid>,
    pub queue_name: String,
    pub agent_id: String,
    pub payload: serde_json::Value,
    pub parent_job_id: Option<Uuid>,
    pub state: String,
    pub attempt: i32,
    pub max_attempts: i32,
    pub progress: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebhookRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub url: String,
    pub events: Vec<String>,
    pub enabled: bool,
    pub secret_ciphertext: Vec<u8>,
    pub secret_nonce: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxEventRow {
    pub id: i64,
    pub tenant_id: String,
    pub project_id: Option<Uuid>,
    pub event_type: String,
    pub seq: Option<i64>,
    pub payload: serde_json::Value,
    pub dispatched: bool,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantUsageRow {
    pub tenant_id: String,
    pub period: String,
    pub api_calls: i64,
    pub serp_jobs: i64,
    pub crawl_jobs: i64,
    pub last_alert_at: Option<DateTime<Utc>>,
}

pub use Role as TenantRole;
