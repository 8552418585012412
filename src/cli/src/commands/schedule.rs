//! Cron schedule management (spec §4.5): upsert, remove, and list the
//! schedules that drive the cron scheduler's ticking tasks. These commands
//! write `schedules` rows directly; a running `aiseo-worker` only rereads
//! them at startup, so changes take effect on its next restart.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use aiseo_core::db::tenant::{Role, TenantContext};
use aiseo_core::db::Database;

use crate::output::{self, OutputFormat};
use crate::resolve_tenant;

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Create or update a schedule by id
    Upsert {
        /// Schedule id; a new one is generated if omitted
        #[arg(long)]
        id: Option<Uuid>,
        /// Tenant the schedule belongs to; defaults to DEFAULT_TENANT_ID
        #[arg(long)]
        tenant: Option<String>,
        /// Project the submitted flow runs against
        #[arg(long)]
        project: Uuid,
        /// Cron expression, e.g. "0 0 9 * * *"
        #[arg(long)]
        cron: String,
        /// IANA timezone the cron expression is evaluated in
        #[arg(long, default_value = "UTC")]
        timezone: String,
        /// Flow template name to submit on each fire
        #[arg(long)]
        flow: String,
        /// JSON input passed to the flow template
        #[arg(long, default_value = "{}")]
        input: String,
        /// Create the schedule disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Delete a schedule
    Remove {
        /// Tenant the schedule belongs to; defaults to DEFAULT_TENANT_ID
        #[arg(long)]
        tenant: Option<String>,
        /// Schedule id
        id: Uuid,
    },

    /// List every enabled schedule across all tenants
    List,
}

#[derive(Serialize, Tabled)]
struct ScheduleView {
    id: Uuid,
    tenant_id: String,
    enabled: bool,
    cron: String,
    timezone: String,
    flow_name: String,
}

pub async fn execute(
    cmd: ScheduleCommands,
    db: &Database,
    default_tenant_id: &Option<String>,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        ScheduleCommands::Upsert {
            id,
            tenant,
            project,
            cron,
            timezone,
            flow,
            input,
            disabled,
        } => {
            let tenant = resolve_tenant(tenant, default_tenant_id)?;
            let input: serde_json::Value =
                serde_json::from_str(&input).context("--input must be valid JSON")?;
            let ctx = TenantContext::new(tenant, Role::Admin);
            let row = db
                .upsert_schedule(
                    &ctx,
                    id.unwrap_or_else(Uuid::new_v4),
                    project,
                    !disabled,
                    &cron,
                    &timezone,
                    &flow,
                    input,
                )
                .await?;
            output::print_success(&format!("schedule {} upserted", row.id));
            output::print_item(&view(&row), format);
        }

        ScheduleCommands::Remove { tenant, id } => {
            let tenant = resolve_tenant(tenant, default_tenant_id)?;
            let ctx = TenantContext::new(tenant, Role::Admin);
            db.delete_schedule(&ctx, id).await?;
            output::print_success(&format!("schedule {id} removed"));
        }

        ScheduleCommands::List => {
            let rows = db.list_all_enabled_schedules().await?;
            let views: Vec<ScheduleView> = rows.iter().map(view).collect();
            output::print_list(&views, format);
        }
    }

    Ok(())
}

fn view(row: &aiseo_core::db::ScheduleRow) -> ScheduleView {
    ScheduleView {
        id: row.id,
        tenant_id: row.tenant_id.clone(),
        enabled: row.enabled,
        cron: row.cron.clone(),
        timezone: row.timezone.clone(),
        flow_name: row.flow_name.clone(),
    }
}
