//! Quota inspection (spec §4.4). Reads the durable `tenant_usage` snapshot
//! rather than the live Redis counters, since the hourly sync job keeps it
//! within an hour of current and the CLI has no business holding its own
//! Redis connection just to read a number.

use anyhow::Result;
use chrono::{Datelike, Utc};
use clap::Subcommand;
use serde::Serialize;

use aiseo_core::db::Database;

use crate::output::{self, OutputFormat};
use crate::resolve_tenant;

#[derive(Subcommand)]
pub enum QuotaCommands {
    /// Show a tenant's usage for the current (or a given) billing period
    Inspect {
        /// Tenant to inspect; defaults to DEFAULT_TENANT_ID
        #[arg(long)]
        tenant: Option<String>,
        /// Period in `YYYY-MM` form; defaults to the current month
        #[arg(long)]
        period: Option<String>,
    },
}

#[derive(Serialize)]
struct UsageView {
    tenant_id: String,
    period: String,
    api_calls: i64,
    serp_jobs: i64,
    crawl_jobs: i64,
}

pub async fn execute(
    cmd: QuotaCommands,
    db: &Database,
    default_tenant_id: &Option<String>,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        QuotaCommands::Inspect { tenant, period } => {
            let tenant = resolve_tenant(tenant, default_tenant_id)?;
            let period = period.unwrap_or_else(current_period);
            match db.get_tenant_usage(&tenant, &period).await? {
                Some(row) => {
                    output::print_item(
                        &UsageView {
                            tenant_id: row.tenant_id,
                            period: row.period,
                            api_calls: row.api_calls,
                            serp_jobs: row.serp_jobs,
                            crawl_jobs: row.crawl_jobs,
                        },
                        format,
                    );
                }
                None => output::print_info(&format!("no recorded usage for {tenant} in {period}")),
            }
        }
    }

    Ok(())
}

fn current_period() -> String {
    let now = Utc::now();
    format!("{:04}-{:02}", now.year(), now.month())
}
