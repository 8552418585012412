//! aiseo-admin - operational CLI for the AISEO orchestration substrate.
//!
//! Talks directly to Postgres (and, for the health check, a worker's
//! liveness endpoint) rather than through an HTTP API: this system has no
//! router to front one (see SPEC_FULL.md's process topology). Owns the
//! schedule, webhook, and quota operations that would otherwise require one.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use aiseo_core::config::Config;
use aiseo_core::db::Database;

use commands::{config, health, quota, schedule, webhook};
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "aiseo-admin",
    author = "AISEO Platform Team",
    version = "0.1.0",
    about = "Operational CLI for the AISEO orchestration substrate",
    long_about = "Manage cron schedules, webhooks, and quota for the AISEO orchestration substrate.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cron schedule management
    #[command(subcommand)]
    Schedule(schedule::ScheduleCommands),

    /// Webhook registration and secret rotation
    #[command(subcommand)]
    Webhook(webhook::WebhookCommands),

    /// Quota inspection
    #[command(subcommand)]
    Quota(quota::QuotaCommands),

    /// Probe a worker's liveness endpoint
    Health(health::HealthArgs),

    /// CLI-local preferences
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli.output;

    let result = run(cli.command, format).await;

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, format: OutputFormat) -> Result<()> {
    match command {
        Commands::Health(args) => health::execute(args, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,

        // Every remaining command touches the database directly.
        other => {
            let app_config = Config::load()?;
            let db = Database::new(&app_config.database_url).await?;
            let default_tenant_id = &app_config.default_tenant_id;

            match other {
                Commands::Schedule(cmd) => schedule::execute(cmd, &db, default_tenant_id, format).await,
                Commands::Webhook(cmd) => {
                    webhook::execute(cmd, &db, &app_config.encryption_key, default_tenant_id, format).await
                }
                Commands::Quota(cmd) => quota::execute(cmd, &db, default_tenant_id, format).await,
                Commands::Health(_) | Commands::Config(_) => unreachable!(),
            }
        }
    }
}

/// Resolve an optional `--tenant` flag against `DEFAULT_TENANT_ID`, erroring
/// if neither is set.
pub(crate) fn resolve_tenant(tenant: Option<String>, default_tenant_id: &Option<String>) -> Result<String> {
    tenant
        .or_else(|| default_tenant_id.clone())
        .ok_or_else(|| anyhow::anyhow!("no --tenant given and DEFAULT_TENANT_ID is not set"))
}
