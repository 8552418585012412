//! Health check command.
//!
//! Probes a worker's `/healthz` liveness endpoint (spec §4.2) directly; there
//! is no HTTP router in this system to front it.

use anyhow::{Context, Result};
use clap::Args;

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Worker liveness endpoint, e.g. http://localhost:3002
    #[arg(long, default_value = "http://localhost:3002")]
    endpoint: String,
}

pub async fn execute(args: HealthArgs, format: OutputFormat) -> Result<()> {
    let url = format!("{}/healthz", args.endpoint.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .context("failed to build HTTP client")?;

    let result = client.get(&url).send().await;

    match result {
        Ok(resp) => {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let healthy = status.is_success();

            match format {
                OutputFormat::Table => {
                    output::print_header("Worker Health");
                    output::print_detail("Endpoint", &args.endpoint);
                    output::print_detail("Status", &status.to_string());
                    if healthy {
                        output::print_success(&body);
                    } else {
                        output::print_error(&body);
                    }
                }
                _ => output::print_item(
                    &serde_json::json!({ "endpoint": args.endpoint, "statusCode": status.as_u16(), "body": body }),
                    format,
                ),
            }

            if !healthy {
                anyhow::bail!("worker reported unhealthy status: {status}");
            }
        }
        Err(e) => {
            output::print_error(&format!("could not reach {url}: {e}"));
            return Err(e.into());
        }
    }

    Ok(())
}
