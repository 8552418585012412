//! Webhook management (spec §4.8): register a tenant's webhook endpoints and
//! rotate their signing secrets. Secrets are generated here, shown once, and
//! stored only in their AES-256-GCM-encrypted form.

use anyhow::Result;
use clap::Subcommand;
use rand::RngCore;
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use aiseo_core::config::EncryptionKey;
use aiseo_core::db::tenant::{Role, TenantContext};
use aiseo_core::db::Database;
use aiseo_core::webhook;

use crate::output::{self, OutputFormat};
use crate::resolve_tenant;

#[derive(Subcommand)]
pub enum WebhookCommands {
    /// Register a new webhook endpoint for a tenant
    Add {
        /// Tenant the webhook belongs to; defaults to DEFAULT_TENANT_ID
        #[arg(long)]
        tenant: Option<String>,
        /// Destination URL; validated against the SSRF guard on delivery, not here
        #[arg(long)]
        url: String,
        /// Event types to subscribe to; omit to subscribe to everything
        #[arg(long = "event")]
        events: Vec<String>,
    },

    /// List a tenant's webhooks
    List {
        /// Tenant to list webhooks for; defaults to DEFAULT_TENANT_ID
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Rotate a webhook's signing secret, printing the new plaintext secret once
    Rotate {
        /// Tenant the webhook belongs to; defaults to DEFAULT_TENANT_ID
        #[arg(long)]
        tenant: Option<String>,
        id: Uuid,
    },
}

#[derive(Serialize, Tabled)]
struct WebhookView {
    id: Uuid,
    tenant_id: String,
    url: String,
    enabled: bool,
    events: String,
}

pub async fn execute(
    cmd: WebhookCommands,
    db: &Database,
    key: &EncryptionKey,
    default_tenant_id: &Option<String>,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        WebhookCommands::Add { tenant, url, events } => {
            let tenant = resolve_tenant(tenant, default_tenant_id)?;
            let ctx = TenantContext::new(tenant, Role::Admin);
            let secret = generate_secret();
            let (ciphertext, nonce) = webhook::encrypt_secret(&key.0, &secret)?;
            let row = db.insert_webhook(&ctx, &url, &events, &ciphertext, &nonce).await?;

            output::print_success(&format!("webhook {} registered", row.id));
            output::print_detail("Signing secret (shown once)", &secret);
            output::print_item(&view(&row), format);
        }

        WebhookCommands::List { tenant } => {
            let tenant = resolve_tenant(tenant, default_tenant_id)?;
            let ctx = TenantContext::new(tenant, Role::Admin);
            let rows = db.list_webhooks(&ctx).await?;
            let views: Vec<WebhookView> = rows.iter().map(view).collect();
            output::print_list(&views, format);
        }

        WebhookCommands::Rotate { tenant, id } => {
            let tenant = resolve_tenant(tenant, default_tenant_id)?;
            let ctx = TenantContext::new(tenant, Role::Admin);
            let secret = generate_secret();
            let (ciphertext, nonce) = webhook::encrypt_secret(&key.0, &secret)?;
            db.rotate_webhook_secret(&ctx, id, &ciphertext, &nonce).await?;

            output::print_success(&format!("webhook {id} secret rotated"));
            output::print_detail("New signing secret (shown once)", &secret);
        }
    }

    Ok(())
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    format!("whsec_{}", hex::encode(bytes))
}

fn view(row: &aiseo_core::db::WebhookRow) -> WebhookView {
    WebhookView {
        id: row.id,
        tenant_id: row.tenant_id.clone(),
        url: row.url.clone(),
        enabled: row.enabled,
        events: if row.events.is_empty() { "*".to_string() } else { row.events.join(",") },
    }
}
