//! Webhook delivery worker (spec §4.8): one shared bus subscriber signs and
//! best-effort-delivers every event to each tenant's enabled webhooks.
//! Delivery is one attempt per event reception; retries happen only via the
//! outbox on caller request, this worker never re-drives a failed POST.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::db::{Database, WebhookRow};
use crate::error::Result;
use crate::events::{BusEvent, EventBus};

use super::{crypto, signature, ssrf};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "aiseo-notification-hub/1.0";

pub struct WebhookDeliveryWorker {
    db: Database,
    bus: EventBus,
    client: reqwest::Client,
    encryption_key: [u8; 32],
}

impl WebhookDeliveryWorker {
    pub fn new(db: Database, bus: EventBus, encryption_key: [u8; 32]) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with a static timeout-only config");
        Self { db, bus, client, encryption_key }
    }

    /// Subscribe to every tenant's channel and deliver forever. A failed
    /// individual delivery is recorded and logged, never propagated — only a
    /// subscription-level error (e.g. Redis connection loss) ends the loop.
    pub async fn run(self, redis_url: &str) -> Result<()> {
        let mut sub = self.bus.subscribe_all(redis_url).await?;
        loop {
            let event = sub.recv().await?;
            if let Err(e) = self.deliver_to_all(&event).await {
                error!(error = %e, tenant_id = %event.tenant_id, event_type = %event.event_type, "webhook delivery pass failed");
            }
        }
    }

    #[instrument(skip(self, event), fields(tenant_id = %event.tenant_id, event_type = %event.event_type))]
    async fn deliver_to_all(&self, event: &BusEvent) -> Result<()> {
        let webhooks = self.db.list_webhooks_for_event(&event.tenant_id, &event.event_type).await?;
        if webhooks.is_empty() {
            return Ok(());
        }

        let project_id = event.payload.get("projectId").cloned().unwrap_or(serde_json::Value::Null);
        let ts = Utc::now().timestamp_millis().to_string();
        let body = serde_json::to_string(&serde_json::json!({
            "tenantId": event.tenant_id,
            "projectId": project_id,
            "type": event.event_type,
            "seq": event.seq,
            "ts": ts,
            "payload": event.payload,
        }))?;

        for webhook in &webhooks {
            self.deliver_one(&event.tenant_id, &event.event_type, event.seq, webhook, &ts, &body).await;
        }
        Ok(())
    }

    async fn deliver_one(&self, tenant_id: &str, event_type: &str, seq: i64, webhook: &WebhookRow, ts: &str, body: &str) {
        let url = match ssrf::guard(&webhook.url).await {
            Ok(url) => url,
            Err(e) => {
                warn!(webhook_id = %webhook.id, error = %e, "webhook URL blocked by SSRF guard");
                self.record(tenant_id, webhook.id, event_type, seq, None, false, Some(&e.to_string())).await;
                return;
            }
        };

        let secret = match crypto::decrypt_secret(&self.encryption_key, &webhook.secret_ciphertext, &webhook.secret_nonce) {
            Ok(s) => s,
            Err(e) => {
                error!(webhook_id = %webhook.id, error = %e, "failed to decrypt webhook secret");
                self.record(tenant_id, webhook.id, event_type, seq, None, false, Some("secret decryption failed")).await;
                return;
            }
        };

        let sig = signature::sign(&secret, ts, body);
        let result = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .header("X-AISEO-Timestamp", ts)
            .header("X-AISEO-Signature", &sig)
            .body(body.to_string())
            .send()
            .await;

        let (status_code, ok, error_msg) = match result {
            Ok(resp) => {
                let status = resp.status().as_u16() as i32;
                ((Some(status)), (200..300).contains(&status), None)
            }
            Err(e) => (None, false, Some(e.to_string())),
        };

        info!(webhook_id = %webhook.id, ok, status_code, "webhook delivery attempted");
        self.record(tenant_id, webhook.id, event_type, seq, status_code, ok, error_msg.as_deref()).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        tenant_id: &str,
        webhook_id: uuid::Uuid,
        event_type: &str,
        seq: i64,
        status_code: Option<i32>,
        ok: bool,
        error: Option<&str>,
    ) {
        if let Err(e) = self
            .db
            .insert_webhook_delivery(tenant_id, webhook_id, event_type, Some(seq), status_code, ok, error)
            .await
        {
            error!(webhook_id = %webhook_id, error = %e, "failed to record webhook delivery attempt");
        }
    }
}
