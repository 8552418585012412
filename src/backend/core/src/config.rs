//! Configuration management.
//!
//! Process-level settings (spec §6) are bound from flat, unprefixed
//! environment variables — `DATABASE_URL`, `JWT_SECRET`, `ENCRYPTION_KEY`,
//! and friends — since they're operational knobs an operator sets directly,
//! not nested application tuning. The remaining ambient knobs (telemetry)
//! keep the teacher's nested `AISEO__SECTION__FIELD` convention.

use base64::Engine;
use serde::{Deserialize, Deserializer};

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `DATABASE_URL` — app connection, bound to the RLS subject per request.
    pub database_url: String,

    /// `DATABASE_URL_MIGRATION` — admin connection used for migrations and
    /// any cross-tenant read that must bypass RLS.
    pub database_url_migration: Option<String>,

    /// `REDIS_URL` — broker and event bus connection.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// `JWT_SECRET` — validates bearer tokens on websocket fan-out connect.
    pub jwt_secret: String,

    /// `ENCRYPTION_KEY` — 32-byte, base64-encoded AES-GCM key for webhook
    /// signing secrets and API key secrets.
    pub encryption_key: EncryptionKey,

    /// `DEFAULT_TENANT_ID` — implicit tenant for CLI scripts run without an
    /// explicit `--tenant` flag.
    pub default_tenant_id: Option<String>,

    /// `WORKER_HEALTH_PORT` — liveness endpoint port.
    #[serde(default = "default_worker_health_port")]
    pub worker_health_port: u16,

    /// `BACKUP_ENABLED` — backup scheduler toggle. The scheduler itself is
    /// out of scope here; this only exists so the documented env var parses.
    #[serde(default)]
    pub backup_enabled: bool,

    /// `BACKUP_S3_BUCKET` — backup destination.
    pub backup_s3_bucket: Option<String>,

    /// `SLACK_WEBHOOK_URL` — optional destination for a dev-time event
    /// bridge.
    pub slack_webhook_url: Option<String>,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// A 32-byte AES-256-GCM key, deserialized from a base64 string so it never
/// shows up in a `Debug` dump or an error message as raw key material.
#[derive(Clone)]
pub struct EncryptionKey(pub [u8; 32]);

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for EncryptionKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("ENCRYPTION_KEY must decode to exactly 32 bytes"))?;
        Ok(EncryptionKey(key))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// OpenTelemetry OTLP endpoint
    pub otlp_endpoint: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

// Default value functions
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_worker_health_port() -> u16 { 3002 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Config {
    /// Load configuration from the flat spec environment variables plus the
    /// nested `AISEO__`-prefixed ambient tuning variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .add_source(config::Environment::with_prefix("AISEO").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, still allowing env vars to override.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::default())
            .add_source(config::Environment::with_prefix("AISEO").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}
