//! Error handling for the AISEO orchestration substrate.
//!
//! This module provides:
//! - A typed error taxonomy mapped onto the transient/terminal/validation/quota
//!   categories the substrate's components reason about (flow orchestrator,
//!   job worker, quota engine, outbox dispatcher, webhook delivery)
//! - HTTP status code mapping for the liveness endpoint and any error surfaced
//!   to an operator through the admin CLI
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use aiseo_core::error::{AiseoError, Result, ErrorContext};
//!
//! fn my_function() -> Result<()> {
//!     some_operation()
//!         .context("Failed to perform operation")
//!         .with_error_code(ErrorCode::InternalError)?;
//!     Ok(())
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for substrate operations.
pub type Result<T> = std::result::Result<T, AiseoError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and double as the `willRetry`/`retryable` signal the
/// job worker and outbox dispatcher act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Flow / DAG errors (1000-1099)
    FlowCycleDetected,
    FlowValidationFailed,
    FlowJobNotFound,
    FlowAlreadySubmitted,
    InvalidStateTransition,
    DependencyNotMet,

    // Quota errors (1100-1199)
    QuotaExceeded,
    QuotaCheckFailed,

    // Job / agent errors (1200-1299)
    AgentNotFound,
    AgentExecutionFailed,
    SubagentDepthExceeded,
    JobCancelled,
    JobTimeout,

    // Webhook errors (1300-1399)
    WebhookUnreachable,
    WebhookSsrfRejected,
    WebhookSignatureFailed,

    // Database Errors (2000-2099)
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseQueryFailed,
    DatabaseTransactionFailed,
    RecordNotFound,
    DuplicateRecord,

    // Cache / Redis Errors (2100-2199)
    CacheError,
    CacheConnectionFailed,
    CacheMiss,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,
    InvalidJson,

    // External Service Errors (3000-3099)
    NetworkError,
    ExternalServiceError,

    // Authentication/Authorization (4000-4099)
    Unauthorized,
    Forbidden,
    InvalidToken,
    TokenExpired,

    // Validation Errors (4100-4199)
    ValidationError,
    InvalidInput,
    MissingRequiredField,
    InvalidFormat,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
    NotImplemented,
    UnknownError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::FlowCycleDetected => 1000,
            Self::FlowValidationFailed => 1001,
            Self::FlowJobNotFound => 1002,
            Self::FlowAlreadySubmitted => 1003,
            Self::InvalidStateTransition => 1004,
            Self::DependencyNotMet => 1005,

            Self::QuotaExceeded => 1100,
            Self::QuotaCheckFailed => 1101,

            Self::AgentNotFound => 1200,
            Self::AgentExecutionFailed => 1201,
            Self::SubagentDepthExceeded => 1202,
            Self::JobCancelled => 1203,
            Self::JobTimeout => 1204,

            Self::WebhookUnreachable => 1300,
            Self::WebhookSsrfRejected => 1301,
            Self::WebhookSignatureFailed => 1302,

            Self::DatabaseError => 2000,
            Self::DatabaseConnectionFailed => 2001,
            Self::DatabaseQueryFailed => 2002,
            Self::DatabaseTransactionFailed => 2003,
            Self::RecordNotFound => 2004,
            Self::DuplicateRecord => 2005,

            Self::CacheError => 2100,
            Self::CacheConnectionFailed => 2101,
            Self::CacheMiss => 2102,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,
            Self::InvalidJson => 2202,

            Self::NetworkError => 3000,
            Self::ExternalServiceError => 3001,

            Self::Unauthorized => 4000,
            Self::Forbidden => 4001,
            Self::InvalidToken => 4002,
            Self::TokenExpired => 4003,

            Self::ValidationError => 4100,
            Self::InvalidInput => 4101,
            Self::MissingRequiredField => 4102,
            Self::InvalidFormat => 4103,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
            Self::NotImplemented => 9001,
            Self::UnknownError => 9099,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::FlowJobNotFound | Self::AgentNotFound | Self::RecordNotFound | Self::CacheMiss => {
                StatusCode::NOT_FOUND
            }

            Self::FlowAlreadySubmitted | Self::DuplicateRecord | Self::InvalidStateTransition => {
                StatusCode::CONFLICT
            }

            Self::FlowCycleDetected
            | Self::FlowValidationFailed
            | Self::DependencyNotMet
            | Self::ValidationError
            | Self::InvalidInput
            | Self::MissingRequiredField
            | Self::InvalidFormat => StatusCode::UNPROCESSABLE_ENTITY,

            Self::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,

            Self::JobTimeout => StatusCode::GATEWAY_TIMEOUT,

            Self::Unauthorized | Self::InvalidToken | Self::TokenExpired => StatusCode::UNAUTHORIZED,

            Self::Forbidden | Self::WebhookSsrfRejected => StatusCode::FORBIDDEN,

            Self::DatabaseConnectionFailed
            | Self::CacheConnectionFailed
            | Self::ExternalServiceError
            | Self::WebhookUnreachable
            | Self::QuotaCheckFailed => StatusCode::SERVICE_UNAVAILABLE,

            Self::NetworkError => StatusCode::BAD_GATEWAY,

            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,

            Self::DatabaseError
            | Self::DatabaseQueryFailed
            | Self::DatabaseTransactionFailed
            | Self::CacheError
            | Self::SerializationError
            | Self::DeserializationError
            | Self::InvalidJson
            | Self::AgentExecutionFailed
            | Self::SubagentDepthExceeded
            | Self::JobCancelled
            | Self::WebhookSignatureFailed
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::InternalError
            | Self::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the job worker / outbox dispatcher should retry an operation
    /// that failed with this code (the `willRetry` signal from §7).
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseConnectionFailed
                | Self::DatabaseQueryFailed
                | Self::CacheConnectionFailed
                | Self::CacheError
                | Self::NetworkError
                | Self::ExternalServiceError
                | Self::WebhookUnreachable
                | Self::QuotaCheckFailed
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "flow",
            1100..=1199 => "quota",
            1200..=1299 => "job",
            1300..=1399 => "webhook",
            2000..=2099 => "database",
            2100..=2199 => "cache",
            2200..=2299 => "serialization",
            3000..=3099 => "external_service",
            4000..=4099 => "authentication",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging and alerting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ValidationError
            | ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFormat
            | ErrorCode::FlowJobNotFound
            | ErrorCode::AgentNotFound
            | ErrorCode::RecordNotFound
            | ErrorCode::CacheMiss
            | ErrorCode::FlowValidationFailed
            | ErrorCode::DependencyNotMet
            | ErrorCode::FlowAlreadySubmitted
            | ErrorCode::DuplicateRecord
            | ErrorCode::InvalidStateTransition => Self::Low,

            ErrorCode::QuotaExceeded
            | ErrorCode::JobTimeout
            | ErrorCode::JobCancelled
            | ErrorCode::WebhookUnreachable
            | ErrorCode::WebhookSsrfRejected
            | ErrorCode::NotImplemented => Self::Medium,

            ErrorCode::DatabaseError
            | ErrorCode::DatabaseQueryFailed
            | ErrorCode::DatabaseTransactionFailed
            | ErrorCode::CacheError
            | ErrorCode::SerializationError
            | ErrorCode::DeserializationError
            | ErrorCode::InvalidJson
            | ErrorCode::AgentExecutionFailed
            | ErrorCode::SubagentDepthExceeded
            | ErrorCode::WebhookSignatureFailed
            | ErrorCode::NetworkError
            | ErrorCode::ExternalServiceError
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration
            | ErrorCode::Unauthorized
            | ErrorCode::Forbidden
            | ErrorCode::InvalidToken
            | ErrorCode::TokenExpired
            | ErrorCode::FlowCycleDetected
            | ErrorCode::QuotaCheckFailed => Self::High,

            ErrorCode::DatabaseConnectionFailed
            | ErrorCode::CacheConnectionFailed
            | ErrorCode::InternalError
            | ErrorCode::UnknownError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_secs = Some(seconds);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the substrate.
#[derive(Error, Debug)]
#[allow(dead_code)]
pub struct AiseoError {
    code: ErrorCode,
    user_message: Cow<'static, str>,
    internal_message: Option<String>,
    details: ErrorDetails,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for AiseoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl AiseoError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(&entity_type, &entity_id))
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// The `willRetry` signal consumed by the job worker and outbox dispatcher.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "critical error"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "high severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "aiseo_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&AiseoError> for ErrorResponse {
    fn from(error: &AiseoError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: if error.details.context.is_empty()
                    && error.details.entity_id.is_none()
                    && error.details.retry_after_secs.is_none()
                {
                    None
                } else {
                    Some(error.details.clone())
                },
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for AiseoError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.http_status();
        let response = ErrorResponse::from(&self);
        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

pub trait ErrorContext<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| AiseoError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| AiseoError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| AiseoError::new(ErrorCode::RecordNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| AiseoError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for AiseoError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (ErrorCode::RecordNotFound, "The requested record was not found"),
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    if constraint.contains("unique") || constraint.contains("pkey") {
                        return Self::with_internal(
                            ErrorCode::DuplicateRecord,
                            "A record with this identifier already exists",
                            format!("Constraint violation: {}", constraint),
                        )
                        .with_source(error);
                    }
                }
                (ErrorCode::DatabaseQueryFailed, "A database error occurred")
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                (ErrorCode::DatabaseConnectionFailed, "Unable to connect to the database")
            }
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<redis::RedisError> for AiseoError {
    fn from(error: redis::RedisError) -> Self {
        let (code, user_msg) = if error.is_connection_refusal() || error.is_connection_dropped() {
            (ErrorCode::CacheConnectionFailed, "Unable to connect to Redis")
        } else if error.is_timeout() {
            (ErrorCode::CacheError, "Redis operation timed out")
        } else {
            (ErrorCode::CacheError, "A Redis error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for AiseoError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() {
            ErrorCode::DeserializationError
        } else if error.is_eof() {
            ErrorCode::InvalidJson
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string()).with_source(error)
    }
}

impl From<reqwest::Error> for AiseoError {
    fn from(error: reqwest::Error) -> Self {
        let (code, user_msg) = if error.is_timeout() {
            (ErrorCode::WebhookUnreachable, "Webhook delivery timed out")
        } else if error.is_connect() {
            (ErrorCode::WebhookUnreachable, "Failed to connect to webhook endpoint")
        } else {
            (ErrorCode::NetworkError, "Network error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<tokio::time::error::Elapsed> for AiseoError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::with_internal(ErrorCode::JobTimeout, "Operation timed out", error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for AiseoError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, user_msg) = match error.kind() {
            ErrorKind::NotFound => (ErrorCode::RecordNotFound, "File or resource not found"),
            ErrorKind::PermissionDenied => (ErrorCode::Forbidden, "Permission denied"),
            ErrorKind::TimedOut => (ErrorCode::JobTimeout, "Operation timed out"),
            ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                (ErrorCode::NetworkError, "Connection failed")
            }
            _ => (ErrorCode::InternalError, "An I/O error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for AiseoError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<AiseoError>() {
            Ok(aiseo_error) => aiseo_error,
            Err(error) => Self::with_internal(ErrorCode::InternalError, "An internal error occurred", error.to_string()),
        }
    }
}

impl From<config::ConfigError> for AiseoError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (ErrorCode::MissingConfiguration, "Required configuration not found"),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => {
                (ErrorCode::InvalidConfiguration, "Configuration file is invalid")
            }
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Constructors for Domain Errors
// ═══════════════════════════════════════════════════════════════════════════════

impl AiseoError {
    // ─────────────────────────────────────────────────────────────────────────
    // Flow / DAG errors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn cycle_detected(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::FlowCycleDetected, format!("Cycle detected in flow DAG: {}", details.into()))
    }

    pub fn flow_job_not_found(job_id: uuid::Uuid) -> Self {
        Self::new(ErrorCode::FlowJobNotFound, format!("Flow job not found: {}", job_id))
            .with_details(ErrorDetails::new().with_entity("flow_job", job_id.to_string()))
    }

    pub fn invalid_state_transition(from: impl fmt::Debug, to: impl fmt::Debug) -> Self {
        Self::new(
            ErrorCode::InvalidStateTransition,
            format!("Invalid job state transition: {:?} -> {:?}", from, to),
        )
        .with_context("from_state", format!("{:?}", from))
        .with_context("to_state", format!("{:?}", to))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Quota errors
    // ─────────────────────────────────────────────────────────────────────────

    /// The structured carrier spec §4.4/§7 requires: quota name, used, limit.
    pub fn quota_exceeded(quota: impl Into<String>, used: i64, limit: i64) -> Self {
        let quota_name = quota.into();
        Self::new(
            ErrorCode::QuotaExceeded,
            format!("Quota exceeded: {} used {}, limit {}", quota_name, used, limit),
        )
        .with_context("quota", &quota_name)
        .with_context("used", used)
        .with_context("limit", limit)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agent / job errors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn agent_not_found(agent_id: impl Into<String>) -> Self {
        let id = agent_id.into();
        Self::new(ErrorCode::AgentNotFound, format!("Agent not found: {}", id))
            .with_details(ErrorDetails::new().with_entity("agent", &id))
    }

    pub fn agent_execution_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::AgentExecutionFailed, format!("Agent execution failed: {}", reason.into()))
    }

    pub fn subagent_depth_exceeded(depth: u32, max: u32) -> Self {
        Self::new(
            ErrorCode::SubagentDepthExceeded,
            format!("Subagent spawn depth {} exceeds maximum {}", depth, max),
        )
        .with_context("depth", depth)
        .with_context("max_depth", max)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Webhook errors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn webhook_ssrf_rejected(url: impl Into<String>) -> Self {
        let target = url.into();
        Self::new(ErrorCode::WebhookSsrfRejected, format!("Webhook URL rejected: {}", target))
            .with_context("url", &target)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resource-budget errors (shared by the in-process task DAG and the
    // agent contract tracker)
    // ─────────────────────────────────────────────────────────────────────────

    pub fn task_not_found(task_id: uuid::Uuid) -> Self {
        Self::not_found("task", task_id.to_string())
    }

    pub fn task_already_exists(task_id: uuid::Uuid) -> Self {
        Self::new(ErrorCode::ValidationError, format!("task already exists: {}", task_id))
    }

    pub fn contract_violation(remaining: f64, requested: f64) -> Self {
        Self::new(
            ErrorCode::QuotaExceeded,
            format!("contract budget exceeded: {} remaining, {} requested", remaining, requested),
        )
        .with_context("remaining", remaining)
        .with_context("requested", requested)
    }

    pub fn time_limit_exceeded(requested_secs: u64, remaining_secs: u64) -> Self {
        Self::new(
            ErrorCode::QuotaExceeded,
            format!("time budget exceeded: {}s requested, {}s remaining", requested_secs, remaining_secs),
        )
    }

    pub fn token_limit_exceeded(used: u64, limit: u64) -> Self {
        Self::new(ErrorCode::QuotaExceeded, format!("token limit exceeded: {} used, limit {}", used, limit))
    }

    pub fn cost_limit_exceeded(used: f64, limit: f64) -> Self {
        Self::new(ErrorCode::QuotaExceeded, format!("cost limit exceeded: {} used, limit {}", used, limit))
    }

    pub fn api_call_limit_exceeded(used: u64, limit: u64) -> Self {
        Self::new(ErrorCode::QuotaExceeded, format!("api call limit exceeded: {} used, limit {}", used, limit))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::FlowJobNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::ValidationError.http_status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ErrorCode::InternalError.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorCode::QuotaExceeded.http_status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::DatabaseConnectionFailed.is_retryable());
        assert!(ErrorCode::WebhookUnreachable.is_retryable());
        assert!(!ErrorCode::ValidationError.is_retryable());
        assert!(!ErrorCode::FlowJobNotFound.is_retryable());
    }

    #[test]
    fn test_quota_exceeded_carries_structured_context() {
        let error = AiseoError::quota_exceeded("serp_jobs", 1000, 1000);
        assert_eq!(error.code(), ErrorCode::QuotaExceeded);
        assert_eq!(error.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(error.details().context.contains_key("quota"));
        assert!(error.details().context.contains_key("used"));
        assert!(error.details().context.contains_key("limit"));
    }

    #[test]
    fn test_error_context() {
        let error = AiseoError::new(ErrorCode::ValidationError, "Invalid input")
            .with_context("field", "cron")
            .with_context("reason", "invalid expression");

        assert!(error.details().context.contains_key("field"));
        assert!(error.details().context.contains_key("reason"));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = AiseoError::validation("Invalid cron expression");
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("VALIDATION_ERROR"));
        assert!(json.contains("Invalid cron expression"));
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::ValidationError), ErrorSeverity::Low);
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::QuotaExceeded), ErrorSeverity::Medium);
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::DatabaseError), ErrorSeverity::High);
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::DatabaseConnectionFailed), ErrorSeverity::Critical);
    }

    #[test]
    fn test_error_display() {
        let error = AiseoError::with_internal(
            ErrorCode::DatabaseError,
            "Database connection failed",
            "Connection refused: localhost:5432",
        );

        let display = format!("{}", error);
        assert!(display.contains("DatabaseError"));
        assert!(display.contains("Database connection failed"));
        assert!(display.contains("Connection refused"));
    }
}
