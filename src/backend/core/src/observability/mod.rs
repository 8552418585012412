//! Observability: Distributed Tracing, Metrics, and Logging.

use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the observability stack.
pub fn init(service_name: &str, otlp_endpoint: Option<&str>) -> anyhow::Result<()> {
    // Set up OpenTelemetry tracing if endpoint is provided
    if let Some(endpoint) = otlp_endpoint {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint),
            )
            .with_trace_config(
                opentelemetry_sdk::trace::config()
                    .with_resource(opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", service_name.to_string()),
                    ])),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;

        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(telemetry_layer)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        // Just use local logging
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }

    Ok(())
}

/// Shutdown OpenTelemetry.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Distributed tracer wrapper.
#[allow(dead_code)]
pub struct Tracer {
    service_name: String,
}

impl Tracer {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Get current trace ID.
    pub fn current_trace_id() -> Option<String> {
        let ctx = Context::current();
        let span = ctx.span();
        let span_ctx = span.span_context();

        if span_ctx.is_valid() {
            Some(span_ctx.trace_id().to_string())
        } else {
            None
        }
    }

    /// Get current span ID.
    pub fn current_span_id() -> Option<String> {
        let ctx = Context::current();
        let span = ctx.span();
        let span_ctx = span.span_context();

        if span_ctx.is_valid() {
            Some(span_ctx.span_id().to_string())
        } else {
            None
        }
    }
}

/// Metrics registry and helpers.
pub mod metrics {
    use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram};

    /// Register all metric descriptions.
    pub fn register_metrics() {
        // Counters
        describe_counter!(
            "aiseo_tasks_total",
            "Total number of tasks processed"
        );
        describe_counter!(
            "aiseo_tasks_completed",
            "Total number of tasks completed successfully"
        );
        describe_counter!(
            "aiseo_tasks_failed",
            "Total number of tasks that failed"
        );
        describe_counter!(
            "aiseo_tokens_total",
            "Total tokens consumed"
        );
        describe_counter!(
            "aiseo_cost_total",
            "Total cost in dollars"
        );
        describe_counter!(
            "aiseo_tool_calls_total",
            "Total tool calls made"
        );

        // Gauges
        describe_gauge!(
            "aiseo_active_agents",
            "Number of currently active agents"
        );
        describe_gauge!(
            "aiseo_queue_depth",
            "Number of tasks in the queue"
        );
        describe_gauge!(
            "aiseo_worker_utilization",
            "Worker pool utilization (0-1)"
        );

        // Histograms
        describe_histogram!(
            "aiseo_task_duration_seconds",
            "Task execution duration in seconds"
        );
        describe_histogram!(
            "aiseo_agent_latency_seconds",
            "Agent response latency in seconds"
        );
        describe_histogram!(
            "aiseo_tool_latency_seconds",
            "Tool execution latency in seconds"
        );
    }

    /// Record a task completion.
    pub fn record_task_completed(tokens: u64, cost: f64, duration_secs: f64) {
        counter!("aiseo_tasks_total").increment(1);
        counter!("aiseo_tasks_completed").increment(1);
        counter!("aiseo_tokens_total").increment(tokens);
        counter!("aiseo_cost_total").increment((cost * 1_000_000.0) as u64);
        histogram!("aiseo_task_duration_seconds").record(duration_secs);
    }

    /// Record a task failure.
    pub fn record_task_failed() {
        counter!("aiseo_tasks_total").increment(1);
        counter!("aiseo_tasks_failed").increment(1);
    }

    /// Update active agent count.
    pub fn set_active_agents(count: u64) {
        gauge!("aiseo_active_agents").set(count as f64);
    }

    /// Update queue depth.
    pub fn set_queue_depth(depth: u64) {
        gauge!("aiseo_queue_depth").set(depth as f64);
    }

    /// Record tool call latency.
    pub fn record_tool_latency(tool: &str, latency_secs: f64) {
        histogram!("aiseo_tool_latency_seconds", "tool" => tool.to_string()).record(latency_secs);
        counter!("aiseo_tool_calls_total", "tool" => tool.to_string()).increment(1);
    }
}

