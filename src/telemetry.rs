//! Tracing subscriber setup with optional OTLP export
//!
//! Spans are exported when `OTEL_EXPORTER_OTLP_ENDPOINT` is set; otherwise
//! events only go to stdout.

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::{runtime, trace, Resource};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

pub const SERVICE_NAME: &str = "cluster-gitops";
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

pub fn init_tracing(json: bool) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let otel_layer = match std::env::var(OTLP_ENDPOINT_ENV) {
        Ok(endpoint) if !endpoint.is_empty() => {
            global::set_text_map_propagator(TraceContextPropagator::new());
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(trace::config().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])))
                .install_batch(runtime::Tokio)
                .map_err(|e| Error::ConfigError(format!("initializing OTLP tracer: {e}")))?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        _ => None,
    };
    let otel_enabled = otel_layer.is_some();

    let (plain, structured) = if json {
        (None, Some(fmt::layer().json().with_current_span(true).with_target(true)))
    } else {
        (Some(fmt::layer().with_target(true)), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain)
        .with(structured)
        .with(otel_layer)
        .try_init()
        .map_err(|e| Error::ConfigError(format!("initializing tracing subscriber: {e}")))?;

    if otel_enabled {
        tracing::info!("OpenTelemetry tracing initialized");
    } else {
        tracing::debug!("OpenTelemetry tracing disabled ({OTLP_ENDPOINT_ENV} not set)");
    }
    Ok(())
}

/// Flush buffered spans before exit.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
