//! Global tracing subscriber setup.
//!
//! Cronflow's engines log structured events (run ids, node ids, repair
//! counts) through `tracing`; this module wires the subscriber once at
//! process start and tears down the optional OpenTelemetry bridge on exit.

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Held so `shutdown_tracing` can flush spans before the process exits.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Filter applied when `RUST_LOG` is unset: engine crates at info, the
/// rest at warn.
const DEFAULT_FILTER: &str = "warn,cronflow_core=info,cronflow_infra=info";

/// Install the global subscriber.
///
/// A `fmt` layer with span-close timing is always present; `enable_otel`
/// adds a tracing-to-OpenTelemetry bridge with a stdout span exporter
/// (swap for OTLP when shipping somewhere real).
///
/// # Errors
///
/// Fails if a global subscriber was already installed.
pub fn init_tracing(enable_otel: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("cronflow");

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;
    } else {
        registry.try_init()?;
    }

    Ok(())
}

/// Flush buffered spans and shut the tracer provider down.
///
/// No-op when OpenTelemetry was never enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("tracer provider shutdown error: {e}");
        }
    }
}
