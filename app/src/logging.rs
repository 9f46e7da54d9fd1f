use crate::config::Config;
use crate::error::StartupError;
use once_cell::sync::OnceCell;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::TracerProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACER_PROVIDER: OnceCell<Option<TracerProvider>> = OnceCell::new();

/// Installs the global tracing subscriber, later calls are no-ops
pub fn init(config: &Config) -> Result<(), StartupError> {
    TRACER_PROVIDER
        .get_or_try_init(|| {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

            let provider = config.trace_stdout().then(|| {
                TracerProvider::builder()
                    .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
                    .build()
            });
            let otel_layer = provider
                .as_ref()
                .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("fastscale")));

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(otel_layer)
                .try_init()
                .map_err(|e| StartupError::Logging(e.to_string()))?;
            Ok(provider)
        })
        .map(|_| ())
}

/// Flushes pending spans of the stdout exporter
pub fn shutdown() {
    if let Some(Some(provider)) = TRACER_PROVIDER.get() {
        for res in provider.force_flush() {
            if let Err(e) = res {
                eprintln!("Failed flushing spans: {}", e);
            }
        }
    }
}
