//! Subscriber installation and the OTLP exporter guard.

use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{OtlpProtocol, TracingConfig};

/// RAII guard that flushes and shuts down the tracer provider on drop.
///
/// Hold it for the lifetime of the process. When OTLP export is disabled the
/// guard is empty and dropping it is a no-op.
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl TracingGuard {
    /// Whether spans are being exported to an OTLP collector.
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(ref mut provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shutdown tracer provider: {e}");
            }
        }
    }
}

/// Install the global tracing subscriber.
///
/// Always logs to stderr through the fmt layer. When `otlp_endpoint` is set,
/// spans are also exported; if the exporter cannot be built the relay still
/// starts with fmt-only logging and a warning.
pub fn init_tracing(config: &TracingConfig) -> TracingGuard {
    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        install_fmt_only(config);
        return TracingGuard { provider: None };
    };

    match try_init_with_otlp(config, endpoint) {
        Ok(guard) => guard,
        Err(e) => {
            install_fmt_only(config);
            tracing::warn!(
                error = %e,
                endpoint = %endpoint,
                "OTLP exporter failed to initialize, running with fmt-only tracing"
            );
            TracingGuard { provider: None }
        }
    }
}

/// Parse the configured filter, falling back to `info` on a bad directive.
pub(crate) fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// stderr fmt layer, plain text or JSON.
fn fmt_layer<S>(json: bool) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer::<S>()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer::<S>()
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    // Option has its own and_then, so name the trait.
    Layer::<S>::and_then(json_layer, text_layer)
}

fn install_fmt_only(config: &TracingConfig) {
    tracing_subscriber::registry()
        .with(fmt_layer(config.json_logs))
        .with(env_filter(&config.log_level))
        .init();
}

fn try_init_with_otlp(config: &TracingConfig, endpoint: &str) -> Result<TracingGuard> {
    let exporter = match config.protocol {
        OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?,
        OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()?,
    };

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder_empty()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build();

    let tracer = provider.tracer(config.service_name.clone());

    tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(fmt_layer(config.json_logs))
        .with(env_filter(&config.log_level))
        .init();

    tracing::info!(
        endpoint = %endpoint,
        service = %config.service_name,
        protocol = ?config.protocol,
        "OpenTelemetry OTLP tracing initialized"
    );

    Ok(TracingGuard {
        provider: Some(provider),
    })
}
