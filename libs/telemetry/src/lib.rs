//! Tracing setup shared by the helpdesk binaries.
//!
//! Logs go to stdout as text or JSON (`LOG_FORMAT`), filtered by `RUST_LOG`. Spans are also
//! exported over OTLP when `ENABLE_OTEL` is set together with `OTEL_EXPORTER_OTLP_ENDPOINT`.

mod config;

use std::sync::OnceLock;

use anyhow::{Context, Result};
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{HasExportConfig, SpanExporter};
use opentelemetry_sdk::{Resource, propagation::TraceContextPropagator, trace::SdkTracerProvider};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{LogFormat, OtlpProtocol, TelemetrySettings};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Flushes exported spans when dropped; keep it alive for the lifetime of `main`.
#[must_use = "dropping the guard stops span export"]
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(err) = provider.shutdown()
        {
            eprintln!("span exporter shutdown failed: {err}");
        }
    }
}

/// Installs the global subscriber configured from the environment.
pub fn install(service_name: &str) -> Result<TelemetryGuard> {
    install_with(TelemetrySettings::from_env(
        service_name,
        env!("CARGO_PKG_VERSION"),
    ))
}

/// Installs the global subscriber. Only the first call in a process has an effect.
pub fn install_with(settings: TelemetrySettings) -> Result<TelemetryGuard> {
    if INSTALLED.set(()).is_err() {
        return Ok(TelemetryGuard { provider: None });
    }

    let filter = EnvFilter::try_new(&settings.filter)
        .with_context(|| format!("invalid log filter {:?}", settings.filter))?;
    let fmt_layer = match settings.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
    };

    let Some(endpoint) = settings.exporter_endpoint() else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .ok();
        return Ok(TelemetryGuard { provider: None });
    };

    let exporter = build_span_exporter(settings.otlp_protocol, endpoint)
        .context("build OTLP span exporter")?;
    let provider = SdkTracerProvider::builder()
        .with_resource(build_resource(&settings))
        .with_batch_exporter(exporter)
        .build();
    let tracer = provider.tracer(settings.service_name.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TraceContextPropagator::new());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(OpenTelemetryLayer::new(tracer))
        .try_init()
        .ok();
    tracing::info!(endpoint, "exporting spans over OTLP");

    Ok(TelemetryGuard {
        provider: Some(provider),
    })
}

fn build_span_exporter(
    protocol: OtlpProtocol,
    endpoint: &str,
) -> Result<SpanExporter, opentelemetry_otlp::ExporterBuildError> {
    match protocol {
        OtlpProtocol::Grpc => {
            let mut builder = SpanExporter::builder().with_tonic();
            builder.export_config().endpoint = Some(endpoint.to_string());
            builder.build()
        }
        OtlpProtocol::HttpProtobuf => {
            let mut builder = SpanExporter::builder().with_http();
            builder.export_config().endpoint = Some(endpoint.to_string());
            builder.build()
        }
    }
}

fn build_resource(settings: &TelemetrySettings) -> Resource {
    Resource::builder_empty()
        .with_service_name(settings.service_name.clone())
        .with_attributes([KeyValue::new(
            "service.version",
            settings.service_version.clone(),
        )])
        .build()
}
