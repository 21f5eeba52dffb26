use std::env;

const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
const LOG_FILTER_ENV: &str = "RUST_LOG";
const ENABLE_OTEL_ENV: &str = "ENABLE_OTEL";
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const OTLP_PROTOCOL_ENV: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
const SERVICE_NAME_ENV: &str = "OTEL_SERVICE_NAME";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtlpProtocol {
    Grpc,
    HttpProtobuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging and trace export settings for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub service_name: String,
    pub service_version: String,
    pub log_format: LogFormat,
    /// `EnvFilter` directives.
    pub filter: String,
    /// OTLP collector; spans are only exported when this is set and export is enabled.
    pub otlp_endpoint: Option<String>,
    pub otlp_protocol: OtlpProtocol,
    pub export_enabled: bool,
}

impl TelemetrySettings {
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            log_format: LogFormat::Text,
            filter: "info".to_string(),
            otlp_endpoint: None,
            otlp_protocol: OtlpProtocol::Grpc,
            export_enabled: false,
        }
    }

    pub fn from_env(service_name: &str, service_version: &str) -> Self {
        Self::from_lookup(service_name, service_version, |key| env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable source.
    pub fn from_lookup(
        service_name: &str,
        service_version: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut settings = Self::new(
            lookup(SERVICE_NAME_ENV).unwrap_or_else(|| service_name.to_string()),
            service_version,
        );
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            settings.log_format = match format.trim().to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            };
        }
        if let Some(filter) = lookup(LOG_FILTER_ENV).filter(|f| !f.trim().is_empty()) {
            settings.filter = filter;
        }
        settings.otlp_endpoint = lookup(OTLP_ENDPOINT_ENV).filter(|e| !e.trim().is_empty());
        if let Some(protocol) = lookup(OTLP_PROTOCOL_ENV) {
            settings.otlp_protocol = match protocol.to_lowercase().as_str() {
                "http" | "http/protobuf" => OtlpProtocol::HttpProtobuf,
                _ => OtlpProtocol::Grpc,
            };
        }
        settings.export_enabled = lookup(ENABLE_OTEL_ENV)
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        settings
    }

    /// Endpoint to export spans to, if export is switched on.
    pub fn exporter_endpoint(&self) -> Option<&str> {
        if !self.export_enabled {
            return None;
        }
        self.otlp_endpoint.as_deref()
    }
}
