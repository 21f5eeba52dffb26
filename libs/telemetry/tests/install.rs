use hdesk_telemetry::{LogFormat, TelemetrySettings, install_with};

#[test]
fn installs_once_without_exporter() {
    let mut settings = TelemetrySettings::new("hdesk-test", "0.0.0");
    settings.log_format = LogFormat::Json;
    settings.filter = "debug".into();

    let first = install_with(settings.clone()).unwrap();
    assert!(!first.exporting());
    tracing::info!("telemetry installed");

    let second = install_with(settings).unwrap();
    assert!(!second.exporting());
}
