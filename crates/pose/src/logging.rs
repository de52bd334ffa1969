use crate::config::PipelineConfig;
use common::TelemetryGuard;

/// Install the tracing subscriber: OTLP export when an endpoint is
/// configured, plain logging otherwise. Keep the returned guard alive for the
/// lifetime of the process.
pub fn init_observability(
    service_name: &str,
    config: &PipelineConfig,
) -> anyhow::Result<Option<TelemetryGuard>> {
    match config.otel_endpoint.as_deref() {
        Some(endpoint) => Ok(Some(TelemetryGuard::init(
            service_name,
            endpoint,
            config.environment,
        )?)),
        None => {
            common::setup_logging(config.environment);
            Ok(None)
        }
    }
}
