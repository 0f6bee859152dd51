//! Tracing subscriber and OpenTelemetry metrics initialization.

#[cfg(feature = "metrics")]
use opentelemetry::{KeyValue, global};
#[cfg(feature = "metrics")]
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
#[cfg(feature = "metrics")]
use tracing::info;
use tracing::{debug, instrument, warn};
use tracing_subscriber::EnvFilter;

/// Output format of log lines.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Calling this twice
/// is harmless; the second call keeps the first subscriber.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
    };
    if let Err(e) = result {
        warn!(error = %e, "Tracing subscriber already installed");
    }
}

/// Install a subscriber for interactive tools.
///
/// Logs go to stderr so stdout stays free for program output, and only
/// warnings are shown unless `RUST_LOG` says otherwise.
pub fn init_cli_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let result = match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    if let Err(e) = result {
        warn!(error = %e, "Tracing subscriber already installed");
    }
}

/// Installed meter provider. Dropping it flushes pending metrics and shuts
/// the exporter down.
#[derive(Debug, Default)]
pub struct MetricsGuard {
    #[cfg(feature = "metrics")]
    provider: Option<SdkMeterProvider>,
}

impl MetricsGuard {
    /// Whether metrics leave the process.
    pub fn is_exporting(&self) -> bool {
        #[cfg(feature = "metrics")]
        {
            self.provider.is_some()
        }
        #[cfg(not(feature = "metrics"))]
        {
            false
        }
    }
}

#[cfg(feature = "metrics")]
impl Drop for MetricsGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                warn!(error = %e, "Metrics shutdown failed");
            }
        }
    }
}

/// Export metrics over OTLP/HTTP to `endpoint`.
///
/// Without an endpoint, or without the `metrics` feature, instruments stay
/// no-ops and the returned guard does nothing.
#[instrument(skip_all, fields(service = service_name, endpoint = ?endpoint))]
pub fn init_metrics(
    service_name: &'static str,
    endpoint: Option<&str>,
    export_interval: Duration,
) -> Result<MetricsGuard, String> {
    let Some(endpoint) = endpoint else {
        debug!("No metrics endpoint configured");
        return Ok(MetricsGuard::default());
    };

    #[cfg(not(feature = "metrics"))]
    {
        let _ = export_interval;
        warn!(%endpoint, "Built without the metrics feature, not exporting");
        Ok(MetricsGuard::default())
    }

    #[cfg(feature = "metrics")]
    {
        let exporter = MetricExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .with_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("Failed to create OTLP exporter for {}: {}", endpoint, e))?;
        let reader = PeriodicReader::builder(exporter)
            .with_interval(export_interval)
            .build();
        let provider = SdkMeterProvider::builder()
            .with_resource(
                Resource::builder_empty()
                    .with_attributes([KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_reader(reader)
            .build();

        global::set_meter_provider(provider.clone());
        info!(%endpoint, interval = ?export_interval, "Exporting metrics");
        Ok(MetricsGuard {
            provider: Some(provider),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_endpoint_stay_local() {
        let guard = init_metrics("relaychat-test", None, Duration::from_secs(30))
            .expect("no-op init");
        assert!(!guard.is_exporting());
    }

    #[test]
    fn test_log_format_parses_lowercase() {
        assert_eq!("json".parse::<LogFormat>().ok(), Some(LogFormat::Json));
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
    }
}
