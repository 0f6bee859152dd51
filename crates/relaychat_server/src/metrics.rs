//! Relay metrics.
//!
//! Instruments are only created with the `metrics` feature; without it every
//! recording method is a no-op so handlers can record unconditionally.

#[cfg(feature = "metrics")]
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

/// OpenTelemetry instruments for the relay.
#[derive(Clone, Default)]
pub struct RelayMetrics {
    #[cfg(feature = "metrics")]
    instruments: Option<std::sync::Arc<Instruments>>,
}

#[cfg(feature = "metrics")]
struct Instruments {
    requests: Counter<u64>,
    errors: Counter<u64>,
    stream_bytes: Counter<u64>,
    uploads: Counter<u64>,
    upload_bytes: Counter<u64>,
    backend_latency: Histogram<f64>,
}

impl std::fmt::Debug for RelayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayMetrics")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl RelayMetrics {
    /// Create metrics backed by the global meter provider.
    pub fn new() -> Self {
        #[cfg(feature = "metrics")]
        {
            let meter = global::meter("relaychat_server");
            let instruments = Instruments {
                requests: meter
                    .u64_counter("relay.requests")
                    .with_description("Requests handled, by route")
                    .build(),
                errors: meter
                    .u64_counter("relay.errors")
                    .with_description("Error responses, by kind")
                    .build(),
                stream_bytes: meter
                    .u64_counter("relay.stream_bytes")
                    .with_unit("bytes")
                    .with_description("Bytes piped through streamed responses")
                    .build(),
                uploads: meter
                    .u64_counter("relay.uploads")
                    .with_description("Files stored")
                    .build(),
                upload_bytes: meter
                    .u64_counter("relay.upload_bytes")
                    .with_unit("bytes")
                    .with_description("Bytes stored")
                    .build(),
                backend_latency: meter
                    .f64_histogram("relay.backend_latency")
                    .with_unit("seconds")
                    .with_description("Time until the backend answered")
                    .build(),
            };
            Self {
                instruments: Some(std::sync::Arc::new(instruments)),
            }
        }
        #[cfg(not(feature = "metrics"))]
        {
            Self::default()
        }
    }

    /// Whether instruments are recording.
    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "metrics")]
        {
            self.instruments.is_some()
        }
        #[cfg(not(feature = "metrics"))]
        {
            false
        }
    }

    /// Record a handled request.
    pub fn record_request(&self, route: &'static str) {
        #[cfg(feature = "metrics")]
        {
            if let Some(m) = &self.instruments {
                m.requests.add(1, &[KeyValue::new("route", route)]);
            }
        }
        #[cfg(not(feature = "metrics"))]
        let _ = route;
    }

    /// Record an error response.
    pub fn record_error(&self, kind: &'static str) {
        #[cfg(feature = "metrics")]
        {
            if let Some(m) = &self.instruments {
                m.errors.add(1, &[KeyValue::new("kind", kind)]);
            }
        }
        #[cfg(not(feature = "metrics"))]
        let _ = kind;
    }

    /// Record bytes forwarded on a stream.
    pub fn record_stream_bytes(&self, bytes: usize) {
        #[cfg(feature = "metrics")]
        {
            if let Some(m) = &self.instruments {
                m.stream_bytes.add(bytes as u64, &[]);
            }
        }
        #[cfg(not(feature = "metrics"))]
        let _ = bytes;
    }

    /// Record a stored upload.
    pub fn record_upload(&self, bytes: u64) {
        #[cfg(feature = "metrics")]
        {
            if let Some(m) = &self.instruments {
                m.uploads.add(1, &[]);
                m.upload_bytes.add(bytes, &[]);
            }
        }
        #[cfg(not(feature = "metrics"))]
        let _ = bytes;
    }

    /// Record time until the backend answered.
    pub fn record_backend_latency(&self, route: &'static str, seconds: f64) {
        #[cfg(feature = "metrics")]
        {
            if let Some(m) = &self.instruments {
                m.backend_latency
                    .record(seconds, &[KeyValue::new("route", route)]);
            }
        }
        #[cfg(not(feature = "metrics"))]
        let _ = (route, seconds);
    }
}
