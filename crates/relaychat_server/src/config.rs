//! Relay configuration.
//!
//! Values are layered with the `config` crate: field defaults, then an
//! optional TOML file, then `RELAY_*` environment variables.

use derive_getters::Getters;
use relaychat_core::LogFormat;
use relaychat_error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default config file looked up when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// How stored uploads are referenced in upload responses.
///
/// The relay uses exactly one convention for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStyle {
    /// Relay-servable URL path under `public_upload_prefix`
    #[default]
    Url,
    /// Absolute filesystem path; only meaningful when relay and backend
    /// share a filesystem
    AbsolutePath,
}

/// Relay settings.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_builder::Builder,
)]
#[builder(setter(into))]
pub struct RelayConfig {
    /// Address the relay listens on
    #[serde(default = "default_listen_addr")]
    #[builder(default = "default_listen_addr()")]
    listen_addr: String,
    /// Base URL of the model-serving backend
    #[serde(default = "default_backend_url")]
    #[builder(default = "default_backend_url()")]
    backend_url: String,
    /// Directory receiving uploaded files (created on first upload)
    #[serde(default = "default_upload_dir")]
    #[builder(default = "default_upload_dir()")]
    upload_dir: PathBuf,
    /// Reference convention for stored uploads
    #[serde(default)]
    #[builder(default)]
    reference_style: ReferenceStyle,
    /// URL path prefix under which uploads are served
    #[serde(default = "default_public_upload_prefix")]
    #[builder(default = "default_public_upload_prefix()")]
    public_upload_prefix: String,
    /// Deadline of a buffered backend call, in seconds
    #[serde(default = "default_buffered_timeout_secs")]
    #[builder(default = "default_buffered_timeout_secs()")]
    buffered_timeout_secs: u64,
    /// Upper bound for client-requested deadlines, in seconds
    #[serde(default = "default_max_timeout_secs")]
    #[builder(default = "default_max_timeout_secs()")]
    max_timeout_secs: u64,
    /// Connection establishment timeout towards the backend, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    #[builder(default = "default_connect_timeout_secs()")]
    connect_timeout_secs: u64,
    /// Per-file upload cap in bytes; 0 disables the cap
    #[serde(default = "default_max_upload_bytes")]
    #[builder(default = "default_max_upload_bytes()")]
    max_upload_bytes: u64,
    /// Directory of a built web UI to serve for unmatched paths
    #[serde(default)]
    #[builder(default)]
    static_dir: Option<PathBuf>,
    /// Log line format
    #[serde(default)]
    #[builder(default)]
    log_format: LogFormat,
    /// OTLP/HTTP collector receiving relay metrics; unset keeps them local
    #[serde(default)]
    #[builder(default)]
    metrics_endpoint: Option<String>,
    /// Metrics export interval, in seconds
    #[serde(default = "default_metrics_interval_secs")]
    #[builder(default = "default_metrics_interval_secs()")]
    metrics_interval_secs: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_public_upload_prefix() -> String {
    "/uploads".to_string()
}

fn default_buffered_timeout_secs() -> u64 {
    300
}

fn default_max_timeout_secs() -> u64 {
    600
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_metrics_interval_secs() -> u64 {
    30
}

/// Multipart framing allowance on top of the per-file cap.
const MULTIPART_HEADROOM: u64 = 64 * 1024;

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            backend_url: default_backend_url(),
            upload_dir: default_upload_dir(),
            reference_style: ReferenceStyle::default(),
            public_upload_prefix: default_public_upload_prefix(),
            buffered_timeout_secs: default_buffered_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            static_dir: None,
            log_format: LogFormat::default(),
            metrics_endpoint: None,
            metrics_interval_secs: default_metrics_interval_secs(),
        }
    }
}

impl RelayConfig {
    /// Returns a builder for constructing a RelayConfig.
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }

    /// Load configuration from defaults, a TOML file and the environment.
    ///
    /// With `path = None`, `relay.toml` in the working directory is used if
    /// present. Environment variables use the `RELAY_` prefix, e.g.
    /// `RELAY_BACKEND_URL=http://gpu-box:8001`.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, a value fails to
    /// parse, or the result does not validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_overrides(path, std::iter::empty())
    }

    /// Like [`RelayConfig::load`], with explicit values (e.g. command-line
    /// flags) taking precedence over every other source.
    #[instrument(skip(overrides))]
    pub fn load_with_overrides<I>(path: Option<&Path>, overrides: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'static str, String)>,
    {
        let file = match path {
            Some(path) => ::config::File::from(path).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut builder = ::config::Config::builder()
            .add_source(file)
            .add_source(::config::Environment::with_prefix("RELAY").try_parsing(true));
        for (key, value) in overrides {
            builder = builder.set_override(key, value).map_err(|e| {
                ConfigError::new(format!("Invalid override for {}: {}", key, e))
            })?;
        }
        let settings = builder
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to read configuration: {}", e)))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Invalid configuration: {}", e)))?;
        config.validate()?;

        debug!(
            listen_addr = %config.listen_addr,
            backend_url = %config.backend_url,
            upload_dir = ?config.upload_dir,
            "Relay configuration loaded"
        );
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        reqwest::Url::parse(&self.backend_url).map_err(|e| {
            ConfigError::new(format!("backend_url '{}' is invalid: {}", self.backend_url, e))
        })?;
        if !self.public_upload_prefix.starts_with('/') || self.public_upload_prefix == "/" {
            return Err(ConfigError::new(format!(
                "public_upload_prefix '{}' must start with '/' and name a path",
                self.public_upload_prefix
            )));
        }
        if self.buffered_timeout_secs == 0 {
            return Err(ConfigError::new("buffered_timeout_secs must be positive"));
        }
        if self.max_timeout_secs < self.buffered_timeout_secs {
            return Err(ConfigError::new(
                "max_timeout_secs must not be below buffered_timeout_secs",
            ));
        }
        Ok(())
    }

    /// Parsed listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr.parse().map_err(|e| {
            ConfigError::new(format!("listen_addr '{}' is invalid: {}", self.listen_addr, e))
        })
    }

    /// Deadline of a buffered backend call.
    pub fn buffered_timeout(&self) -> Duration {
        Duration::from_secs(self.buffered_timeout_secs)
    }

    /// Upper bound for client-requested deadlines.
    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout_secs)
    }

    /// Metrics export interval.
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs.max(1))
    }

    /// Connection establishment timeout towards the backend.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-file upload cap in bytes, `None` when disabled.
    pub fn upload_limit(&self) -> Option<u64> {
        (self.max_upload_bytes > 0).then_some(self.max_upload_bytes)
    }

    /// Transport cap for `/upload` request bodies, `None` when disabled.
    ///
    /// Leaves room for the multipart boundary and part headers on top of
    /// [`RelayConfig::upload_limit`], which is enforced on the file bytes.
    pub fn upload_body_limit(&self) -> Option<usize> {
        self.upload_limit().map(|limit| {
            usize::try_from(limit.saturating_add(MULTIPART_HEADROOM)).unwrap_or(usize::MAX)
        })
    }
}
