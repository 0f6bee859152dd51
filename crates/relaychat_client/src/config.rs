//! Client configuration.
//!
//! A [`ClientConfig`] is passed by reference into everything that talks to
//! the relay; there is no process-wide client state.

use derive_getters::Getters;
use relaychat_core::GenerationOptions;
use relaychat_error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_builder::Builder)]
#[builder(setter(into))]
pub struct ClientConfig {
    /// Base URL of the relay
    #[serde(default = "default_relay_url")]
    #[builder(default = "default_relay_url()")]
    relay_url: String,
    /// Maximum number of files attached to one message
    #[serde(default = "default_max_files")]
    #[builder(default = "default_max_files()")]
    max_files: usize,
    /// Per-file size cap in bytes
    #[serde(default = "default_max_file_bytes")]
    #[builder(default = "default_max_file_bytes()")]
    max_file_bytes: u64,
    /// Buffered deadline requested from the relay, in seconds
    #[serde(default)]
    #[builder(default)]
    request_timeout_secs: Option<u64>,
    /// Sampling options sent with every generation request
    #[serde(default)]
    #[builder(default)]
    generation: GenerationOptions,
}

fn default_relay_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_max_files() -> usize {
    10
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            request_timeout_secs: None,
            generation: GenerationOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Returns a builder for constructing a ClientConfig.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Default config file location: `<config dir>/relaychat/client.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("relaychat").join("client.toml"))
    }

    /// Load configuration from defaults, a TOML file and the environment.
    ///
    /// With `path = None` the file at [`ClientConfig::default_path`] is used if
    /// it exists. Environment variables use the `RELAYCHAT_` prefix, e.g.
    /// `RELAYCHAT_RELAY_URL`.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        match path {
            Some(path) => {
                builder = builder.add_source(::config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    builder = builder.add_source(::config::File::from(path).required(false));
                }
            }
        }

        let config: Self = builder
            .add_source(::config::Environment::with_prefix("RELAYCHAT").try_parsing(true))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ConfigError::new(format!("Failed to load client configuration: {}", e)))?;

        if config.max_files == 0 {
            return Err(ConfigError::new("max_files must be positive"));
        }
        debug!(relay_url = %config.relay_url, "Client configuration loaded");
        Ok(config)
    }

    /// Same configuration pointed at another relay.
    pub fn with_relay_url(mut self, relay_url: impl Into<String>) -> Self {
        self.relay_url = relay_url.into();
        self
    }

    /// Buffered deadline requested from the relay, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
