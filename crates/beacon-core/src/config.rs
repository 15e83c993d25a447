//! Application configuration management.
//!
//! Configuration is read from a TOML file and then overlaid with environment
//! variables of the form `BEACON__<SECTION>__<KEY>`, for example
//! `BEACON__UPLOAD__INTERVAL_SECS=60`. It covers:
//! - Bluetooth adapter selection
//! - Upload interval, request timeout and the HTTP sink to send to
//! - The status API bind address

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Environment, File, FileFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "BEACON";

/// Environment variable naming an alternate configuration file.
pub const CONFIG_PATH_ENV: &str = "BEACON_CONFIG";

/// Default phant ingestion base URL.
pub const DEFAULT_PHANT_BASE_URL: &str = "http://data.sparkfun.com/input/";

static MAC_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("valid regex"));

static PHANT_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("valid regex"));

/// Returns `true` if `s` looks like `AA:BB:CC:DD:EE:FF`.
#[must_use]
pub fn is_valid_mac_address(s: &str) -> bool {
    MAC_ADDRESS_RE.is_match(s)
}

/// Returns `true` if `s` is a non-empty alphanumeric phant key.
#[must_use]
pub fn is_valid_phant_key(s: &str) -> bool {
    PHANT_KEY_RE.is_match(s)
}

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Layered sources could not be merged or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path, e.g. `upload.interval_secs`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} configuration errors: {}", .0.len(), join_errors(.0))]
    MultipleValidationErrors(Vec<ConfigError>),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Advertisement scanner settings.
    pub scanner: ScannerConfig,

    /// Upload cycle and sink settings.
    pub upload: UploadConfig,

    /// Status API settings.
    pub server: ServerConfig,
}

/// Advertisement scanner settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Adapter name such as `hci0`. Uses the default adapter when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,

    /// Power the adapter on if it is off.
    pub power_on: bool,

    /// Capacity of the advertisement channel between scanner and pipeline.
    pub channel_capacity: usize,

    /// Emission period of the mock scanner, in milliseconds.
    pub mock_interval_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            power_on: true,
            channel_capacity: 256,
            mock_interval_ms: 1_000,
        }
    }
}

/// Upload cycle and sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Seconds between upload cycles.
    pub interval_secs: u64,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Run one last cycle when the listener shuts down.
    pub flush_on_shutdown: bool,

    /// Where observations are sent.
    pub sink: SinkConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            request_timeout_secs: 10,
            flush_on_shutdown: true,
            sink: SinkConfig::default(),
        }
    }
}

impl UploadConfig {
    /// Interval between upload cycles, never less than one second.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        if self.interval_secs == 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(self.interval_secs)
        }
    }

    /// Timeout applied to each upload request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// HTTP endpoint that receives observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// phant-style stream: one GET per observation with query parameters.
    Phant {
        /// Ingestion base URL; the public key is appended as a path segment.
        base_url: Url,
        /// Stream public key.
        public_key: String,
        /// Stream private key, sent as the `private_key` parameter.
        private_key: String,
    },
    /// JSON logging endpoint: one POST per observation.
    Json {
        /// Endpoint receiving the JSON bodies.
        endpoint: Url,
    },
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::Phant {
            base_url: Url::parse(DEFAULT_PHANT_BASE_URL).expect("valid default URL"),
            public_key: String::new(),
            private_key: String::new(),
        }
    }
}

impl SinkConfig {
    /// Short name of the sink kind, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Phant { .. } => "phant",
            Self::Json { .. } => "json",
        }
    }
}

/// Status API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the status API listens on.
    pub bind_address: SocketAddr,

    /// Number of recent observations kept for `/api/observations/recent`.
    pub recent_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            recent_capacity: 100,
        }
    }
}

impl Config {
    /// Load configuration from `path`, overlaid with environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist, a parse
    /// error if it is malformed, or validation errors for invalid values.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_layered(path, ENV_PREFIX)
    }

    /// Load configuration from `path` if it exists, otherwise start from
    /// defaults. Environment overrides apply in both cases.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or the result fails validation.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load_layered(path.as_ref(), ENV_PREFIX)
    }

    fn load_layered(path: &Path, env_prefix: &str) -> ConfigResult<Self> {
        let settings = ::config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            sink = config.upload.sink.kind(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Save configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns a single [`ConfigError::ValidationError`] or
    /// [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: &str| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.upload.interval_secs == 0 {
            invalid("upload.interval_secs", "must be at least 1 second");
        }
        if self.upload.request_timeout_secs == 0 {
            invalid("upload.request_timeout_secs", "must be at least 1 second");
        }
        if self.scanner.channel_capacity == 0 {
            invalid("scanner.channel_capacity", "must be greater than zero");
        }
        if self.scanner.mock_interval_ms == 0 {
            invalid("scanner.mock_interval_ms", "must be greater than zero");
        }
        if self.server.recent_capacity == 0 {
            invalid("server.recent_capacity", "must be greater than zero");
        }
        if let Some(adapter) = &self.scanner.adapter {
            if adapter.trim().is_empty() {
                invalid("scanner.adapter", "must not be blank when set");
            }
        }

        match &self.upload.sink {
            SinkConfig::Phant {
                base_url,
                public_key,
                private_key,
            } => {
                if !matches!(base_url.scheme(), "http" | "https") {
                    invalid("upload.sink.base_url", "must be an http or https URL");
                }
                if !is_valid_phant_key(public_key) {
                    invalid("upload.sink.public_key", "must be a non-empty alphanumeric key");
                }
                if !is_valid_phant_key(private_key) {
                    invalid("upload.sink.private_key", "must be a non-empty alphanumeric key");
                }
            }
            SinkConfig::Json { endpoint } => {
                if !matches!(endpoint.scheme(), "http" | "https") {
                    invalid("upload.sink.endpoint", "must be an http or https URL");
                }
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Configuration file location.
    ///
    /// `BEACON_CONFIG` wins when set. Otherwise `/etc/beacon-relay/config.toml`
    /// on Linux and the platform config directory elsewhere.
    #[must_use]
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/beacon-relay/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "beacon-relay").map_or_else(
                || PathBuf::from("config.toml"),
                |dirs| dirs.config_dir().join("config.toml"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phant_config() -> Config {
        let mut config = Config::default();
        config.upload.sink = SinkConfig::Phant {
            base_url: Url::parse(DEFAULT_PHANT_BASE_URL).unwrap(),
            public_key: "RMxw8yD6KATwDjDg9jD3".to_string(),
            private_key: "lzE1VB25ebfBpoprzop9".to_string(),
        };
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.upload.interval(), Duration::from_secs(30));
        assert_eq!(config.upload.request_timeout(), Duration::from_secs(10));
        assert!(config.upload.flush_on_shutdown);
        assert!(config.scanner.power_on);
        assert_eq!(config.server.bind_address.port(), 3000);
        assert_eq!(config.upload.sink.kind(), "phant");
    }

    #[test]
    fn test_default_sink_requires_keys() {
        let err = Config::default().validate().unwrap_err();
        match err {
            ConfigError::MultipleValidationErrors(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_valid_phant_config() {
        assert!(phant_config().validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = phant_config();
        config.upload.interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("upload.interval_secs"));
    }

    #[test]
    fn test_interval_never_zero() {
        let mut upload = UploadConfig::default();
        assert_eq!(upload.interval(), Duration::from_secs(30));
        upload.interval_secs = 0;
        assert_eq!(upload.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_json_sink_requires_http() {
        let mut config = Config::default();
        config.upload.sink = SinkConfig::Json {
            endpoint: Url::parse("ftp://logs.example.com/inputs").unwrap(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "upload.sink.endpoint"
        ));
    }

    #[test]
    fn test_mac_address_validation() {
        assert!(is_valid_mac_address("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac_address("ab:89:67:45:23:01"));
        assert!(!is_valid_mac_address("AA-BB-CC-DD-EE-FF"));
        assert!(!is_valid_mac_address("AA:BB:CC:DD:EE"));
        assert!(!is_valid_mac_address("GG:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_phant_key_validation() {
        assert!(is_valid_phant_key("RMxw8yD6KATwDjDg9jD3"));
        assert!(!is_valid_phant_key(""));
        assert!(!is_valid_phant_key("abc&def"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = phant_config();
        config.scanner.adapter = Some("hci1".to_string());
        config.server.recent_capacity = 25;
        config.save(&path).unwrap();

        let loaded = Config::load_layered(&path, "BEACON_TEST_ROUND_TRIP").unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_json_sink_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[upload]
interval_secs = 45

[upload.sink]
kind = "json"
endpoint = "https://logs-01.example.com/inputs/token/tag/http/"
"#,
        )
        .unwrap();

        let config = Config::load_layered(&path, "BEACON_TEST_JSON").unwrap();
        assert_eq!(config.upload.interval_secs, 45);
        assert_eq!(config.upload.request_timeout_secs, 10);
        assert!(matches!(config.upload.sink, SinkConfig::Json { .. }));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        phant_config().save(&path).unwrap();

        std::env::set_var("BEACON_TEST_ENV__UPLOAD__INTERVAL_SECS", "5");
        let config = Config::load_layered(&path, "BEACON_TEST_ENV");
        std::env::remove_var("BEACON_TEST_ENV__UPLOAD__INTERVAL_SECS");

        assert_eq!(config.unwrap().upload.interval_secs, 5);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&path), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[upload\ninterval_secs = ").unwrap();
        assert!(matches!(
            Config::load_layered(&path, "BEACON_TEST_MALFORMED"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
