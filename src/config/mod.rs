//! Configuration management.
//!
//! [`SearchConfig`] is built from defaults, then a TOML file, then
//! `SPACESEARCH_*` environment variables, each layer overriding the last.
//!
//! ```toml
//! data_dir = "/var/lib/spacesearch"
//! machine_auth_api_key = "change-me"
//!
//! [index]
//! backend = "sqlite"      # memory | sqlite | scaled
//! path = "/var/lib/spacesearch/index.db"
//!
//! [events]
//! debounce_ms = 1000
//! settle_ms = 1000
//! workers = 1
//! queue_capacity = 1024
//!
//! [search]
//! default_page_size = 200
//! slow_query_ms = 500
//! fanout_workers = 4
//!
//! [observability.logging]
//! format = "json"
//! filter = "spacesearch=debug"
//!
//! [observability.metrics]
//! enabled = true
//! port = 9090
//! ```

use crate::events::DEFAULT_QUEUE_CAPACITY;
use crate::models::DEFAULT_PAGE_SIZE;
use crate::services::DEFAULT_FANOUT_WORKERS;
use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "spacesearch";
const ENV_PREFIX: &str = "SPACESEARCH_";

/// Which index strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackendKind {
    /// In-memory, lost on exit.
    Memory,
    /// `SQLite` behind a single shared connection.
    #[default]
    Sqlite,
    /// `SQLite` with a connection per call.
    Scaled,
}

impl IndexBackendKind {
    /// Returns the backend name as written in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Scaled => "scaled",
        }
    }

    /// Parses a backend name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            "scaled" | "sqlite-scaled" => Some(Self::Scaled),
            _ => None,
        }
    }
}

impl fmt::Display for IndexBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index settings.
#[derive(Debug, Clone, Default)]
pub struct IndexConfig {
    /// Backend strategy.
    pub backend: IndexBackendKind,
    /// Database file; defaults to `<data_dir>/index.db`.
    pub path: Option<PathBuf>,
}

/// Change event handling settings.
#[derive(Debug, Clone)]
pub struct EventsConfig {
    /// Quiet period before a space is re-indexed, in milliseconds.
    pub debounce_ms: u64,
    /// Delay before an event is handled, in milliseconds.
    pub settle_ms: u64,
    /// Number of dispatcher workers.
    pub workers: usize,
    /// Events buffered before publishers are rejected.
    pub queue_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            settle_ms: 1000,
            workers: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl EventsConfig {
    /// Returns the debounce delay.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Returns the settle delay.
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Query settings.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Page size used when a request asks for `0`.
    pub default_page_size: i32,
    /// Space searches slower than this are logged at info, in milliseconds.
    pub slow_query_ms: u64,
    /// Threads searching spaces concurrently.
    pub fanout_workers: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            slow_query_ms: 500,
            fanout_workers: DEFAULT_FANOUT_WORKERS,
        }
    }
}

impl SearchSettings {
    /// Returns the slow query threshold.
    #[must_use]
    pub const fn slow_query(&self) -> Duration {
        Duration::from_millis(self.slow_query_ms)
    }
}

/// Logging section as written in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directives, e.g. `spacesearch=debug`.
    pub filter: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

/// Metrics section as written in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSettings {
    /// Whether metrics are recorded.
    pub enabled: Option<bool>,
    /// Port of the Prometheus listener.
    pub port: Option<u16>,
}

/// Observability section as written in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: Option<LoggingSettings>,
    /// Metrics settings.
    pub metrics: Option<MetricsSettings>,
}

/// Main configuration for spacesearch.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Directory for persistent state.
    pub data_dir: PathBuf,
    /// Index settings.
    pub index: IndexConfig,
    /// Change event settings.
    pub events: EventsConfig,
    /// Query settings.
    pub search: SearchSettings,
    /// Key used to authenticate against the gateway on behalf of users.
    pub machine_auth_api_key: Option<SecretString>,
    /// Logging and metrics settings, resolved by [`crate::observability`].
    pub observability: ObservabilitySettings,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Machine auth key.
    pub machine_auth_api_key: Option<String>,
    /// Index section.
    pub index: Option<ConfigFileIndex>,
    /// Events section.
    pub events: Option<ConfigFileEvents>,
    /// Search section.
    pub search: Option<ConfigFileSearch>,
    /// Observability section.
    pub observability: Option<ObservabilitySettings>,
}

/// Index section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileIndex {
    /// Backend name.
    pub backend: Option<IndexBackendKind>,
    /// Database path.
    pub path: Option<String>,
}

/// Events section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEvents {
    /// Debounce delay.
    pub debounce_ms: Option<u64>,
    /// Settle delay.
    pub settle_ms: Option<u64>,
    /// Dispatcher workers.
    pub workers: Option<usize>,
    /// Queue capacity.
    pub queue_capacity: Option<usize>,
}

/// Search section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileSearch {
    /// Default page size.
    pub default_page_size: Option<i32>,
    /// Slow query threshold.
    pub slow_query_ms: Option<u64>,
    /// Fan-out threads.
    pub fanout_workers: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("", "", APP_NAME).map_or_else(
            || PathBuf::from(".spacesearch"),
            |dirs| dirs.data_dir().to_path_buf(),
        );
        Self {
            data_dir,
            index: IndexConfig::default(),
            events: EventsConfig::default(),
            search: SearchSettings::default(),
            machine_auth_api_key: None,
            observability: ObservabilitySettings::default(),
        }
    }
}

impl SearchConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/spacesearch/` on macOS)
    /// 2. XDG config dir (`~/.config/spacesearch/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join(APP_NAME).join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join(APP_NAME)
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                },
            }
        }

        Self::default()
    }

    /// Loads the given file, or the default location, then applies
    /// `SPACESEARCH_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given file cannot be loaded or an
    /// override has an invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Converts a `ConfigFile` to `SearchConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(key) = file.machine_auth_api_key.filter(|k| !k.is_empty()) {
            config.machine_auth_api_key = Some(SecretString::from(key));
        }
        if let Some(index) = file.index {
            if let Some(backend) = index.backend {
                config.index.backend = backend;
            }
            config.index.path = index.path.map(PathBuf::from);
        }
        if let Some(events) = file.events {
            if let Some(v) = events.debounce_ms {
                config.events.debounce_ms = v;
            }
            if let Some(v) = events.settle_ms {
                config.events.settle_ms = v;
            }
            if let Some(v) = events.workers {
                config.events.workers = v.max(1);
            }
            if let Some(v) = events.queue_capacity {
                config.events.queue_capacity = v.max(1);
            }
        }
        if let Some(search) = file.search {
            if let Some(v) = search.default_page_size {
                config.search.default_page_size = v;
            }
            if let Some(v) = search.slow_query_ms {
                config.search.slow_query_ms = v;
            }
            if let Some(v) = search.fanout_workers {
                config.search.fanout_workers = v.max(1);
            }
        }
        if let Some(observability) = file.observability {
            config.observability = observability;
        }

        config
    }

    /// Applies `SPACESEARCH_*` environment variables on top of the current values.
    ///
    /// Metrics and logging variables are read by [`crate::observability`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for a value that cannot be parsed.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("MACHINE_AUTH_API_KEY") {
            self.machine_auth_api_key = Some(SecretString::from(v));
        }
        if let Some(v) = env_var("INDEX_BACKEND") {
            self.index.backend = IndexBackendKind::parse(&v)
                .ok_or_else(|| Error::BadRequest(format!("unknown index backend: {v}")))?;
        }
        if let Some(v) = env_var("INDEX_PATH") {
            self.index.path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_parse("DEBOUNCE_MS")? {
            self.events.debounce_ms = v;
        }
        if let Some(v) = env_parse("SETTLE_MS")? {
            self.events.settle_ms = v;
        }
        if let Some(v) = env_parse::<usize>("WORKERS")? {
            self.events.workers = v.max(1);
        }
        if let Some(v) = env_parse("SLOW_QUERY_MS")? {
            self.search.slow_query_ms = v;
        }
        Ok(())
    }

    /// Returns the index database path.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.index
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("index.db"))
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the index backend.
    #[must_use]
    pub const fn with_index_backend(mut self, backend: IndexBackendKind) -> Self {
        self.index.backend = backend;
        self
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    env_var(key)
        .map(|v| {
            v.parse()
                .map_err(|_| Error::BadRequest(format!("invalid value for {ENV_PREFIX}{key}: {v}")))
        })
        .transpose()
}
