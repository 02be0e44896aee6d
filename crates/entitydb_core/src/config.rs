//! Engine configuration.
//!
//! Every field spec §6 lists under "Configuration surface" is represented.
//! `port`/`ssl_port`/`use_ssl` are accepted as an opaque pass-through value
//! so an embedding HTTP layer can round-trip its settings through the same
//! `Config` the engine loads, without this crate depending on an HTTP
//! stack or ever binding a socket itself.

use std::path::PathBuf;
use std::time::Duration;

/// Default database file name within `data_path`.
pub const DEFAULT_DATABASE_FILENAME: &str = "entities.edb";

/// Opaque HTTP-layer settings, round-tripped but never interpreted here.
#[derive(Debug, Clone, Default)]
pub struct HttpConfig {
    /// Plaintext HTTP port.
    pub port: u16,
    /// TLS port.
    pub ssl_port: u16,
    /// Whether the HTTP layer should terminate TLS.
    pub use_ssl: bool,
}

/// Engine configuration (spec §6 "Configuration surface").
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the database file(s).
    pub data_path: PathBuf,
    /// File name of the unified `.edb` file within `data_path`.
    pub database_filename: String,
    /// WAL byte-size threshold that triggers a checkpoint.
    pub wal_size_threshold: u64,
    /// Maximum number of decoded entities held in the LRU cache.
    pub cache_capacity: usize,
    /// Optional TTL for cache entries; `None` disables time-based eviction.
    pub cache_ttl: Option<Duration>,
    /// Diagnostic verbosity for the engine's own `tracing` event stream.
    ///
    /// This is accepted for round-tripping only: turning it into an actual
    /// `tracing_subscriber` filter is the embedding application's job, in
    /// keeping with the engine never installing global state.
    pub log_level: LogLevel,
    /// Opaque HTTP-layer settings, forwarded from the caller.
    pub http: Option<HttpConfig>,
}

/// Diagnostic verbosity levels the engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Errors and warnings.
    Warn,
    /// Normal operational detail.
    #[default]
    Info,
    /// Verbose tracing of WAL replay, checkpoints, cache activity.
    Debug,
    /// Everything, including per-record detail.
    Trace,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("."),
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            wal_size_threshold: 64 * 1024 * 1024,
            cache_capacity: 10_000,
            cache_ttl: None,
            log_level: LogLevel::Info,
            http: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data directory.
    #[must_use]
    pub fn data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    /// Sets the database file name.
    #[must_use]
    pub fn database_filename(mut self, name: impl Into<String>) -> Self {
        self.database_filename = name.into();
        self
    }

    /// Sets the WAL checkpoint threshold, in bytes.
    #[must_use]
    pub const fn wal_size_threshold(mut self, bytes: u64) -> Self {
        self.wal_size_threshold = bytes;
        self
    }

    /// Sets the cache capacity (entity count).
    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the cache TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the diagnostic log level.
    #[must_use]
    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Sets the pass-through HTTP configuration.
    #[must_use]
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = Some(http);
        self
    }

    /// Full path to the unified `.edb` file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_path.join(&self.database_filename)
    }
}
