//! Shared configuration for the Roslyn language server supervisor.
#![deny(missing_docs)]
//!
//! All tunables are read once from `ROSLYN_LSP_*` environment variables into
//! an immutable [`Config`] value that callers pass by reference to every
//! component. Every variable is optional; unset variables fall back to the
//! defaults exported from this crate. Malformed values fail fast with a
//! [`ConfigError`] naming the offending variable.

mod defaults;
mod error;
mod logging;

use std::ffi::OsString;
use std::str::FromStr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

pub use defaults::{
    DEFAULT_FIRST_REQUEST_GRACE, DEFAULT_LOG_FILTER, DEFAULT_PACKAGE_SOURCE,
    DEFAULT_PACKAGE_VERSION, DEFAULT_REQUEST_TIMEOUT, DEFAULT_WARMUP_TIMEOUT, default_cache_dir,
    default_log_filter, default_log_filter_string, default_log_format, default_server_log_level,
};
pub use error::ConfigError;
pub use logging::{LogFormat, LogFormatParseError, ServerLogLevel};

/// Environment variable names recognised by [`Config::from_env`].
pub mod env_keys {
    /// Server package version.
    pub const PACKAGE_VERSION: &str = "ROSLYN_LSP_PACKAGE_VERSION";
    /// Base URL of the NuGet flat-container feed.
    pub const PACKAGE_SOURCE: &str = "ROSLYN_LSP_PACKAGE_SOURCE";
    /// Directory holding downloads, extracted servers and server logs.
    pub const CACHE_DIR: &str = "ROSLYN_LSP_CACHE_DIR";
    /// Enables the design-time build before launch.
    pub const WARMUP: &str = "ROSLYN_LSP_WARMUP";
    /// Design-time build timeout in seconds.
    pub const WARMUP_TIMEOUT_SECS: &str = "ROSLYN_LSP_WARMUP_TIMEOUT_SECS";
    /// Extended timeout window after a (re)start, in seconds.
    pub const FIRST_REQUEST_GRACE_SECS: &str = "ROSLYN_LSP_FIRST_REQUEST_GRACE_SECS";
    /// Timeout for requests that do not carry their own, in seconds.
    pub const REQUEST_TIMEOUT_SECS: &str = "ROSLYN_LSP_REQUEST_TIMEOUT_SECS";
    /// Enables the automatic restart-and-retry protocol.
    pub const RETRY_ON_SIGNATURE: &str = "ROSLYN_LSP_RETRY_ON_SIGNATURE";
    /// Verbosity requested from the language server.
    pub const SERVER_LOG_LEVEL: &str = "ROSLYN_LSP_SERVER_LOG_LEVEL";
    /// Tracing filter expression for the supervisor's own logs.
    pub const LOG_FILTER: &str = "ROSLYN_LSP_LOG_FILTER";
    /// Output format for the supervisor's own logs.
    pub const LOG_FORMAT: &str = "ROSLYN_LSP_LOG_FORMAT";
}

/// Immutable supervisor configuration.
///
/// | Field                 | Default                        |
/// | --------------------- | ------------------------------ |
/// | `package_version`     | [`DEFAULT_PACKAGE_VERSION`]     |
/// | `package_source`      | [`DEFAULT_PACKAGE_SOURCE`]      |
/// | `cache_dir`           | [`default_cache_dir`]           |
/// | `warmup_enabled`      | `true`                          |
/// | `warmup_timeout`      | [`DEFAULT_WARMUP_TIMEOUT`]      |
/// | `first_request_grace` | [`DEFAULT_FIRST_REQUEST_GRACE`] |
/// | `request_timeout`     | [`DEFAULT_REQUEST_TIMEOUT`]     |
/// | `retry_on_signature`  | `true`                          |
/// | `server_log_level`    | `Information`                   |
/// | `log_filter`          | [`DEFAULT_LOG_FILTER`]          |
/// | `log_format`          | `compact`                       |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    package_version: String,
    package_source: String,
    cache_dir: Utf8PathBuf,
    warmup_enabled: bool,
    warmup_timeout: Duration,
    first_request_grace: Duration,
    request_timeout: Duration,
    retry_on_signature: bool,
    server_log_level: ServerLogLevel,
    log_filter: String,
    log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            package_version: DEFAULT_PACKAGE_VERSION.to_owned(),
            package_source: DEFAULT_PACKAGE_SOURCE.to_owned(),
            cache_dir: default_cache_dir(),
            warmup_enabled: true,
            warmup_timeout: DEFAULT_WARMUP_TIMEOUT,
            first_request_grace: DEFAULT_FIRST_REQUEST_GRACE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_on_signature: true,
            server_log_level: default_server_log_level(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set to a value that cannot
    /// be interpreted.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Loads configuration using `lookup` to resolve variable names.
    ///
    /// Unset and empty variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set to a value that cannot
    /// be interpreted.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let source = Lookup(lookup);
        let mut config = Self::default();

        if let Some(value) = source.text(env_keys::PACKAGE_VERSION)? {
            config.package_version = value;
        }
        if let Some(value) = source.text(env_keys::PACKAGE_SOURCE)? {
            config.package_source = value.trim_end_matches('/').to_owned();
        }
        if let Some(value) = source.text(env_keys::CACHE_DIR)? {
            config.cache_dir = Utf8PathBuf::from(value);
        }
        if let Some(value) = source.flag(env_keys::WARMUP)? {
            config.warmup_enabled = value;
        }
        if let Some(value) = source.seconds(env_keys::WARMUP_TIMEOUT_SECS)? {
            config.warmup_timeout = value;
        }
        if let Some(value) = source.seconds(env_keys::FIRST_REQUEST_GRACE_SECS)? {
            config.first_request_grace = value;
        }
        if let Some(value) = source.seconds(env_keys::REQUEST_TIMEOUT_SECS)? {
            config.request_timeout = value;
        }
        if let Some(value) = source.flag(env_keys::RETRY_ON_SIGNATURE)? {
            config.retry_on_signature = value;
        }
        if let Some(value) = source.parsed(env_keys::SERVER_LOG_LEVEL)? {
            config.server_log_level = value;
        }
        if let Some(value) = source.text(env_keys::LOG_FILTER)? {
            config.log_filter = value;
        }
        if let Some(value) = source.parsed(env_keys::LOG_FORMAT)? {
            config.log_format = value;
        }

        Ok(config)
    }

    /// Version of the server package to acquire.
    #[must_use]
    pub fn package_version(&self) -> &str {
        self.package_version.as_str()
    }

    /// Base URL of the package feed, without a trailing slash.
    #[must_use]
    pub fn package_source(&self) -> &str {
        self.package_source.as_str()
    }

    /// Directory holding downloads, extracted servers and logs.
    #[must_use]
    pub fn cache_dir(&self) -> &Utf8Path {
        self.cache_dir.as_path()
    }

    /// Whether the design-time build runs before each launch.
    #[must_use]
    pub const fn warmup_enabled(&self) -> bool {
        self.warmup_enabled
    }

    /// Upper bound for the design-time build.
    #[must_use]
    pub const fn warmup_timeout(&self) -> Duration {
        self.warmup_timeout
    }

    /// Extended timeout window opened on every (re)start.
    #[must_use]
    pub const fn first_request_grace(&self) -> Duration {
        self.first_request_grace
    }

    /// Timeout applied to requests that do not carry their own.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Whether a recognised failure signature triggers a restart-and-retry.
    #[must_use]
    pub const fn retry_on_signature(&self) -> bool {
        self.retry_on_signature
    }

    /// Verbosity requested from the language server.
    #[must_use]
    pub const fn server_log_level(&self) -> ServerLogLevel {
        self.server_log_level
    }

    /// Tracing filter expression for the supervisor's logs.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format for the supervisor's logs.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Replaces the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Enables or disables the design-time build.
    #[must_use]
    pub const fn with_warmup(mut self, enabled: bool, timeout: Duration) -> Self {
        self.warmup_enabled = enabled;
        self.warmup_timeout = timeout;
        self
    }

    /// Replaces the first-request grace period.
    #[must_use]
    pub const fn with_first_request_grace(mut self, grace: Duration) -> Self {
        self.first_request_grace = grace;
        self
    }

    /// Replaces the default request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables or disables the automatic restart-and-retry protocol.
    #[must_use]
    pub const fn with_retry_on_signature(mut self, enabled: bool) -> Self {
        self.retry_on_signature = enabled;
        self
    }
}

/// Typed accessors over a variable lookup function.
struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<OsString>,
{
    fn text(&self, key: &'static str) -> Result<Option<String>, ConfigError> {
        let Some(raw) = (self.0)(key) else {
            return Ok(None);
        };
        let value = raw
            .into_string()
            .map_err(|_| ConfigError::NotUnicode { key })?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(trimmed.to_owned()))
    }

    fn flag(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        let Some(value) = self.text(key)? else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::invalid(key, value, "expected a boolean")),
        }
    }

    fn seconds(&self, key: &'static str) -> Result<Option<Duration>, ConfigError> {
        let Some(value) = self.text(key)? else {
            return Ok(None);
        };
        value
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ConfigError::invalid(key, value, "expected a whole number of seconds"))
    }

    fn parsed<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.text(key)? else {
            return Ok(None);
        };
        T::from_str(&value)
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, value, "unrecognised value"))
    }
}
