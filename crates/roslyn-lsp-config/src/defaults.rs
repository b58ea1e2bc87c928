use std::env;
use std::time::Duration;

use camino::Utf8PathBuf;

use dirs::cache_dir;

use crate::logging::{LogFormat, ServerLogLevel};

/// Server package version fetched when no override is configured.
pub const DEFAULT_PACKAGE_VERSION: &str = "5.0.0-1.25277.114";

/// NuGet flat-container feed hosting the language server packages.
pub const DEFAULT_PACKAGE_SOURCE: &str =
    "https://pkgs.dev.azure.com/azure-public/vside/_packaging/vs-impl/nuget/v3/flat2";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Upper bound for the design-time build run before launch.
pub const DEFAULT_WARMUP_TIMEOUT: Duration = Duration::from_secs(180);

/// Extended timeout granted to requests issued shortly after a (re)start.
pub const DEFAULT_FIRST_REQUEST_GRACE: Duration = Duration::from_secs(120);

/// Timeout applied when callers do not supply one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the directory created under the user cache directory.
const CACHE_NAMESPACE: &str = "roslyn-lsp";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::default()
}

/// Default verbosity requested from the language server.
#[must_use]
pub fn default_server_log_level() -> ServerLogLevel {
    ServerLogLevel::default()
}

/// Computes the default cache directory holding downloads and extracted servers.
///
/// Falls back to the system temporary directory when the platform does not
/// expose a user cache directory or the path is not valid UTF-8.
#[must_use]
pub fn default_cache_dir() -> Utf8PathBuf {
    let mut base = cache_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.push(CACHE_NAMESPACE);
    base
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
