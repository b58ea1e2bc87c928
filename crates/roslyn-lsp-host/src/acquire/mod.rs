//! Acquisition of the platform-specific server package.
//!
//! Packages are NuGet archives downloaded from a flat-container feed and
//! unpacked under the cache directory:
//!
//! ```text
//! <cache>/downloads/<id>.<version>.nupkg
//! <cache>/servers/<Package.Id>/<version>/Microsoft.CodeAnalysis.LanguageServer[.exe|.dll]
//! ```
//!
//! A populated install directory short-circuits every network and
//! extraction step.

mod archive;
mod fetch;

use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use roslyn_lsp_config::Config;
use tracing::{debug, info, warn};

pub use archive::ServerArtifact;
pub use fetch::{FetchError, HttpFetcher, PackageFetcher};

use crate::errors::{AcquisitionStage, SupervisorError};
use crate::platform::Platform;

/// Log target for acquisition.
pub(crate) const ACQUIRE_TARGET: &str = "roslyn_lsp_host::acquire";

/// Identity and cache layout of one server package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    platform_key: &'static str,
    package_id: String,
    version: String,
    cache_dir: Utf8PathBuf,
}

impl PackageDescriptor {
    /// Resolves the package for `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnsupportedPlatform`] for platforms without
    /// a published package.
    pub fn resolve(
        platform: &Platform,
        version: &str,
        cache_dir: &Utf8Path,
    ) -> Result<Self, SupervisorError> {
        let platform_key = platform.package_key()?;
        Ok(Self {
            platform_key,
            package_id: platform.package_id()?,
            version: version.to_owned(),
            cache_dir: cache_dir.to_owned(),
        })
    }

    /// Platform key, e.g. `linux-x64`.
    #[must_use]
    pub const fn platform_key(&self) -> &'static str {
        self.platform_key
    }

    /// NuGet package id.
    #[must_use]
    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    /// Package version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Directory the package is unpacked into.
    #[must_use]
    pub fn install_dir(&self) -> Utf8PathBuf {
        self.cache_dir
            .join("servers")
            .join(&self.package_id)
            .join(&self.version)
    }

    /// Directory holding downloaded archives.
    #[must_use]
    pub fn downloads_dir(&self) -> Utf8PathBuf {
        self.cache_dir.join("downloads")
    }

    /// Local path of the downloaded archive.
    #[must_use]
    pub fn archive_path(&self) -> Utf8PathBuf {
        self.downloads_dir().join(self.archive_name())
    }

    /// Flat-container URL of the archive below `source`.
    #[must_use]
    pub fn download_url(&self, source: &str) -> String {
        let id = self.package_id.to_lowercase();
        format!(
            "{}/{id}/{version}/{name}",
            source.trim_end_matches('/'),
            version = self.version.to_lowercase(),
            name = self.archive_name(),
        )
    }

    fn archive_name(&self) -> String {
        format!(
            "{}.{}.nupkg",
            self.package_id.to_lowercase(),
            self.version.to_lowercase()
        )
    }
}

/// Ensures the server binary for a platform is present in the cache.
#[derive(Debug, Clone)]
pub struct BinaryAcquirer<F = HttpFetcher> {
    fetcher: F,
    source: String,
    version: String,
    cache_dir: Utf8PathBuf,
}

impl BinaryAcquirer<HttpFetcher> {
    /// Builds an HTTP-backed acquirer from the configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            HttpFetcher::new(),
            config.package_source(),
            config.package_version(),
            config.cache_dir(),
        )
    }
}

impl<F: PackageFetcher> BinaryAcquirer<F> {
    /// Builds an acquirer around an arbitrary fetcher.
    pub fn new(
        fetcher: F,
        source: impl Into<String>,
        version: impl Into<String>,
        cache_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            source: source.into(),
            version: version.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Returns the installed server, downloading and unpacking it when absent.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnsupportedPlatform`] before any I/O when
    /// the platform has no package, and [`SupervisorError::Acquisition`] when
    /// the download, extraction, or binary lookup fails.
    pub fn ensure_binary(&self, platform: &Platform) -> Result<ServerArtifact, SupervisorError> {
        let descriptor = PackageDescriptor::resolve(platform, &self.version, &self.cache_dir)?;
        let install_dir = descriptor.install_dir().into_std_path_buf();
        let windows = platform.is_windows();

        if let Some(artifact) = archive::installed_artifact(&install_dir, windows) {
            debug!(
                target: ACQUIRE_TARGET,
                path = %artifact.path().display(),
                "language server already installed"
            );
            return Ok(artifact);
        }

        info!(
            target: ACQUIRE_TARGET,
            package = descriptor.package_id(),
            version = descriptor.version(),
            "installing language server"
        );
        let archive_path = self.download(&descriptor)?;
        unpack(&archive_path, &install_dir, windows)
    }

    fn download(&self, descriptor: &PackageDescriptor) -> Result<PathBuf, SupervisorError> {
        let archive_path = descriptor.archive_path().into_std_path_buf();
        if file_len(&archive_path) > 0 {
            debug!(
                target: ACQUIRE_TARGET,
                path = %archive_path.display(),
                "reusing downloaded package"
            );
            return Ok(archive_path);
        }

        let downloads = descriptor.downloads_dir();
        fs::create_dir_all(&downloads).map_err(|error| {
            SupervisorError::acquisition_caused_by(
                AcquisitionStage::Cache,
                format!("cannot create '{downloads}'"),
                error,
            )
        })?;

        let url = descriptor.download_url(&self.source);
        let partial = sibling(&archive_path, ".part");
        info!(target: ACQUIRE_TARGET, url = %url, "downloading language server package");
        let written = self.fetcher.fetch(&url, &partial).map_err(|error| {
            discard(&partial);
            SupervisorError::acquisition_caused_by(
                AcquisitionStage::Download,
                format!("cannot download '{url}'"),
                error,
            )
        })?;
        if written == 0 || file_len(&partial) == 0 {
            discard(&partial);
            return Err(SupervisorError::acquisition(
                AcquisitionStage::Download,
                format!("'{url}' returned an empty package"),
            ));
        }

        fs::rename(&partial, &archive_path).map_err(|error| {
            SupervisorError::acquisition_caused_by(
                AcquisitionStage::Download,
                format!("cannot finalise '{}'", archive_path.display()),
                error,
            )
        })?;
        Ok(archive_path)
    }
}

/// Unpacks the archive and moves the server files to the install root.
fn unpack(
    archive: &Path,
    install_dir: &Path,
    windows: bool,
) -> Result<ServerArtifact, SupervisorError> {
    let staging = sibling(install_dir, ".extracting");
    if staging.exists() {
        discard_dir(&staging);
    }

    match archive::extract(archive, &staging) {
        Ok(()) => {}
        Err(archive::ExtractError::Corrupt(error)) => {
            warn!(
                target: ACQUIRE_TARGET,
                path = %archive.display(),
                error = %error,
                "evicting corrupt package"
            );
            discard(archive);
            discard_dir(&staging);
            return Err(SupervisorError::acquisition_caused_by(
                AcquisitionStage::Extract,
                format!("'{}' is not a valid package", archive.display()),
                error,
            ));
        }
        Err(archive::ExtractError::Io(error)) => {
            discard_dir(&staging);
            return Err(SupervisorError::acquisition_caused_by(
                AcquisitionStage::Extract,
                format!("cannot unpack into '{}'", staging.display()),
                error,
            ));
        }
    }

    let located = archive::find_server_dir(&staging, windows)
        .map_err(|error| extract_io(&staging, error))?;
    let Some(server_dir) = located else {
        discard_dir(&staging);
        return Err(SupervisorError::acquisition(
            AcquisitionStage::Locate,
            format!(
                "package '{}' does not contain {}",
                archive.display(),
                archive::SERVER_BASENAME
            ),
        ));
    };

    if install_dir.exists() {
        discard_dir(install_dir);
    }
    if server_dir == staging {
        fs::rename(&staging, install_dir).map_err(|error| extract_io(install_dir, error))?;
    } else {
        archive::hoist(&server_dir, install_dir).map_err(|error| extract_io(install_dir, error))?;
        discard_dir(&staging);
    }

    let artifact = archive::installed_artifact(install_dir, windows).ok_or_else(|| {
        SupervisorError::acquisition(
            AcquisitionStage::Locate,
            format!("no server binary in '{}'", install_dir.display()),
        )
    })?;
    if let ServerArtifact::Native(path) = &artifact {
        archive::mark_executable(path).map_err(|error| extract_io(path, error))?;
    }
    info!(
        target: ACQUIRE_TARGET,
        path = %artifact.path().display(),
        "language server installed"
    );
    Ok(artifact)
}

fn extract_io(path: &Path, error: std::io::Error) -> SupervisorError {
    SupervisorError::acquisition_caused_by(
        AcquisitionStage::Extract,
        format!("filesystem error at '{}'", path.display()),
        error,
    )
}

/// Appends `suffix` to the final component of `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map_or(0, |metadata| metadata.len())
}

fn discard(path: &Path) {
    log_removal(path, fs::remove_file(path));
}

fn discard_dir(path: &Path) {
    log_removal(path, fs::remove_dir_all(path));
}

fn log_removal(path: &Path, outcome: std::io::Result<()>) {
    match outcome {
        Err(error) if error.kind() != std::io::ErrorKind::NotFound => debug!(
            target: ACQUIRE_TARGET,
            path = %path.display(),
            error = %error,
            "failed to remove stale download artefact"
        ),
        _ => {}
    }
}
