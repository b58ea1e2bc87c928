//! Host platform identification.

use std::fmt;

use crate::errors::SupervisorError;

/// Package id prefix shared by every platform build of the server.
pub const PACKAGE_PREFIX: &str = "Microsoft.CodeAnalysis.LanguageServer";

/// Operating system and architecture pair of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    os: String,
    arch: String,
    musl: bool,
}

impl Platform {
    /// Describes an arbitrary platform, as reported by [`std::env::consts`].
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            musl: false,
        }
    }

    /// Marks the platform as using the musl C library.
    #[must_use]
    pub const fn with_musl(mut self, musl: bool) -> Self {
        self.musl = musl;
        self
    }

    /// Describes the platform this process runs on.
    #[must_use]
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
            .with_musl(cfg!(target_env = "musl"))
    }

    /// Maps the platform to its package key, e.g. `linux-x64`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnsupportedPlatform`] when no package is
    /// published for the platform.
    pub fn package_key(&self) -> Result<&'static str, SupervisorError> {
        let key = match (self.os.as_str(), self.arch.as_str(), self.musl) {
            ("windows", "x86_64", _) => "win-x64",
            ("windows", "aarch64", _) => "win-arm64",
            ("macos", "x86_64", _) => "osx-x64",
            ("macos", "aarch64", _) => "osx-arm64",
            ("linux", "x86_64", false) => "linux-x64",
            ("linux", "aarch64", false) => "linux-arm64",
            ("linux", "x86_64", true) => "linux-musl-x64",
            ("linux", "aarch64", true) => "linux-musl-arm64",
            _ => {
                return Err(SupervisorError::UnsupportedPlatform {
                    platform: self.to_string(),
                });
            }
        };
        Ok(key)
    }

    /// Returns the NuGet package id for the platform.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnsupportedPlatform`] as for
    /// [`Platform::package_key`].
    pub fn package_id(&self) -> Result<String, SupervisorError> {
        self.package_key()
            .map(|key| format!("{PACKAGE_PREFIX}.{key}"))
    }

    /// Whether executables on this platform carry an `.exe` suffix.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}-{}", self.os, self.arch)?;
        if self.musl {
            formatter.write_str("-musl")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("windows", "x86_64", false, "win-x64")]
    #[case("windows", "aarch64", false, "win-arm64")]
    #[case("macos", "x86_64", false, "osx-x64")]
    #[case("macos", "aarch64", false, "osx-arm64")]
    #[case("linux", "x86_64", false, "linux-x64")]
    #[case("linux", "aarch64", false, "linux-arm64")]
    #[case("linux", "x86_64", true, "linux-musl-x64")]
    #[case("linux", "aarch64", true, "linux-musl-arm64")]
    fn maps_supported_platforms(
        #[case] os: &str,
        #[case] arch: &str,
        #[case] musl: bool,
        #[case] key: &str,
    ) {
        let platform = Platform::new(os, arch).with_musl(musl);

        assert_eq!(platform.package_key().expect("supported"), key);
        assert_eq!(
            platform.package_id().expect("supported"),
            format!("Microsoft.CodeAnalysis.LanguageServer.{key}")
        );
    }

    #[rstest]
    #[case("freebsd", "x86_64")]
    #[case("linux", "riscv64")]
    #[case("windows", "x86")]
    #[case("macos", "powerpc")]
    fn rejects_unsupported_platforms(#[case] os: &str, #[case] arch: &str) {
        let error = Platform::new(os, arch)
            .package_key()
            .expect_err("should be unsupported");

        assert!(matches!(
            error,
            SupervisorError::UnsupportedPlatform { ref platform } if platform == &format!("{os}-{arch}")
        ));
    }
}
