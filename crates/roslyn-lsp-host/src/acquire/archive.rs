//! Package extraction and binary lookup.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::ACQUIRE_TARGET;

/// Base file name of the server executable and assembly.
pub(super) const SERVER_BASENAME: &str = "Microsoft.CodeAnalysis.LanguageServer";

/// Failure to unpack a package.
#[derive(Debug)]
pub(super) enum ExtractError {
    /// The archive is not a readable zip file.
    Corrupt(zip::result::ZipError),
    /// The filesystem rejected a write.
    Io(io::Error),
}

/// Unpacks `archive` into `destination`, which must not exist yet.
pub(super) fn extract(archive: &Path, destination: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive).map_err(ExtractError::Io)?;
    let mut zip = zip::ZipArchive::new(file).map_err(ExtractError::Corrupt)?;
    fs::create_dir_all(destination).map_err(ExtractError::Io)?;
    zip.extract(destination).map_err(|error| match error {
        zip::result::ZipError::Io(io_error) => ExtractError::Io(io_error),
        other => ExtractError::Corrupt(other),
    })
}

/// Installed form of the server binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerArtifact {
    /// Self-contained executable, run directly.
    Native(PathBuf),
    /// Framework-dependent assembly, run through `dotnet`.
    Dll(PathBuf),
}

impl ServerArtifact {
    /// Path of the executable or assembly.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Native(path) | Self::Dll(path) => path,
        }
    }
}

/// Names the server files may carry on a platform, native first.
pub(super) fn candidate_names(windows: bool) -> [String; 2] {
    let native = if windows {
        format!("{SERVER_BASENAME}.exe")
    } else {
        SERVER_BASENAME.to_owned()
    };
    [native, format!("{SERVER_BASENAME}.dll")]
}

/// Checks `root` itself for the server, without descending.
pub(super) fn installed_artifact(root: &Path, windows: bool) -> Option<ServerArtifact> {
    let [native, dll] = candidate_names(windows);
    let native = root.join(native);
    if native.is_file() {
        return Some(ServerArtifact::Native(native));
    }
    let dll = root.join(dll);
    dll.is_file().then_some(ServerArtifact::Dll(dll))
}

/// Finds the shallowest directory below `root` holding a server file.
pub(super) fn find_server_dir(root: &Path, windows: bool) -> io::Result<Option<PathBuf>> {
    let names = candidate_names(windows);
    let mut queue = std::collections::VecDeque::from([root.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        let mut subdirs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                subdirs.push(entry.path());
            } else if names.iter().any(|name| entry.file_name() == name.as_str()) {
                return Ok(Some(dir));
            }
        }
        subdirs.sort();
        queue.extend(subdirs);
    }
    Ok(None)
}

/// Copies the contents of `from` into `to`, recursively.
pub(super) fn hoist(from: &Path, to: &Path) -> io::Result<()> {
    debug!(
        target: ACQUIRE_TARGET,
        from = %from.display(),
        to = %to.display(),
        "hoisting server files to the install root"
    );
    copy_tree(from, to)
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Zip archives from NuGet carry no Unix mode bits.
#[cfg(unix)]
pub(super) fn mark_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
pub(super) fn mark_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
