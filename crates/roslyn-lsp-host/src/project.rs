//! Discovery of the solution or project the server should load.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Log target for project discovery.
const PROJECT_TARGET: &str = "roslyn_lsp_host::project";

/// Directory names never searched.
const SKIPPED_DIRS: [&str; 3] = ["bin", "obj", "packages"];

/// Build target opened by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectTarget {
    /// A `.sln` or `.slnx` solution file.
    Solution(PathBuf),
    /// A `.csproj` project file.
    Project(PathBuf),
}

impl ProjectTarget {
    /// Path of the solution or project file.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Solution(path) | Self::Project(path) => path,
        }
    }

    /// Notification announcing the target to the server.
    #[must_use]
    pub const fn open_method(&self) -> &'static str {
        match self {
            Self::Solution(_) => "solution/open",
            Self::Project(_) => "project/open",
        }
    }
}

/// Finds the nearest solution below `root`, else the nearest project.
///
/// The tree is walked breadth first in name order. Hidden entries, files and
/// directories alike, and build output directories are skipped; unreadable
/// directories are ignored.
#[must_use]
pub fn discover(root: &Path) -> Option<ProjectTarget> {
    let mut first_project = None;
    let mut queue = VecDeque::from([root.to_path_buf()]);

    while let Some(dir) = queue.pop_front() {
        let Ok(entries) = fs::read_dir(&dir) else {
            debug!(
                target: PROJECT_TARGET,
                path = %dir.display(),
                "skipping unreadable directory"
            );
            continue;
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect();
        paths.sort();

        for path in paths {
            if is_hidden(&path) {
                continue;
            }
            if path.is_dir() {
                if !is_skipped(&path) {
                    queue.push_back(path);
                }
                continue;
            }
            match extension(&path).as_deref() {
                Some("sln" | "slnx") => return Some(ProjectTarget::Solution(path)),
                Some("csproj") if first_project.is_none() => first_project = Some(path),
                _ => {}
            }
        }
    }

    first_project.map(ProjectTarget::Project)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

fn is_skipped(dir: &Path) -> bool {
    dir.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            SKIPPED_DIRS
                .iter()
                .any(|skipped| name.eq_ignore_ascii_case(skipped))
        })
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn tree() -> TempDir {
        TempDir::new().expect("temp dir")
    }

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        fs::write(&path, "").expect("write file");
        path
    }

    #[rstest]
    fn prefers_solution_over_shallower_project(tree: TempDir) {
        touch(tree.path(), "App.csproj");
        let solution = touch(tree.path(), "build/All.sln");

        assert_eq!(
            discover(tree.path()),
            Some(ProjectTarget::Solution(solution))
        );
    }

    #[rstest]
    fn nearest_solution_wins(tree: TempDir) {
        let shallow = touch(tree.path(), "src/Shallow.slnx");
        touch(tree.path(), "a/b/Deep.sln");

        assert_eq!(discover(tree.path()), Some(ProjectTarget::Solution(shallow)));
    }

    #[rstest]
    fn falls_back_to_nearest_project(tree: TempDir) {
        touch(tree.path(), "src/deep/Lib.csproj");
        let near = touch(tree.path(), "src/App.csproj");

        let target = discover(tree.path()).expect("target");

        assert_eq!(target, ProjectTarget::Project(near));
        assert_eq!(target.open_method(), "project/open");
    }

    #[rstest]
    #[case::hidden(".git/Hidden.sln")]
    #[case::hidden_file(".Backup.csproj")]
    #[case::bin("bin/Debug/Out.sln")]
    #[case::obj("obj/Gen.csproj")]
    #[case::packages("packages/Dep/Dep.csproj")]
    fn skips_ignored_directories(tree: TempDir, #[case] relative: &str) {
        touch(tree.path(), relative);

        assert_eq!(discover(tree.path()), None);
    }

    #[rstest]
    fn hidden_solution_files_are_ignored(tree: TempDir) {
        touch(tree.path(), ".Backup.sln");
        let solution = touch(tree.path(), "src/App.sln");

        assert_eq!(
            discover(tree.path()),
            Some(ProjectTarget::Solution(solution))
        );
    }

    #[rstest]
    fn empty_tree_has_no_target(tree: TempDir) {
        assert_eq!(discover(tree.path()), None);
    }

    #[rstest]
    fn missing_root_has_no_target() {
        assert_eq!(discover(Path::new("/nonexistent/roslyn/workspace")), None);
    }
}
