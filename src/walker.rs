use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use globset::{Glob, GlobMatcher};

use crate::error::{Error, Result};

/// Directory name pattern of a docset bundle.
pub const BUNDLE_PATTERN: &str = "*.docset";

fn bundle_matcher() -> Result<GlobMatcher> {
    Ok(Glob::new(BUNDLE_PATTERN)
        .map_err(|e| Error::Config(format!("invalid bundle pattern: {e}")))?
        .compile_matcher())
}

/// Recursively walk `root` and return every docset bundle directory.
///
/// Bundles may sit at any depth. Matched bundles are not descended into.
/// Hidden entries are skipped, and directory symlinks are followed unless
/// they lead back to a directory already visited. The result is sorted by
/// path.
pub fn discover_bundles(root: &Path) -> Result<Vec<PathBuf>> {
    let matcher = bundle_matcher()?;
    let canonical_root = root.canonicalize()?;
    let mut visited = HashSet::new();
    let mut results = Vec::new();
    walk_dir(&matcher, &canonical_root, &mut visited, &mut results)?;
    results.sort();
    Ok(results)
}

fn walk_dir(
    matcher: &GlobMatcher,
    current: &Path,
    visited: &mut HashSet<PathBuf>,
    results: &mut Vec<PathBuf>,
) -> Result<()> {
    if !visited.insert(current.canonicalize()?) {
        return Ok(());
    }

    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(dir = %current.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        // Skip hidden files and directories.
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        let is_dir = match entry.file_type() {
            Ok(ft) if ft.is_dir() => true,
            // Resolve symlink; broken links are skipped.
            Ok(ft) if ft.is_symlink() => path.is_dir(),
            _ => false,
        };
        if !is_dir {
            continue;
        }

        if matcher.is_match(name.as_ref()) {
            results.push(path);
        } else if let Err(e) = walk_dir(matcher, &path, visited, results) {
            tracing::debug!(dir = %path.display(), error = %e, "skipping unreadable directory");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(bundles: &[PathBuf]) -> Vec<String> {
        bundles
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn discovers_top_level_bundles() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("Go.docset")).unwrap();
        std::fs::create_dir(tmp.path().join("Rust.docset")).unwrap();
        std::fs::create_dir(tmp.path().join("notes")).unwrap();

        let bundles = discover_bundles(tmp.path()).unwrap();
        assert_eq!(names(&bundles), vec!["Go.docset", "Rust.docset"]);
    }

    #[test]
    fn discovers_deeply_nested_bundles() {
        let tmp = tempfile::tempdir().unwrap();
        let deep = tmp.path().join("DocSets").join("Languages").join("Systems");
        std::fs::create_dir_all(deep.join("Go.docset")).unwrap();

        let bundles = discover_bundles(tmp.path()).unwrap();
        assert_eq!(names(&bundles), vec!["Go.docset"]);
    }

    #[test]
    fn ignores_files_named_like_bundles() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Fake.docset"), "not a dir").unwrap();

        assert!(discover_bundles(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn does_not_descend_into_bundles() {
        let tmp = tempfile::tempdir().unwrap();
        let inner = tmp.path().join("Outer.docset").join("Inner.docset");
        std::fs::create_dir_all(inner).unwrap();

        let bundles = discover_bundles(tmp.path()).unwrap();
        assert_eq!(names(&bundles), vec!["Outer.docset"]);
    }

    #[test]
    fn skips_hidden_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".trash").join("Old.docset"))
            .unwrap();

        assert!(discover_bundles(tmp.path()).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinked_directories_without_looping() {
        let tmp = tempfile::tempdir().unwrap();
        let elsewhere = tmp.path().join("elsewhere");
        std::fs::create_dir_all(elsewhere.join("Linked.docset")).unwrap();

        let root = tmp.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&elsewhere, root.join("more")).unwrap();
        std::os::unix::fs::symlink(&root, root.join("loop")).unwrap();

        let bundles = discover_bundles(&root).unwrap();
        assert_eq!(names(&bundles), vec!["Linked.docset"]);
    }

    #[test]
    fn results_are_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["z.docset", "a.docset", "m.docset"] {
            std::fs::create_dir(tmp.path().join(name)).unwrap();
        }

        let bundles = discover_bundles(tmp.path()).unwrap();
        assert_eq!(names(&bundles), vec!["a.docset", "m.docset", "z.docset"]);
    }
}
