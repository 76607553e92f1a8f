//! On-disk layout of installed plugins.
//!
//! An installed plugin is one directory under the managed plugins root,
//! named `<name>` or `<name>-<suffix>` where the suffix is an opaque
//! uniqueness token. The directory holds the entry executable and a
//! metadata file.

use std::path::{Path, PathBuf};

use crate::error::{PluginError, PluginResult};

/// File name of a plugin's entry executable.
pub const ENTRY_FILE: &str = "plugin.run";

/// File name of the detached signature over the entry executable.
pub const SIGNATURE_FILE: &str = "plugin.run.sig";

/// File name of the advisory lock serializing installs per plugins root.
pub const LOCK_FILE: &str = ".trellis.lock";

/// Refuse a plugins root that is itself a symlink.
///
/// # Errors
///
/// Returns [`PluginError::SymlinkRefused`] for a symlinked root and
/// [`PluginError::Io`] if the path cannot be inspected.
pub fn refuse_symlinked_root(plugins_dir: &Path) -> PluginResult<()> {
    match std::fs::symlink_metadata(plugins_dir) {
        Ok(meta) if meta.file_type().is_symlink() => Err(PluginError::SymlinkRefused {
            path: plugins_dir.to_path_buf(),
        }),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PluginError::Io(e)),
    }
}

/// Whether a directory name belongs to the given plugin: exactly
/// `<name>` or `<name>-<suffix>`.
#[must_use]
pub fn dir_matches_name(dir_name: &str, plugin_name: &str) -> bool {
    dir_name == plugin_name
        || dir_name
            .strip_prefix(plugin_name)
            .is_some_and(|rest| rest.starts_with('-'))
}

/// All directories under the plugins root that belong to the given
/// plugin name, sorted for determinism.
///
/// Readers take no lock; entries that disappear mid-scan are skipped.
///
/// # Errors
///
/// Returns [`PluginError::Io`] if the root cannot be enumerated (a
/// missing root yields an empty list instead).
pub fn matching_dirs(plugins_dir: &Path, plugin_name: &str) -> PluginResult<Vec<PathBuf>> {
    let read_dir = match std::fs::read_dir(plugins_dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PluginError::Io(e)),
    };

    let mut matches = Vec::new();
    for entry in read_dir.flatten() {
        let file_name = entry.file_name();
        let Some(dir_name) = file_name.to_str() else {
            continue;
        };
        if !dir_matches_name(dir_name, plugin_name) {
            continue;
        }
        if entry.file_type().is_ok_and(|ft| ft.is_dir()) {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches)
}

/// Locate the single installed directory for a plugin name.
///
/// # Errors
///
/// Returns [`PluginError::NotInstalled`] when nothing matches. Multiple
/// matches resolve to the first in sorted order.
pub fn installed_dir(plugins_dir: &Path, plugin_name: &str) -> PluginResult<PathBuf> {
    matching_dirs(plugins_dir, plugin_name)?
        .into_iter()
        .next()
        .ok_or_else(|| PluginError::NotInstalled(plugin_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn name_matching() {
        assert!(dir_matches_name("demo", "demo"));
        assert!(dir_matches_name("demo-abcd1234", "demo"));
        assert!(!dir_matches_name("demo2", "demo"));
        assert!(!dir_matches_name("demonstration", "demo"));
        assert!(!dir_matches_name("other", "demo"));
    }

    #[test]
    fn finds_suffixed_directories() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("demo-11111111")).unwrap();
        std::fs::create_dir(root.path().join("demo-22222222")).unwrap();
        std::fs::create_dir(root.path().join("other")).unwrap();
        // Plain files never match.
        std::fs::write(root.path().join("demo-file"), b"x").unwrap();

        let dirs = matching_dirs(root.path(), "demo").unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].ends_with("demo-11111111"));
    }

    #[test]
    fn missing_root_is_empty() {
        let root = TempDir::new().unwrap();
        let gone = root.path().join("nope");
        assert!(matching_dirs(&gone, "demo").unwrap().is_empty());
        assert!(matches!(
            installed_dir(&gone, "demo").unwrap_err(),
            PluginError::NotInstalled(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_root_is_refused() {
        let outer = TempDir::new().unwrap();
        let real = outer.path().join("real");
        let link = outer.path().join("link");
        std::fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert!(refuse_symlinked_root(&real).is_ok());
        assert!(matches!(
            refuse_symlinked_root(&link).unwrap_err(),
            PluginError::SymlinkRefused { .. }
        ));
    }
}
