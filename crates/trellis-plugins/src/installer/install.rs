//! `plugins install`: copy a plugin source into the plugins root.

use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info};

use trellis_crypto::ContentHash;
use trellis_telemetry::EventRecord;

use crate::error::{PluginError, PluginResult};
use crate::loader::check_host_requirement;
use crate::manifest::PluginManifest;
use crate::paths::{refuse_symlinked_root, ENTRY_FILE, LOCK_FILE};
use crate::plugin::PluginName;

use super::{copy_dir, map_io, Installer};

/// Length of the hex digest appended to install destinations.
const DEST_SUFFIX_LEN: usize = 8;

/// Knobs for a single install.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Replace an existing installation of the same name and version.
    pub force: bool,
    /// Report the computed destination without touching the filesystem.
    pub dry_run: bool,
}

impl Installer {
    /// Install the plugin at `source` into the plugins root.
    ///
    /// The destination directory is `<name>-<digest>` where the digest
    /// covers the declared version string, an opaque uniqueness token.
    /// The copy goes through a staging directory inside the plugins
    /// root and is renamed into place under an advisory file lock, so
    /// concurrent installs of the same plugin serialize and readers
    /// never see a half-copied tree.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SourceInvalid`] when `source` is not a
    /// directory, [`PluginError::EntryMissing`] when it has no entry
    /// executable, [`PluginError::IncompatibleVersion`] when its
    /// manifest rejects the running host,
    /// [`PluginError::SymlinkRefused`] for a symlinked plugins root or
    /// destination, and [`PluginError::AlreadyInstalled`] for an
    /// occupied destination without `force`.
    pub fn install(&self, source: &Path, options: InstallOptions) -> PluginResult<PathBuf> {
        if !source.is_dir() {
            return Err(PluginError::SourceInvalid(format!(
                "not a directory: {}",
                source.display()
            )));
        }
        let entry = source.join(ENTRY_FILE);
        if !entry.is_file() {
            return Err(PluginError::EntryMissing { path: entry });
        }

        let manifest = PluginManifest::load_from_dir(source)?.map(|(_, m)| m);
        let name = match &manifest {
            Some(m) => PluginName::new(m.name.as_str())?,
            None => PluginName::new(dir_name(source)?)?,
        };
        // The host requirement is gated at install time too, so an
        // incompatible plugin never lands on disk.
        if let Some(m) = &manifest {
            check_host_requirement(m.requires_host_version.as_deref())?;
        }

        let version = manifest
            .as_ref()
            .and_then(|m| m.version.as_deref())
            .unwrap_or("0.0.0");
        let dest_name = format!(
            "{name}-{}",
            ContentHash::hash(version.as_bytes()).short_hex(DEST_SUFFIX_LEN)
        );

        refuse_symlinked_root(self.plugins_dir())?;
        let plugins_dir = self.plugins_dir().to_path_buf();
        let dest = plugins_dir.join(&dest_name);
        check_destination(&dest, options.force)?;

        if options.dry_run {
            debug!(plugin = %name, dest = %dest.display(), "Dry-run install");
            return Ok(dest);
        }

        std::fs::create_dir_all(&plugins_dir).map_err(|e| map_io(&plugins_dir, e))?;
        let lock_path = plugins_dir.join(LOCK_FILE);
        let lock = std::fs::File::create(&lock_path).map_err(|e| map_io(&lock_path, e))?;
        lock.lock_exclusive().map_err(|e| map_io(&lock_path, e))?;

        // Somebody may have won the destination while we waited.
        let result = self.install_locked(source, &dest, options.force);
        let _ = FileExt::unlock(&lock);

        let dest = result?;
        info!(plugin = %name, dest = %dest.display(), "Installed plugin");
        self.emit(
            EventRecord::new("plugin_installed")
                .with_field("plugin", name.as_str())
                .with_field("version", version)
                .with_field("dest", dest.display().to_string()),
        );
        Ok(dest)
    }

    fn install_locked(&self, source: &Path, dest: &Path, force: bool) -> PluginResult<PathBuf> {
        check_destination(dest, force)?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(self.plugins_dir())
            .map_err(|e| map_io(self.plugins_dir(), e))?;
        copy_dir(source, staging.path(), false)?;

        if dest.exists() {
            std::fs::remove_dir_all(dest).map_err(|e| map_io(dest, e))?;
        }
        let staged = staging.keep();
        if let Err(e) = std::fs::rename(&staged, dest) {
            let _ = std::fs::remove_dir_all(&staged);
            return Err(map_io(dest, e));
        }
        Ok(dest.to_path_buf())
    }
}

fn dir_name(source: &Path) -> PluginResult<String> {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            PluginError::SourceInvalid(format!("no usable directory name: {}", source.display()))
        })
}

fn check_destination(dest: &Path, force: bool) -> PluginResult<()> {
    match std::fs::symlink_metadata(dest) {
        Ok(meta) if meta.file_type().is_symlink() => Err(PluginError::SymlinkRefused {
            path: dest.to_path_buf(),
        }),
        Ok(meta) if meta.is_dir() => {
            let empty = std::fs::read_dir(dest)
                .map_err(|e| map_io(dest, e))?
                .next()
                .is_none();
            if empty || force {
                Ok(())
            } else {
                Err(PluginError::AlreadyInstalled {
                    path: dest.to_path_buf(),
                })
            }
        }
        Ok(_) => Err(PluginError::AlreadyInstalled {
            path: dest.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(map_io(dest, e)),
    }
}
