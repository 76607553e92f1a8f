//! Plugin lifecycle operations: scaffold, install, uninstall, check,
//! info, and list.
//!
//! All operations go through one [`Installer`], which owns the plugins
//! root and the telemetry sink. Filesystem mutation is confined to
//! `install`, `uninstall`, and `scaffold`; the rest only read.

mod check;
mod info;
mod install;
mod scaffold;
mod uninstall;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use trellis_telemetry::{EventRecord, NullSink, TelemetrySink};

use crate::error::{PluginError, PluginResult};

pub use check::CheckReport;
pub use info::PluginInfo;
pub use install::InstallOptions;

/// Names a scaffolded plugin may not take: the host's own commands.
pub const RESERVED_NAMES: [&str; 8] = [
    "plugins",
    "scaffold",
    "install",
    "uninstall",
    "check",
    "info",
    "list",
    "help",
];

/// Runs plugin lifecycle operations against one plugins root.
pub struct Installer {
    plugins_dir: PathBuf,
    sink: Arc<dyn TelemetrySink>,
}

impl Installer {
    /// Installer over the given plugins root, reporting to a sink.
    #[must_use]
    pub fn new(plugins_dir: impl Into<PathBuf>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            sink,
        }
    }

    /// Installer without telemetry.
    #[must_use]
    pub fn quiet(plugins_dir: impl Into<PathBuf>) -> Self {
        Self::new(plugins_dir, Arc::new(NullSink))
    }

    /// The plugins root this installer operates on.
    #[must_use]
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub(crate) fn emit(&self, event: EventRecord) {
        self.sink.emit(event);
    }
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("plugins_dir", &self.plugins_dir)
            .finish_non_exhaustive()
    }
}

/// Map an I/O error to `PermissionDenied` when that is what it is.
pub(crate) fn map_io(path: &Path, e: std::io::Error) -> PluginError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        PluginError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        PluginError::Io(e)
    }
}

/// Recursively copy a directory tree.
///
/// Symlinks inside the tree are skipped; `skip_hidden` additionally
/// skips dot-file entries at every level. Regular-file permissions are
/// preserved by `fs::copy`.
pub(crate) fn copy_dir(src: &Path, dest: &Path, skip_hidden: bool) -> PluginResult<()> {
    std::fs::create_dir_all(dest).map_err(|e| map_io(dest, e))?;
    for entry in std::fs::read_dir(src).map_err(|e| map_io(src, e))? {
        let entry = entry.map_err(|e| map_io(src, e))?;
        let name = entry.file_name();
        if skip_hidden && name.to_string_lossy().starts_with('.') {
            continue;
        }
        let from = entry.path();
        let to = dest.join(&name);
        let file_type = entry.file_type().map_err(|e| map_io(&from, e))?;
        if file_type.is_symlink() {
            tracing::warn!(path = %from.display(), "Skipping symlink during copy");
        } else if file_type.is_dir() {
            copy_dir(&from, &to, skip_hidden)?;
        } else {
            std::fs::copy(&from, &to).map_err(|e| map_io(&from, e))?;
        }
    }
    Ok(())
}
