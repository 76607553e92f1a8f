//! `plugins uninstall`: remove installed plugin directories.

use std::path::PathBuf;

use tracing::{info, warn};

use trellis_telemetry::EventRecord;

use crate::error::{PluginError, PluginResult};
use crate::paths::{matching_dirs, refuse_symlinked_root};
use crate::registry::PluginRegistry;

use super::{map_io, Installer};

impl Installer {
    /// Remove every installed directory of the named plugin.
    ///
    /// All `<name>` and `<name>-*` directories are removed best-effort:
    /// once the first removal succeeds, failures on the remaining
    /// directories are logged and swallowed. When a registry is
    /// supplied the plugin is deregistered from it as well.
    ///
    /// Returns the directories that were removed.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SymlinkRefused`] for a symlinked plugins
    /// root and [`PluginError::NotInstalled`] when no directory matches
    /// the name.
    pub fn uninstall(
        &self,
        name: &str,
        registry: Option<&PluginRegistry>,
    ) -> PluginResult<Vec<PathBuf>> {
        refuse_symlinked_root(self.plugins_dir())?;

        let dirs = matching_dirs(self.plugins_dir(), name)?;
        if dirs.is_empty() {
            return Err(PluginError::NotInstalled(name.to_string()));
        }

        let mut removed = Vec::new();
        let mut first_error = None;
        for dir in dirs {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => removed.push(dir),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to remove plugin directory");
                    if first_error.is_none() {
                        first_error = Some(map_io(&dir, e));
                    }
                }
            }
        }
        if removed.is_empty() {
            if let Some(error) = first_error {
                return Err(error);
            }
        }

        if let Some(registry) = registry {
            registry.deregister(name);
        }

        info!(plugin = %name, count = removed.len(), "Uninstalled plugin");
        self.emit(
            EventRecord::new("plugin_uninstalled")
                .with_field("plugin", name)
                .with_field("removed", removed.len()),
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::HostPlugin;
    use std::sync::Arc;
    use tempfile::TempDir;
    use trellis_telemetry::RecordingSink;

    struct Named(&'static str);
    impl HostPlugin for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn removes_every_matching_directory() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("greeter")).unwrap();
        std::fs::create_dir(root.path().join("greeter-11112222")).unwrap();
        std::fs::write(root.path().join("greeter-11112222/plugin.run"), "").unwrap();
        std::fs::create_dir(root.path().join("greeter-tool")).unwrap();
        std::fs::create_dir(root.path().join("other")).unwrap();

        let sink = Arc::new(RecordingSink::new());
        let removed = Installer::new(root.path(), sink.clone())
            .uninstall("greeter", None)
            .unwrap();

        assert_eq!(removed.len(), 3);
        assert!(!root.path().join("greeter").exists());
        assert!(!root.path().join("greeter-11112222").exists());
        assert!(root.path().join("other").exists());
        assert_eq!(sink.event_names(), vec!["plugin_uninstalled"]);
    }

    #[test]
    fn unknown_plugin_is_not_installed() {
        let root = TempDir::new().unwrap();
        let err = Installer::quiet(root.path())
            .uninstall("ghost", None)
            .unwrap_err();
        assert!(matches!(err, PluginError::NotInstalled(_)));
    }

    #[test]
    fn plain_file_does_not_count_as_installed() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("greeter"), "not a dir").unwrap();

        let err = Installer::quiet(root.path())
            .uninstall("greeter", None)
            .unwrap_err();
        assert!(matches!(err, PluginError::NotInstalled(_)));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_root_is_refused() {
        let real = TempDir::new().unwrap();
        let holder = TempDir::new().unwrap();
        let link = holder.path().join("plugins");
        std::os::unix::fs::symlink(real.path(), &link).unwrap();

        let err = Installer::quiet(&link).uninstall("greeter", None).unwrap_err();
        assert!(matches!(err, PluginError::SymlinkRefused { .. }));
    }

    #[test]
    fn deregisters_from_a_supplied_registry() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("greeter-aaaa0000")).unwrap();

        let registry = PluginRegistry::new();
        registry.register(Arc::new(Named("greeter"))).unwrap();

        Installer::quiet(root.path())
            .uninstall("greeter", Some(&registry))
            .unwrap();
        assert!(!registry.has("greeter"));

        // A second uninstall errors on the filesystem but the registry
        // stays clean.
        assert!(Installer::quiet(root.path())
            .uninstall("greeter", Some(&registry))
            .is_err());
    }
}
