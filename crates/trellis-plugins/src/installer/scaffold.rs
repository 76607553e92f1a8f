//! `plugins scaffold`: materialize a new plugin skeleton.

use std::path::{Path, PathBuf};

use tracing::info;

use trellis_crypto::KeyPair;
use trellis_telemetry::EventRecord;

use crate::error::{PluginError, PluginResult};
use crate::loader::signature_path;
use crate::manifest::METADATA_FILES;
use crate::paths::ENTRY_FILE;
use crate::plugin::PluginName;

use super::{copy_dir, map_io, Installer, RESERVED_NAMES};

/// Entry script written when no template is supplied.
const BUILTIN_ENTRY: &str = r#"#!/bin/sh
# Minimal plugin entry. Answers `describe` with the declaration and
# `health` with a boolean; everything else is a no-op.
case "$1" in
  describe)
    printf '{"plugin": '
    cat plugin.json
    printf '}\n'
    ;;
  health)
    echo true
    ;;
  *)
    exit 0
    ;;
esac
"#;

impl Installer {
    /// Create a plugin skeleton named `name` under `output_dir`.
    ///
    /// With a template directory the template tree is copied (dot-files
    /// skipped); without one a built-in minimal skeleton is written.
    /// An existing file, symlink, or empty directory at the target is
    /// replaced; a non-empty directory needs `force`. With `sign_with`
    /// the entry executable gets a detached signature next to it, so
    /// hosts configured with the matching verifying key load the
    /// skeleton without an unsigned warning.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidName`] for a malformed or reserved
    /// name, [`PluginError::AlreadyInstalled`] for a non-empty target
    /// without `force` or a sibling differing only by case,
    /// [`PluginError::SourceInvalid`] for a missing template or one
    /// with no metadata file, and [`PluginError::EntryMissing`] when
    /// the template lacks the entry executable.
    pub fn scaffold(
        &self,
        name: &str,
        output_dir: &Path,
        template: Option<&Path>,
        sign_with: Option<&KeyPair>,
        force: bool,
    ) -> PluginResult<PathBuf> {
        let name = PluginName::new(name)?;
        if RESERVED_NAMES
            .iter()
            .any(|r| r.eq_ignore_ascii_case(name.as_str()))
        {
            return Err(PluginError::InvalidName(format!(
                "{name} is a reserved command name"
            )));
        }

        std::fs::create_dir_all(output_dir).map_err(|e| map_io(output_dir, e))?;
        check_case_collision(output_dir, name.as_str())?;

        let target = output_dir.join(name.as_str());
        clear_target(&target, force)?;

        match template {
            Some(template) => {
                if !template.is_dir() {
                    return Err(PluginError::SourceInvalid(format!(
                        "template is not a directory: {}",
                        template.display()
                    )));
                }
                copy_dir(template, &target, true)?;
                let entry = target.join(ENTRY_FILE);
                if !entry.is_file() {
                    return Err(PluginError::EntryMissing { path: entry });
                }
                if !METADATA_FILES.iter().any(|f| target.join(f).is_file()) {
                    return Err(PluginError::SourceInvalid(format!(
                        "template has no metadata file: {}",
                        template.display()
                    )));
                }
                mark_executable(&entry)?;
            }
            None => write_builtin_template(&target, name.as_str())?,
        }

        if let Some(key) = sign_with {
            sign_entry(&target.join(ENTRY_FILE), key)?;
        }

        info!(plugin = %name, target = %target.display(), "Scaffolded plugin");
        let mut event = EventRecord::new("plugin_scaffolded")
            .with_field("plugin", name.as_str())
            .with_field("target", target.display().to_string());
        if let Some(key) = sign_with {
            event = event.with_field("key", key.key_id_hex());
        }
        self.emit(event);
        Ok(target)
    }
}

/// Refuse a sibling whose name differs only by ASCII case; on
/// case-insensitive filesystems it would silently merge with the target.
fn check_case_collision(output_dir: &Path, name: &str) -> PluginResult<()> {
    for entry in std::fs::read_dir(output_dir).map_err(|e| map_io(output_dir, e))? {
        let entry = entry.map_err(|e| map_io(output_dir, e))?;
        let existing = entry.file_name();
        let existing = existing.to_string_lossy();
        if existing != name && existing.eq_ignore_ascii_case(name) {
            return Err(PluginError::AlreadyInstalled { path: entry.path() });
        }
    }
    Ok(())
}

fn clear_target(target: &Path, force: bool) -> PluginResult<()> {
    let meta = match std::fs::symlink_metadata(target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(map_io(target, e)),
    };

    if meta.file_type().is_dir() {
        let empty = std::fs::read_dir(target)
            .map_err(|e| map_io(target, e))?
            .next()
            .is_none();
        if !empty && !force {
            return Err(PluginError::AlreadyInstalled {
                path: target.to_path_buf(),
            });
        }
        std::fs::remove_dir_all(target).map_err(|e| map_io(target, e))?;
    } else {
        // Plain file or symlink: always replaced.
        std::fs::remove_file(target).map_err(|e| map_io(target, e))?;
    }
    Ok(())
}

fn sign_entry(entry: &Path, key: &KeyPair) -> PluginResult<()> {
    let bytes = std::fs::read(entry).map_err(|e| map_io(entry, e))?;
    let signature = key.sign(&bytes);
    let sig_path = signature_path(entry);
    std::fs::write(&sig_path, signature.to_hex()).map_err(|e| map_io(&sig_path, e))
}

fn write_builtin_template(target: &Path, name: &str) -> PluginResult<()> {
    std::fs::create_dir_all(target).map_err(|e| map_io(target, e))?;

    let manifest = serde_json::json!({
        "name": name,
        "version": "0.1.0",
        "description": format!("The {name} plugin."),
    });
    let manifest_text = serde_json::to_string_pretty(&manifest)
        .map_err(|e| PluginError::ExecutionFailed(e.to_string()))?;
    std::fs::write(target.join("plugin.json"), manifest_text)
        .map_err(|e| map_io(target, e))?;

    let entry = target.join(ENTRY_FILE);
    std::fs::write(&entry, BUILTIN_ENTRY).map_err(|e| map_io(&entry, e))?;
    mark_executable(&entry)
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> PluginResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path).map_err(|e| map_io(path, e))?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms).map_err(|e| map_io(path, e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> PluginResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn installer() -> Installer {
        Installer::quiet("/nonexistent")
    }

    #[test]
    fn builtin_template_produces_a_complete_plugin() {
        let out = TempDir::new().unwrap();
        let target = installer()
            .scaffold("greeter", out.path(), None, None, false)
            .unwrap();

        assert!(target.join(ENTRY_FILE).is_file());
        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(target.join("plugin.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["name"], "greeter");
        assert_eq!(manifest["version"], "0.1.0");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(target.join(ENTRY_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[test]
    fn signed_scaffold_carries_a_verifiable_detached_signature() {
        use trellis_crypto::Signature;

        let out = TempDir::new().unwrap();
        let key = KeyPair::generate();
        let target = installer()
            .scaffold("greeter", out.path(), None, Some(&key), false)
            .unwrap();

        let entry = target.join(ENTRY_FILE);
        let sig_payload = std::fs::read(signature_path(&entry)).unwrap();
        let signature = Signature::parse_detached(&sig_payload).unwrap();
        let entry_bytes = std::fs::read(&entry).unwrap();
        key.export_public_key()
            .verify(&entry_bytes, &signature)
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signed_scaffold_loads_under_a_trusted_key() {
        use std::sync::Arc;
        use crate::plugin::HostPlugin;
        use trellis_telemetry::RecordingSink;

        let out = TempDir::new().unwrap();
        let key = KeyPair::generate();
        let target = installer()
            .scaffold("greeter", out.path(), None, Some(&key), false)
            .unwrap();

        let sink = Arc::new(RecordingSink::new());
        let loader = crate::loader::PluginLoader::new(sink.clone())
            .with_trusted_key(key.export_public_key());
        let plugin = loader.load_dir(&target).await.unwrap();
        assert_eq!(plugin.name(), "greeter");
        assert_eq!(sink.event_names(), vec!["plugin_loaded"]);
    }

    #[test]
    fn unsigned_scaffold_writes_no_signature_file() {
        let out = TempDir::new().unwrap();
        let target = installer()
            .scaffold("greeter", out.path(), None, None, false)
            .unwrap();
        assert!(!signature_path(&target.join(ENTRY_FILE)).exists());
    }

    #[test]
    fn reserved_and_malformed_names_are_rejected() {
        let out = TempDir::new().unwrap();
        let inst = installer();

        let err = inst.scaffold("install", out.path(), None, None, false).unwrap_err();
        assert!(matches!(err, PluginError::InvalidName(_)));

        let err = inst.scaffold("Uninstall", out.path(), None, None, false).unwrap_err();
        assert!(matches!(err, PluginError::InvalidName(_)));

        let err = inst.scaffold("bad name", out.path(), None, None, false).unwrap_err();
        assert!(matches!(err, PluginError::InvalidName(_)));
    }

    #[test]
    fn sibling_differing_only_by_case_collides() {
        let out = TempDir::new().unwrap();
        std::fs::create_dir(out.path().join("Greeter")).unwrap();

        let err = installer()
            .scaffold("greeter", out.path(), None, None, false)
            .unwrap_err();
        assert!(matches!(err, PluginError::AlreadyInstalled { .. }));
    }

    #[test]
    fn nonempty_target_needs_force() {
        let out = TempDir::new().unwrap();
        let inst = installer();
        inst.scaffold("greeter", out.path(), None, None, false).unwrap();

        let err = inst.scaffold("greeter", out.path(), None, None, false).unwrap_err();
        assert!(matches!(err, PluginError::AlreadyInstalled { .. }));

        // Force replaces, leaving a fresh skeleton.
        let target = inst.scaffold("greeter", out.path(), None, None, true).unwrap();
        assert!(target.join(ENTRY_FILE).is_file());
    }

    #[test]
    fn plain_file_at_target_is_replaced() {
        let out = TempDir::new().unwrap();
        std::fs::write(out.path().join("greeter"), "stale").unwrap();

        let target = installer()
            .scaffold("greeter", out.path(), None, None, false)
            .unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn template_copy_skips_dot_files_and_validates() {
        let template = TempDir::new().unwrap();
        std::fs::write(template.path().join(ENTRY_FILE), "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::write(template.path().join("plugin.yaml"), "name: demo\n").unwrap();
        std::fs::write(template.path().join(".git-keep"), "").unwrap();

        let out = TempDir::new().unwrap();
        let target = installer()
            .scaffold("demo", out.path(), Some(template.path()), None, false)
            .unwrap();
        assert!(target.join(ENTRY_FILE).is_file());
        assert!(target.join("plugin.yaml").is_file());
        assert!(!target.join(".git-keep").exists());
    }

    #[test]
    fn template_without_entry_is_rejected() {
        let template = TempDir::new().unwrap();
        std::fs::write(template.path().join("plugin.json"), "{\"name\": \"x\"}").unwrap();

        let out = TempDir::new().unwrap();
        let err = installer()
            .scaffold("demo", out.path(), Some(template.path()), None, false)
            .unwrap_err();
        assert!(matches!(err, PluginError::EntryMissing { .. }));
    }

    #[test]
    fn missing_template_is_source_invalid() {
        let out = TempDir::new().unwrap();
        let err = installer()
            .scaffold("demo", out.path(), Some(Path::new("/no/such/template")), None, false)
            .unwrap_err();
        assert!(matches!(err, PluginError::SourceInvalid(_)));
    }
}
