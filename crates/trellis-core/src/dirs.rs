//! Directory layout for the Trellis home and the managed plugins directory.
//!
//! ```text
//! ~/.trellis/                    (TrellisHome)
//! ├── keys/
//! │   └── host.key                 (ed25519 secret key, 0600)
//! ├── plugins/                     (managed plugins directory)
//! └── config.toml                  (host config)
//! ```
//!
//! The plugins directory is the only externally overridable location:
//! `$TRELLIS_PLUGINS_DIR` wins over `<home>/plugins/`.

use std::io;
use std::path::{Path, PathBuf};

/// Environment variable overriding the managed plugins directory.
pub const PLUGINS_DIR_ENV: &str = "TRELLIS_PLUGINS_DIR";

/// Environment variable overriding the host home directory.
pub const HOME_ENV: &str = "TRELLIS_HOME";

/// The Trellis home directory (`~/.trellis/` or `$TRELLIS_HOME`).
#[derive(Debug, Clone)]
pub struct TrellisHome {
    root: PathBuf,
}

impl TrellisHome {
    /// Resolve the home directory.
    ///
    /// Checks `$TRELLIS_HOME` first, then falls back to `$HOME/.trellis/`.
    ///
    /// # Errors
    ///
    /// Returns an error if `$TRELLIS_HOME` is set but not absolute, or if
    /// neither `$TRELLIS_HOME` nor `$HOME` is set.
    pub fn resolve() -> io::Result<Self> {
        let root = if let Ok(custom) = std::env::var(HOME_ENV) {
            let p = PathBuf::from(&custom);
            if !p.is_absolute() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "TRELLIS_HOME must be an absolute path",
                ));
            }
            p
        } else {
            let home = std::env::var("HOME").map_err(|_| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "neither TRELLIS_HOME nor HOME environment variable is set",
                )
            })?;
            PathBuf::from(home).join(".trellis")
        };

        Ok(Self { root })
    }

    /// Create a home rooted at an explicit path (tests, embedding).
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The managed plugins directory.
    ///
    /// `$TRELLIS_PLUGINS_DIR` overrides the default `<root>/plugins/`.
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        if let Ok(custom) = std::env::var(PLUGINS_DIR_ENV) {
            if !custom.is_empty() {
                return PathBuf::from(custom);
            }
        }
        self.root.join("plugins")
    }

    /// The directory holding the host's signing/verifying keys.
    #[must_use]
    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    /// Path of the host's ed25519 signing key.
    #[must_use]
    pub fn signing_key_path(&self) -> PathBuf {
        self.keys_dir().join("host.key")
    }

    /// Path of the host config file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Create the root and plugins directories if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.plugins_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_at_layout() {
        let home = TrellisHome::at("/home/user/.trellis");
        assert_eq!(home.root(), Path::new("/home/user/.trellis"));
        assert_eq!(home.keys_dir(), PathBuf::from("/home/user/.trellis/keys"));
        assert_eq!(
            home.signing_key_path(),
            PathBuf::from("/home/user/.trellis/keys/host.key")
        );
        assert_eq!(
            home.config_path(),
            PathBuf::from("/home/user/.trellis/config.toml")
        );
    }

    #[test]
    fn ensure_dirs_creates_plugins_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let home = TrellisHome::at(tmp.path().join("trellis"));
        home.ensure_dirs().unwrap();
        assert!(home.root().is_dir());
    }
}
