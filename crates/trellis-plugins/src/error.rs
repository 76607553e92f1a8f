//! Plugin error types.

use std::path::PathBuf;

/// Errors from plugin operations.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The requested plugin was not found.
    #[error("plugin not found: {0}")]
    NotFound(String),

    /// A plugin with this name is already registered.
    #[error("plugin already registered: {0}")]
    DuplicateName(String),

    /// The alias collides with an existing name or alias.
    #[error("alias already in use: {0}")]
    DuplicateAlias(String),

    /// The same plugin instance is already registered under another name.
    #[error("plugin instance already registered as: {0}")]
    DuplicateImplementation(String),

    /// The requested hook name is not a known extension point.
    #[error("unknown hook: {0}")]
    HookNotFound(String),

    /// The plugin name is invalid.
    #[error("invalid plugin name: {0}")]
    InvalidName(String),

    /// The plugin's entry file could not be read.
    #[error("failed to read plugin entry at {path}: {message}")]
    ImportFailed {
        /// Path to the entry file.
        path: PathBuf,
        /// Failure reason.
        message: String,
    },

    /// The host signing key could not be loaded or created.
    #[error("signing key unavailable: {0}")]
    SigningKeyUnavailable(String),

    /// A detached signature was present but did not verify.
    #[error("signature verification failed for {path}: {message}")]
    SignatureInvalid {
        /// Path to the entry file.
        path: PathBuf,
        /// Failure reason.
        message: String,
    },

    /// The plugin's entry process failed (spawn, non-zero exit, timeout,
    /// or unparsable output).
    #[error("plugin execution failed: {0}")]
    ExecutionFailed(String),

    /// The describe output lacks a top-level `plugin` object.
    #[error("plugin declaration missing from describe output of {path}")]
    MissingPluginDeclaration {
        /// Path to the entry file.
        path: PathBuf,
    },

    /// The plugin's declared host version requirement is not satisfied.
    #[error("plugin requires host version {required}, running {running}")]
    IncompatibleVersion {
        /// Declared requirement.
        required: String,
        /// Running host version.
        running: String,
    },

    /// The install source is not a usable plugin directory.
    #[error("invalid plugin source: {0}")]
    SourceInvalid(String),

    /// The source directory has no entry executable.
    #[error("plugin entry missing: {path}")]
    EntryMissing {
        /// Expected path of the entry executable.
        path: PathBuf,
    },

    /// The destination already holds a plugin and force was not given.
    #[error("plugin already installed at {path}")]
    AlreadyInstalled {
        /// The occupied destination.
        path: PathBuf,
    },

    /// A symlink was found where the installer refuses to follow one.
    #[error("refusing symlink at {path}")]
    SymlinkRefused {
        /// The offending path.
        path: PathBuf,
    },

    /// Filesystem permission denied.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be accessed.
        path: PathBuf,
    },

    /// No installed plugin directory matches the name.
    #[error("plugin not installed: {0}")]
    NotInstalled(String),

    /// The plugin's metadata file is corrupt or not UTF-8.
    #[error("invalid plugin metadata at {path}: {message}")]
    MetadataInvalid {
        /// Path to the metadata file.
        path: PathBuf,
        /// Parse error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Machine-readable failure kind for error envelopes.
    #[must_use]
    pub fn failure_kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::DuplicateName(_) => "duplicate_name",
            Self::DuplicateAlias(_) => "duplicate_alias",
            Self::DuplicateImplementation(_) => "duplicate_implementation",
            Self::HookNotFound(_) => "hook_not_found",
            Self::InvalidName(_) => "invalid_name",
            Self::ImportFailed { .. } => "import_failed",
            Self::SigningKeyUnavailable(_) => "signing_key_unavailable",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::ExecutionFailed(_) => "execution_failed",
            Self::MissingPluginDeclaration { .. } => "missing_plugin_declaration",
            Self::IncompatibleVersion { .. } => "incompatible_version",
            Self::SourceInvalid(_) => "source_invalid",
            Self::EntryMissing { .. } => "entry_missing",
            Self::AlreadyInstalled { .. } => "already_installed",
            Self::SymlinkRefused { .. } => "symlink_refused",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::NotInstalled(_) => "not_installed",
            Self::MetadataInvalid { .. } => "metadata_invalid",
            Self::Io(_) => "io",
        }
    }

    /// Whether this failure is a validation/user-input problem rather than
    /// a hard host failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidName(_)
                | Self::DuplicateName(_)
                | Self::DuplicateAlias(_)
                | Self::DuplicateImplementation(_)
                | Self::SourceInvalid(_)
                | Self::EntryMissing { .. }
                | Self::AlreadyInstalled { .. }
                | Self::NotInstalled(_)
                | Self::NotFound(_)
        )
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kinds_are_stable() {
        assert_eq!(
            PluginError::DuplicateName("x".into()).failure_kind(),
            "duplicate_name"
        );
        assert_eq!(
            PluginError::SymlinkRefused { path: "/p".into() }.failure_kind(),
            "symlink_refused"
        );
        assert_eq!(
            PluginError::HookNotFound("boot".into()).failure_kind(),
            "hook_not_found"
        );
    }

    #[test]
    fn validation_classification() {
        assert!(PluginError::InvalidName("Bad Name".into()).is_validation());
        assert!(PluginError::AlreadyInstalled { path: "/p".into() }.is_validation());
        assert!(!PluginError::ExecutionFailed("boom".into()).is_validation());
        assert!(!PluginError::SignatureInvalid {
            path: "/p".into(),
            message: "bad".into()
        }
        .is_validation());
    }
}
