//! Plugin system for the Trellis command-line host.
//!
//! Provides everything between "a directory on disk" and "a registered,
//! hook-dispatching plugin":
//!
//! - [`HostPlugin`]: Trait for plugins the host can register and dispatch to
//! - [`HookSurface`] and the per-hook traits: the fixed extension points
//! - [`PluginRegistry`]: Name/alias registry and sequential hook bus
//! - [`PluginLoader`]: Signature-gated, version-gated loading of entry executables
//! - [`ProcessPlugin`]: A loaded plugin, dispatched by re-invoking its entry
//! - [`discover`]: Entry-point discovery over [`EntryPointDescriptor`] values
//! - [`Installer`]: scaffold / install / uninstall / check / info / list
//!
//! # Plugin Layout
//!
//! An installed plugin is a directory holding the entry executable
//! `plugin.run`, optionally a detached signature `plugin.run.sig`, and a
//! metadata file `plugin.json` or `plugin.yaml`. The entry executable
//! answers `describe` with a JSON declaration and is re-invoked per hook
//! with the payload on stdin.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod declaration;
pub mod discovery;
pub mod error;
pub mod hooks;
pub mod installer;
pub mod loader;
pub mod manifest;
pub mod paths;
pub mod plugin;
pub mod process;
pub mod registry;

pub use declaration::PluginDeclaration;
pub use discovery::{
    discover, DiscoveryFailure, DiscoveryOutcome, EntryPointDescriptor, PluginConstructor,
};
pub use error::{PluginError, PluginResult};
pub use hooks::{
    HealthHook, HookKind, HookSurface, PostExecuteHook, PreExecuteHook, ShutdownHook, StartupHook,
};
pub use installer::{CheckReport, InstallOptions, Installer, PluginInfo};
pub use loader::PluginLoader;
pub use manifest::PluginManifest;
pub use plugin::{HostPlugin, PluginName};
pub use process::ProcessPlugin;
pub use registry::PluginRegistry;
