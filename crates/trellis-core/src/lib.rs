//! Core types for the Trellis command-line host.
//!
//! This crate holds the pieces every other Trellis crate agrees on:
//!
//! - [`TrellisHome`]: resolution of the host's home directory
//!   (`$TRELLIS_HOME` or `~/.trellis/`) and the managed plugins directory
//!   (`$TRELLIS_PLUGINS_DIR` override).
//! - [`host_version`] / [`api_version`]: the running host version and the
//!   plugin API version that entry-point plugins are gated against.
//! - [`HostConfig`]: the host's own `config.toml`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod config;
mod dirs;
mod version;

pub use config::{ConfigError, HostConfig};
pub use dirs::{TrellisHome, HOME_ENV, PLUGINS_DIR_ENV};
pub use version::{api_version, coerce_version, host_version, ENTRY_POINT_GROUP};
