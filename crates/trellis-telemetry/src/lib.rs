//! Logging and telemetry for the Trellis command-line host.
//!
//! This crate provides:
//! - Configurable logging setup over the tracing ecosystem
//! - Named telemetry events with pluggable sinks
//!
//! # Example
//!
//! ```rust,no_run
//! use trellis_telemetry::{setup_logging, EventRecord, LogConfig, LogFormat, TelemetrySink, TracingSink};
//!
//! # fn main() -> Result<(), trellis_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Json)
//!     .with_directive("trellis_plugins=trace");
//! setup_logging(&config)?;
//!
//! let sink = TracingSink;
//! sink.emit(EventRecord::new("plugin_loaded").with_field("plugin", "hello"));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;
mod sink;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{setup_default_logging, setup_logging, LogConfig, LogFormat, LogTarget};
pub use sink::{EventRecord, NullSink, RecordingSink, TelemetrySink, TracingSink};
