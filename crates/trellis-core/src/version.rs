//! Host and plugin-API version constants.

use std::sync::OnceLock;

use semver::Version;

/// Capability group under which entry-point plugins advertise themselves.
///
/// This string is the wire contract between the host and plugin packages:
/// only descriptors registered under this group are considered during
/// entry-point discovery. The trailing `v1` tracks the plugin API major
/// version.
pub const ENTRY_POINT_GROUP: &str = "trellis.plugins.v1";

/// Version of the plugin API that entry-point plugins are gated against.
const API_VERSION: &str = "1.0.0";

/// The running host version (from the crate metadata).
pub fn host_version() -> &'static Version {
    static VERSION: OnceLock<Version> = OnceLock::new();
    VERSION.get_or_init(|| {
        Version::parse(env!("CARGO_PKG_VERSION"))
            .unwrap_or_else(|_| Version::new(0, 0, 0))
    })
}

/// The plugin API version.
pub fn api_version() -> &'static Version {
    static VERSION: OnceLock<Version> = OnceLock::new();
    VERSION.get_or_init(|| {
        Version::parse(API_VERSION).unwrap_or_else(|_| Version::new(1, 0, 0))
    })
}

/// Coerce a JSON-ish version value to string form.
///
/// Plugin declarations may carry `version` as a string or a bare numeric
/// literal (`1.0` serializes as a number in sloppy metadata); both are
/// accepted and normalized to a string.
#[must_use]
pub fn coerce_version(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
