//! Output rendering: pretty text for humans, JSON envelopes for tools.

use serde_json::json;

use trellis_plugins::PluginError;

/// How command results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    /// Human-readable lines on stdout.
    Pretty,
    /// One JSON document on stdout.
    Json,
}

impl OutputFormat {
    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Print a successful result: the JSON value as-is in JSON mode, the
/// pretty lines otherwise.
pub(crate) fn render(format: OutputFormat, value: &serde_json::Value, pretty: &[String]) {
    match format {
        OutputFormat::Json => println!("{value}"),
        OutputFormat::Pretty => {
            for line in pretty {
                println!("{line}");
            }
        }
    }
}

/// Print a plugin failure as an error envelope.
pub(crate) fn render_error(format: OutputFormat, error: &PluginError) {
    match format {
        OutputFormat::Json => {
            let envelope = json!({
                "error": {
                    "kind": error.failure_kind(),
                    "message": error.to_string(),
                }
            });
            println!("{envelope}");
        }
        OutputFormat::Pretty => eprintln!("error: {error}"),
    }
}
