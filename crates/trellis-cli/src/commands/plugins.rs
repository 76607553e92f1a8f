//! Handlers for the `trellis plugins` subcommands.

use std::path::Path;
use std::process::ExitCode;

use serde_json::json;

use trellis_crypto::KeyPair;
use trellis_plugins::{InstallOptions, PluginError, PluginResult};

use crate::host::Host;
use crate::output::{render, OutputFormat};

const EXIT_OK: ExitCode = ExitCode::SUCCESS;

/// Exit code for a check that found the plugin unhealthy.
fn exit_unhealthy() -> ExitCode {
    ExitCode::from(3)
}

pub(crate) fn scaffold(
    host: &Host,
    format: OutputFormat,
    name: &str,
    output_dir: Option<&Path>,
    template: Option<&Path>,
    sign: bool,
    force: bool,
) -> PluginResult<ExitCode> {
    let output_dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let key = if sign {
        Some(
            KeyPair::load_or_generate(&host.signing_key_path)
                .map_err(|e| PluginError::SigningKeyUnavailable(e.to_string()))?,
        )
    } else {
        None
    };
    let target = host
        .installer
        .scaffold(name, &output_dir, template, key.as_ref(), force)?;
    let mut lines = vec![format!("Scaffolded plugin {name} at {}", target.display())];
    if let Some(key) = &key {
        lines.push(format!("  signed with key {}", key.key_id_hex()));
    }
    render(
        format,
        &json!({
            "scaffolded": name,
            "target": target,
            "signed": key.as_ref().map(KeyPair::key_id_hex),
        }),
        &lines,
    );
    Ok(EXIT_OK)
}

pub(crate) fn install(
    host: &Host,
    format: OutputFormat,
    source: &Path,
    force: bool,
    dry_run: bool,
) -> PluginResult<ExitCode> {
    let dest = host.installer.install(source, InstallOptions { force, dry_run })?;
    let action = if dry_run { "Would install" } else { "Installed" };
    render(
        format,
        &json!({ "installed": dest, "dry_run": dry_run }),
        &[format!("{action} {} -> {}", source.display(), dest.display())],
    );
    Ok(EXIT_OK)
}

pub(crate) fn uninstall(host: &Host, format: OutputFormat, name: &str) -> PluginResult<ExitCode> {
    let removed = host.installer.uninstall(name, Some(host.registry.as_ref()))?;
    let mut lines = vec![format!("Uninstalled plugin {name}")];
    lines.extend(removed.iter().map(|d| format!("  removed {}", d.display())));
    render(format, &json!({ "uninstalled": name, "removed": removed }), &lines);
    Ok(EXIT_OK)
}

pub(crate) async fn check(host: &Host, format: OutputFormat, name: &str) -> PluginResult<ExitCode> {
    let report = host.installer.check(name, &host.loader).await?;
    let status = if report.healthy { "healthy" } else { "unhealthy" };
    let mut lines = vec![format!("{}: {status}", report.plugin)];
    if let Some(detail) = &report.detail {
        lines.push(format!("  {detail}"));
    }
    render(format, &serde_json::to_value(&report).unwrap_or_default(), &lines);
    Ok(if report.healthy { EXIT_OK } else { exit_unhealthy() })
}

pub(crate) fn info(host: &Host, format: OutputFormat, name: &str) -> PluginResult<ExitCode> {
    let info = host.installer.info(name)?;
    let mut lines = vec![
        format!("name:    {}", info.name),
        format!("dir:     {}", info.dir.display()),
        format!(
            "version: {}",
            info.manifest.version.as_deref().unwrap_or("unknown")
        ),
        format!("entry:   {}", if info.entry_present { "present" } else { "missing" }),
        format!("signed:  {}", if info.signed { "yes" } else { "no" }),
    ];
    if let Some(description) = &info.manifest.description {
        lines.push(format!("about:   {description}"));
    }
    render(format, &serde_json::to_value(&info).unwrap_or_default(), &lines);
    Ok(EXIT_OK)
}

pub(crate) fn list(host: &Host, format: OutputFormat) -> PluginResult<ExitCode> {
    let plugins = host.installer.list()?;
    let lines = if plugins.is_empty() {
        vec!["no plugins installed".to_string()]
    } else {
        plugins
            .iter()
            .map(|p| {
                format!(
                    "{}  {}  {}",
                    p.name,
                    p.manifest.version.as_deref().unwrap_or("-"),
                    p.dir.display()
                )
            })
            .collect()
    };
    render(format, &serde_json::to_value(&plugins).unwrap_or_default(), &lines);
    Ok(EXIT_OK)
}
