//! Process-backed plugins.
//!
//! A loaded plugin is represented by its entry executable. Hook dispatch
//! re-invokes the executable with the hook's wire name as the single
//! argument and a JSON payload on stdin.
//!
//! # Security
//!
//! Plugin processes run with a scrubbed environment: variables are
//! cleared and only an allowlist is re-inherited, with PATH restricted
//! to system directories. Every invocation is bounded by a timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use trellis_di::ServiceContainer;

use crate::declaration::PluginDeclaration;
use crate::error::{PluginError, PluginResult};
use crate::hooks::{
    HealthHook, HookKind, HookSurface, PostExecuteHook, PreExecuteHook, ShutdownHook, StartupHook,
};
use crate::plugin::HostPlugin;

/// Default bound on a single plugin process invocation.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variables that are safe to inherit from the host process.
const ALLOWED_ENV_VARS: &[&str] = &[
    // Essential system variables
    "HOME", "USER", "SHELL", "TERM", "LANG", "LC_ALL", "LC_CTYPE",
    // Temporary directories
    "TMPDIR", "TMP", "TEMP",
];

/// Restricted PATH for plugin processes.
#[cfg(unix)]
const SAFE_PATH_DIRS: &[&str] = &["/usr/bin", "/bin", "/usr/local/bin"];

#[cfg(windows)]
const SAFE_PATH_DIRS: &[&str] = &[r"C:\Windows\System32", r"C:\Windows"];

fn safe_path() -> String {
    SAFE_PATH_DIRS.join(if cfg!(windows) { ";" } else { ":" })
}

/// A plugin backed by its on-disk entry executable.
pub struct ProcessPlugin {
    name: String,
    entry: PathBuf,
    declaration: PluginDeclaration,
    hook_timeout: Duration,
}

impl ProcessPlugin {
    /// Wrap a loaded entry executable and its declaration.
    #[must_use]
    pub fn new(entry: PathBuf, declaration: PluginDeclaration, hook_timeout: Duration) -> Self {
        let name = declaration.effective_name(&entry);
        Self {
            name,
            entry,
            declaration,
            hook_timeout,
        }
    }

    /// Path of the entry executable.
    #[must_use]
    pub fn entry(&self) -> &Path {
        &self.entry
    }

    /// The directory this plugin lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.entry.parent().unwrap_or(Path::new("."))
    }

    /// The declaration returned by `describe`.
    #[must_use]
    pub fn declaration(&self) -> &PluginDeclaration {
        &self.declaration
    }

    /// Invoke the entry executable for a hook, passing the payload on
    /// stdin, and parse its stdout as JSON.
    ///
    /// Empty stdout means the hook produced no result (`None`).
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ExecutionFailed`] on spawn failure,
    /// non-zero exit, timeout, or unparsable output.
    pub async fn invoke(&self, hook: HookKind, payload: &Value) -> PluginResult<Option<Value>> {
        run_entry(&self.entry, hook.as_str(), payload, self.hook_timeout)
            .await
            .map(|output| parse_hook_output(output.as_deref()))?
    }
}

/// Run an entry executable with one argument and a JSON payload on stdin.
///
/// Returns the process's stdout, or `None` when it was empty.
pub(crate) async fn run_entry(
    entry: &Path,
    arg: &str,
    payload: &Value,
    bound: Duration,
) -> PluginResult<Option<String>> {
    debug!(entry = %entry.display(), arg, "Invoking plugin process");

    let mut cmd = Command::new(entry);
    cmd.arg(arg);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    if let Some(dir) = entry.parent() {
        cmd.current_dir(dir);
    }

    // Scrub the environment: clear everything, re-add only the allowlist,
    // with PATH restricted to system directories.
    cmd.env_clear();
    cmd.env("PATH", safe_path());
    for var in ALLOWED_ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            cmd.env(var, value);
        }
    }
    cmd.env("TRELLIS_HOOK", arg);
    if let Some(dir) = entry.parent() {
        cmd.env("TRELLIS_PLUGIN_DIR", dir);
    }

    let payload_json = payload.to_string();

    let output = match timeout(bound, async {
        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take();

        // Feed the payload while draining stdout; a child that writes
        // more than a pipe buffer before reading stdin would otherwise
        // wedge both ends until the timeout.
        let feed = async {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(payload_json.as_bytes()).await;
                let _ = stdin.shutdown().await;
            }
        };
        let (output, ()) = tokio::join!(child.wait_with_output(), feed);
        output
    })
    .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(PluginError::ExecutionFailed(format!(
                "failed to run {}: {e}",
                entry.display()
            )));
        }
        Err(_) => {
            return Err(PluginError::ExecutionFailed(format!(
                "{} timed out after {}s",
                entry.display(),
                bound.as_secs()
            )));
        }
    };

    if !output.status.success() {
        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            entry = %entry.display(),
            exit_code,
            stderr = %stderr,
            "Plugin process failed"
        );
        return Err(PluginError::ExecutionFailed(format!(
            "{} exited with code {exit_code}: {}",
            entry.display(),
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if stdout.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(stdout))
    }
}

fn parse_hook_output(stdout: Option<&str>) -> PluginResult<Option<Value>> {
    match stdout {
        None => Ok(None),
        Some(text) => serde_json::from_str(text.trim())
            .map(Some)
            .map_err(|e| PluginError::ExecutionFailed(format!("unparsable hook output: {e}"))),
    }
}

impl HostPlugin for ProcessPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.declaration.version.as_deref()
    }

    fn commands(&self) -> Vec<String> {
        self.declaration.commands.clone()
    }

    fn hook_surface(self: Arc<Self>) -> HookSurface {
        let mut surface = HookSurface::new();
        for kind in &self.declaration.hooks {
            match kind {
                HookKind::Startup => {
                    let hook: Arc<dyn StartupHook> = self.clone();
                    surface.startup = Some(hook);
                }
                HookKind::Shutdown => {
                    let hook: Arc<dyn ShutdownHook> = self.clone();
                    surface.shutdown = Some(hook);
                }
                HookKind::PreExecute => {
                    let hook: Arc<dyn PreExecuteHook> = self.clone();
                    surface.pre_execute = Some(hook);
                }
                HookKind::PostExecute => {
                    let hook: Arc<dyn PostExecuteHook> = self.clone();
                    surface.post_execute = Some(hook);
                }
                HookKind::Health => {
                    let hook: Arc<dyn HealthHook> = self.clone();
                    surface.health = Some(hook);
                }
            }
        }
        surface
    }
}

#[async_trait]
impl StartupHook for ProcessPlugin {
    // The container cannot cross the process boundary; the subprocess
    // only gets the event notification.
    async fn on_startup(&self, _container: &ServiceContainer) -> PluginResult<Option<Value>> {
        self.invoke(HookKind::Startup, &serde_json::json!({ "event": "startup" }))
            .await
    }
}

#[async_trait]
impl ShutdownHook for ProcessPlugin {
    async fn on_shutdown(&self) -> PluginResult<Option<Value>> {
        self.invoke(HookKind::Shutdown, &serde_json::json!({ "event": "shutdown" }))
            .await
    }
}

#[async_trait]
impl PreExecuteHook for ProcessPlugin {
    async fn on_pre_execute(&self, payload: &Value) -> PluginResult<Option<Value>> {
        self.invoke(HookKind::PreExecute, payload).await
    }
}

#[async_trait]
impl PostExecuteHook for ProcessPlugin {
    async fn on_post_execute(&self, payload: &Value) -> PluginResult<Option<Value>> {
        self.invoke(HookKind::PostExecute, payload).await
    }
}

#[async_trait]
impl HealthHook for ProcessPlugin {
    async fn on_health(&self) -> PluginResult<bool> {
        let reply = self
            .invoke(HookKind::Health, &serde_json::json!({ "event": "health" }))
            .await?;
        match reply {
            Some(Value::Bool(healthy)) => Ok(healthy),
            other => Err(PluginError::ExecutionFailed(format!(
                "health hook returned a non-boolean reply: {other:?}"
            ))),
        }
    }
}

impl std::fmt::Debug for ProcessPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessPlugin")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("hooks", &self.declaration.hooks)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    /// Write an executable entry script into `dir` and return its path.
    #[cfg(unix)]
    pub(crate) fn write_entry_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(crate::paths::ENTRY_FILE);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    /// A describe script declaring the given JSON as its plugin object.
    #[cfg(unix)]
    pub(crate) fn describe_script(plugin_object: &str) -> String {
        format!(
            r#"case "$1" in
  describe) echo '{{"plugin": {plugin_object}}}' ;;
  *) exit 0 ;;
esac"#
        )
    }
}
