//! External remediation script executor.
//!
//! Spawns the script mapped to a tool, captures its merged output line by
//! line, watches for the reboot sentinel and records the exit code. At most
//! one run per (tool, target) pair may be in flight at a time: the scripts
//! touch shared state (lock files, cache directories, named processes) and
//! must never race against themselves.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use crate::tools::{Tool, EXIT_PROCESS_NOT_FOUND};

/// Literal sentinel a script prints when the machine must be rebooted.
/// Matched by containment, not whole-line equality.
pub const REBOOT_SENTINEL: &str = "[REBOOT_REQUIRED] true";

/// Outcome of one script invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRunResult {
    /// Process exit code (-1 when terminated by a signal)
    pub exit_code: i32,
    /// Accumulated stdout+stderr
    pub output: String,
    /// Whether the reboot sentinel appeared in the output
    pub reboot_required: bool,
}

impl ToolRunResult {
    /// Plain exit-code success.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Success as presented to the user: the kill-based scripts exit
    /// nonzero when the process they target was not running, which is fine.
    pub fn effectively_succeeded(&self, tool: Tool) -> bool {
        self.succeeded()
            || (self.exit_code == EXIT_PROCESS_NOT_FOUND
                && tool.treats_missing_process_as_success())
    }
}

/// Executor errors.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("no script mapped for {0}")]
    NotExecutable(Tool),

    #[error("script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("{tool} is already running for this target")]
    AlreadyRunning { tool: Tool },

    #[error("i/o failure running script: {0}")]
    Io(#[from] std::io::Error),
}

type FlightKey = (Tool, Option<PathBuf>);

/// Runs remediation scripts out of a configured directory.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    scripts_dir: PathBuf,
    in_flight: Arc<Mutex<HashSet<FlightKey>>>,
}

impl ScriptExecutor {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Path of the script backing a tool, if it is script-backed.
    pub fn script_path(&self, tool: Tool) -> Option<PathBuf> {
        if !tool.is_script() {
            return None;
        }
        let id = tool.id()?;
        let ext = if cfg!(windows) { "bat" } else { "sh" };
        Some(self.scripts_dir.join(format!("{id}.{ext}")))
    }

    /// Run a tool's script to completion, optionally passing a target path
    /// as its first argument.
    ///
    /// Rejects with [`ExecError::AlreadyRunning`] while another run for the
    /// same (tool, target) is in flight.
    pub async fn run(&self, tool: Tool, target: Option<&Path>) -> Result<ToolRunResult, ExecError> {
        let path = self
            .script_path(tool)
            .ok_or(ExecError::NotExecutable(tool))?;
        if !path.exists() {
            return Err(ExecError::ScriptNotFound(path));
        }

        let _guard = FlightGuard::acquire(&self.in_flight, tool, target)?;

        info!("Running {} ({})", tool, path.display());

        let mut cmd = command_for(&path);
        if let Some(target) = target {
            cmd.arg(target);
        }
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(collect_lines(stderr));

        let (mut output, mut reboot_required) = collect_lines(child.stdout.take()).await;

        let (err_output, err_reboot) = stderr_task.await.unwrap_or_default();
        output.push_str(&err_output);
        reboot_required |= err_reboot;

        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);

        if exit_code != 0 {
            warn!("{} exited with code {}", tool, exit_code);
        }
        if reboot_required {
            info!("{} requested a reboot", tool);
        }

        Ok(ToolRunResult {
            exit_code,
            output,
            reboot_required,
        })
    }
}

fn command_for(path: &Path) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/c").arg(path);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg(path);
        cmd
    }
}

/// Read a stream to EOF, accumulating lines and scanning for the sentinel.
async fn collect_lines<R>(stream: Option<R>) -> (String, bool)
where
    R: AsyncRead + Unpin,
{
    let mut output = String::new();
    let mut sentinel_seen = false;

    let Some(stream) = stream else {
        return (output, sentinel_seen);
    };

    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.contains(REBOOT_SENTINEL) {
            sentinel_seen = true;
        }
        output.push_str(&line);
        output.push('\n');
    }
    (output, sentinel_seen)
}

/// In-flight marker, released on drop so every exit path unlocks the key.
struct FlightGuard {
    registry: Arc<Mutex<HashSet<FlightKey>>>,
    key: FlightKey,
}

impl FlightGuard {
    fn acquire(
        registry: &Arc<Mutex<HashSet<FlightKey>>>,
        tool: Tool,
        target: Option<&Path>,
    ) -> Result<Self, ExecError> {
        let key = (tool, target.map(Path::to_path_buf));
        let mut set = registry.lock().unwrap();
        if !set.insert(key.clone()) {
            return Err(ExecError::AlreadyRunning { tool });
        }
        Ok(Self {
            registry: Arc::clone(registry),
            key,
        })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut set = self.registry.lock().unwrap();
        set.remove(&self.key);
    }
}
