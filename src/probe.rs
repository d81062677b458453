//! Bounded subprocess exchanges
//!
//! The handshake spawns the configured MCP server, feeds it a single
//! JSON-RPC `initialize` request on stdin and closes stdin, then waits for
//! the process to exit. Every wait is bounded: when the deadline passes the
//! child gets SIGTERM, then SIGKILL after a short grace period. Children are
//! also spawned with `kill_on_drop` so an early return never orphans one.

use serde::Serialize;
use serde_json::Map;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CheckError, CheckResult};

/// Substring the analytics server prints once it is up
pub const READY_MARKER: &str = "Google Analytics Server";

/// MCP protocol revision sent in the handshake
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Time a child gets to exit after SIGTERM before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct InitializeRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: InitializeParams,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    protocol_version: &'static str,
    capabilities: Map<String, serde_json::Value>,
    client_info: ClientInfo,
}

#[derive(Serialize)]
struct ClientInfo {
    name: &'static str,
    version: &'static str,
}

/// The `initialize` request as a single newline-terminated line
pub fn initialize_line() -> CheckResult<String> {
    let request = InitializeRequest {
        jsonrpc: "2.0",
        id: 1,
        method: "initialize",
        params: InitializeParams {
            protocol_version: PROTOCOL_VERSION,
            capabilities: Map::new(),
            client_info: ClientInfo {
                name: "test-client",
                version: "1.0",
            },
        },
    };

    let mut line = serde_json::to_string(&request)
        .map_err(|e| CheckError::SubprocessFailure(format!("failed to encode request: {e}")))?;
    line.push('\n');
    Ok(line)
}

/// Captured result of a finished child process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// One handshake against an MCP server executable
#[derive(Debug, Clone)]
pub struct HandshakeProbe {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Duration,
    marker: String,
}

impl HandshakeProbe {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: BTreeMap::new(),
            timeout: crate::config::DEFAULT_TIMEOUT,
            marker: READY_MARKER.to_string(),
        }
    }

    /// Add variables on top of the inherited environment
    pub fn envs(mut self, vars: BTreeMap<String, String>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[cfg(test)]
    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Spawn the server, send `initialize`, and collect its output
    pub async fn exchange(&self) -> CheckResult<ProcessOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env);

        info!(
            program = %self.program,
            args = ?self.args,
            timeout = %humantime::format_duration(self.timeout),
            "Probing MCP server"
        );

        run_bounded(cmd, Some(initialize_line()?), self.timeout).await
    }

    /// Full handshake: exchange, then require exit 0 and the ready marker
    pub async fn run(&self) -> CheckResult<ProcessOutput> {
        let output = self.exchange().await?;
        evaluate(&output, &self.marker)?;
        Ok(output)
    }
}

/// Classify a finished exchange
pub fn evaluate(output: &ProcessOutput, marker: &str) -> CheckResult<()> {
    if !output.status.success() {
        let detail = last_line(&output.stderr)
            .map(|l| format!(": {l}"))
            .unwrap_or_default();
        return Err(CheckError::SubprocessFailure(format!(
            "server exited with {}{}",
            output.status, detail
        )));
    }

    if !output.stdout.contains(marker) {
        return Err(CheckError::SubprocessFailure(format!(
            "server output did not contain {:?}",
            marker
        )));
    }

    Ok(())
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

/// Run `program args...` with no stdin and return its trimmed output.
///
/// Tools differ on whether `--version` goes to stdout or stderr, so stderr
/// is used when stdout is empty.
pub async fn capture_output(
    program: impl AsRef<OsStr>,
    args: &[&str],
    timeout: Duration,
) -> CheckResult<String> {
    let mut cmd = Command::new(program.as_ref());
    cmd.args(args);

    let output = run_bounded(cmd, None, timeout).await?;
    if !output.status.success() {
        return Err(CheckError::SubprocessFailure(format!(
            "{} exited with {}",
            program.as_ref().to_string_lossy(),
            output.status
        )));
    }

    let stdout = output.stdout.trim();
    let text = if stdout.is_empty() { output.stderr.trim() } else { stdout };
    Ok(text.to_string())
}

/// `<program> --version`
pub async fn version_output(program: impl AsRef<OsStr>, timeout: Duration) -> CheckResult<String> {
    capture_output(program, &["--version"], timeout).await
}

async fn run_bounded(mut cmd: Command, input: Option<String>, timeout: Duration) -> CheckResult<ProcessOutput> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    cmd.stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| CheckError::SubprocessFailure(format!("failed to spawn {program}: {e}")))?;
    debug!(program = %program, pid = ?child.id(), "Spawned child process");

    let stdin = child.stdin.take();
    let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
    let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

    let exchange = async {
        if let (Some(mut stdin), Some(input)) = (stdin, input) {
            // A child that exits without reading its input still gets judged
            // by its exit status and output.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %e, "Failed to write to child stdin");
            } else if let Err(e) = stdin.flush().await {
                debug!(error = %e, "Failed to flush child stdin");
            }
            // stdin dropped here so the child sees EOF
        }
        child.wait().await
    };

    let outcome = tokio::time::timeout(timeout, exchange).await;
    match outcome {
        Ok(Ok(status)) => {
            debug!(program = %program, status = %status, "Child exited");
            Ok(ProcessOutput {
                status,
                stdout: collect(stdout_task).await,
                stderr: collect(stderr_task).await,
            })
        }
        Ok(Err(e)) => {
            terminate(&mut child, &program).await;
            stdout_task.abort();
            stderr_task.abort();
            Err(CheckError::SubprocessFailure(format!("failed waiting for {program}: {e}")))
        }
        Err(_) => {
            warn!(program = %program, "Child did not exit in time, terminating");
            terminate(&mut child, &program).await;
            stdout_task.abort();
            stderr_task.abort();
            Err(CheckError::SubprocessTimeout { timeout })
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "Failed to read child output");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Join a pipe reader; a grandchild holding the pipe open must not stall us
async fn collect(task: JoinHandle<String>) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(TERMINATE_GRACE, task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!(error = %e, "Output reader failed");
            String::new()
        }
        Err(_) => {
            abort.abort();
            debug!("Output pipe still open after child exit");
            String::new()
        }
    }
}

/// Stop a child: SIGTERM, grace period, then SIGKILL
async fn terminate(child: &mut Child, program: &str) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    let outcome = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await;
    match outcome {
        Ok(Ok(status)) => {
            debug!(program = %program, status = %status, "Child terminated");
        }
        Ok(Err(e)) => {
            warn!(program = %program, error = %e, "Error waiting for child");
        }
        Err(_) => {
            warn!(program = %program, "Child ignored SIGTERM, force killing");
            let _ = child.kill().await;
        }
    }
}
