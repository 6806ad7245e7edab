//! Persistent interactive shell inside the container.
//!
//! [`SessionBroker`] owns one pseudo-terminal pair and the shell process
//! attached to its slave side. Output is accumulated in a buffer as it is
//! read from the master side and handed out (then cleared) by
//! [`SessionBroker::read_output`]. The session survives across tool calls and
//! is started lazily, or restarted if the shell has exited.
//!
//! The three shell tools share one broker through `Arc<Mutex<_>>`.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{openpty, Winsize};
use nix::sys::signal::{killpg, Signal};
use nix::sys::termios::Termios;
use nix::unistd::Pid;
use serde_json::{json, Value};
use tokio::io::unix::AsyncFd;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ShellConfig;
use crate::error::ToolError;
use crate::runtime::{ContainerEnvironment, ShellCommand};

use super::types::{optional_str, ParamKind, Tool, ToolParam, ToolResult};

/// Shown whenever a container tool is called while `shell.enable` is off.
pub const DISABLED_MESSAGE: &str =
    "shell tools are not enabled. Set \"shell\": {\"enable\": true} in config.json.";

const READ_CHUNK: usize = 10240;
const INPUT_SETTLE: Duration = Duration::from_millis(100);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) fn disabled_error() -> ToolError {
    ToolError::Disabled(DISABLED_MESSAGE.to_string())
}

/// Translate a key name to the bytes a terminal would send.
///
/// Matching is case-insensitive. `Ctrl+<letter>` maps to the letter's control
/// code.
pub fn key_bytes(key: &str) -> Option<Vec<u8>> {
    let lower = key.trim().to_ascii_lowercase();
    let bytes: &[u8] = match lower.as_str() {
        "enter" | "return" => b"\n",
        "tab" => b"\t",
        "up" => b"\x1b[A",
        "down" => b"\x1b[B",
        "right" => b"\x1b[C",
        "left" => b"\x1b[D",
        "escape" | "esc" => b"\x1b",
        "backspace" => b"\x7f",
        _ => {
            let letter = lower.strip_prefix("ctrl+")?;
            let mut chars = letter.chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_lowercase() => Some(vec![c as u8 & 0x1f]),
                _ => None,
            };
        }
    };
    Some(bytes.to_vec())
}

/// A live pty pair plus the shell process on its slave side.
struct ShellSession {
    master: AsyncFd<File>,
    child: Child,
    buffer: Vec<u8>,
}

impl ShellSession {
    fn spawn(command: &ShellCommand) -> io::Result<Self> {
        let winsize = Winsize {
            ws_row: 40,
            ws_col: 200,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty = openpty(Some(&winsize), None::<&Termios>).map_err(io::Error::from)?;
        set_nonblocking(&pty.master)?;

        let mut cmd = command.to_command();
        cmd.stdin(Stdio::from(pty.slave.try_clone()?))
            .stdout(Stdio::from(pty.slave.try_clone()?))
            .stderr(Stdio::from(pty.slave))
            .kill_on_drop(true);
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(io::Error::from)?;
                Ok(())
            });
        }
        let child = cmd.spawn()?;
        // The slave fds moved into `cmd`; dropping it closes the parent's copies.
        drop(cmd);

        Ok(Self {
            master: AsyncFd::new(File::from(pty.master))?,
            child,
            buffer: Vec::new(),
        })
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait up to `wait` for output, then read everything available.
    async fn collect(&mut self, wait: Duration) -> usize {
        let mut deadline = Instant::now() + wait;
        let mut total = 0;
        loop {
            let mut guard = match tokio::time::timeout_at(deadline, self.master.readable()).await {
                Ok(Ok(guard)) => guard,
                Ok(Err(e)) => {
                    debug!(error = %e, "pty readiness failed");
                    break;
                }
                Err(_) => break,
            };
            let mut chunk = [0u8; READ_CHUNK];
            match guard.try_io(|fd| {
                let mut file: &File = fd.get_ref();
                file.read(&mut chunk)
            }) {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    total += n;
                    deadline = Instant::now();
                }
                // EIO once the slave side is gone.
                Ok(Err(e)) => {
                    debug!(error = %e, "pty read ended");
                    break;
                }
                Err(_would_block) => {
                    if total > 0 {
                        break;
                    }
                }
            }
        }
        total
    }

    async fn write_all(&self, mut bytes: &[u8]) -> io::Result<()> {
        while !bytes.is_empty() {
            let mut guard = tokio::time::timeout(WRITE_TIMEOUT, self.master.writable())
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "shell is not accepting input"))??;
            match guard.try_io(|fd| {
                let mut file: &File = fd.get_ref();
                file.write(bytes)
            }) {
                Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(Ok(n)) => bytes = &bytes[n..],
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    async fn terminate(mut self) {
        if let Some(pid) = self.child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!(pid, error = %e, "killpg failed, killing child directly");
                let _ = self.child.start_kill();
            }
        }
        match tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Shell session reaped"),
            Ok(Err(e)) => debug!(error = %e, "Failed to reap shell session"),
            Err(_) => warn!("Shell session did not exit after SIGKILL"),
        }
    }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = fcntl(raw, FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(raw, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

/// Owner of the container shell session.
pub struct SessionBroker {
    environment: Arc<dyn ContainerEnvironment>,
    enabled: bool,
    container: String,
    settle: Duration,
    session: Option<ShellSession>,
}

impl SessionBroker {
    pub fn new(environment: Arc<dyn ContainerEnvironment>, config: &ShellConfig) -> Self {
        Self {
            environment,
            enabled: config.enable,
            container: config.container_name.clone(),
            settle: Duration::from_millis(config.settle_ms),
            session: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a shell process is currently alive.
    pub fn is_active(&mut self) -> bool {
        self.session.as_mut().is_some_and(ShellSession::is_alive)
    }

    /// Start the session if it is not running.
    pub async fn ensure(&mut self) -> Result<(), ToolError> {
        if !self.enabled {
            return Err(disabled_error());
        }
        if self.is_active() {
            return Ok(());
        }
        if let Some(stale) = self.session.take() {
            debug!(container = %self.container, "Shell session exited, starting a new one");
            stale.terminate().await;
        }

        if !self.environment.is_running(&self.container).await {
            return Err(ToolError::EnvironmentNotReady(format!(
                "{} container '{}' is not running. Please deploy it first.",
                self.environment.name(),
                self.container
            )));
        }

        let command = self.environment.shell_command(&self.container);
        let mut session = ShellSession::spawn(&command).map_err(|e| {
            ToolError::execution(format!("failed to start shell session: {}", e))
        })?;
        tokio::time::sleep(self.settle).await;
        let banner = session.collect(Duration::ZERO).await;
        session.buffer.clear();

        info!(
            container = %self.container,
            program = %command.program,
            banner_bytes = banner,
            "Shell session started"
        );
        self.session = Some(session);
        Ok(())
    }

    /// Type text and/or a named key into the shell.
    pub async fn send_input(
        &mut self,
        text: Option<&str>,
        key: Option<&str>,
    ) -> Result<String, ToolError> {
        let text = text.filter(|t| !t.is_empty());
        let key = key.filter(|k| !k.trim().is_empty());
        self.ensure().await?;
        let Some(session) = self.session.as_mut() else {
            return Err(ToolError::execution("shell session is not running"));
        };

        let mut parts = Vec::new();
        let write_err = |e: io::Error| ToolError::execution(format!("failed to write to shell: {}", e));
        if let Some(text) = text {
            session.write_all(text.as_bytes()).await.map_err(write_err)?;
            parts.push(format!("Sent text: {}", text));
        }
        if let Some(key) = key {
            match key_bytes(key) {
                Some(bytes) => {
                    session.write_all(&bytes).await.map_err(write_err)?;
                    parts.push(format!("Sent key: {}", key));
                }
                None => parts.push(format!("Unknown key: {}", key)),
            }
        }

        tokio::time::sleep(INPUT_SETTLE).await;
        session.collect(Duration::ZERO).await;

        if parts.is_empty() {
            Ok("No input provided.".to_string())
        } else {
            Ok(parts.join(", "))
        }
    }

    /// Return everything the shell printed since the last read, then clear it.
    pub async fn read_output(&mut self, timeout: Duration) -> Result<String, ToolError> {
        self.ensure().await?;
        let Some(session) = self.session.as_mut() else {
            return Err(ToolError::execution("shell session is not running"));
        };
        session.collect(timeout).await;
        let output = std::mem::take(&mut session.buffer);
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Kill the shell. The next input starts a fresh one.
    pub async fn restart(&mut self) {
        if let Some(session) = self.session.take() {
            info!(container = %self.container, "Terminating shell session");
            session.terminate().await;
        }
    }
}

/// Shared handle used by the shell tools.
pub type SharedBroker = Arc<Mutex<SessionBroker>>;

/// `send_shell_input{input_text?, key_combo?}`
pub struct SendShellInputTool {
    broker: SharedBroker,
    description: String,
}

impl SendShellInputTool {
    pub fn new(broker: SharedBroker, mount_mapping: Option<&str>) -> Self {
        let mut description = "Send text and/or a special key to a persistent interactive bash \
            shell inside the Docker container. Text is typed as-is; send key_combo 'Enter' to \
            run it. Use get_shell_output to read what the shell printed."
            .to_string();
        if let Some(mapping) = mount_mapping.filter(|m| !m.is_empty()) {
            description.push_str(&format!(
                "\n\nEnvironment Info: Host-Container Mount Mapping: {}",
                mapping
            ));
        }
        Self {
            broker,
            description,
        }
    }
}

#[async_trait]
impl Tool for SendShellInputTool {
    fn name(&self) -> &str {
        "send_shell_input"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::optional(
                "input_text",
                ParamKind::String,
                "The text to type into the shell. Optional if sending a key_combo.",
                Value::Null,
            ),
            ToolParam::optional(
                "key_combo",
                ParamKind::String,
                "Special key to send: Enter, Tab, Up, Down, Left, Right, Escape, Backspace or Ctrl+<letter> (e.g. Ctrl+C). Optional.",
                Value::Null,
            ),
        ]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let text = optional_str(&args, "input_text");
        let key = optional_str(&args, "key_combo");
        self.broker.lock().await.send_input(text, key).await
    }
}

/// `get_shell_output{timeout_seconds=1}`
pub struct GetShellOutputTool {
    broker: SharedBroker,
}

impl GetShellOutputTool {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }
}

/// Seconds to wait for output; anything unusable falls back to one second.
fn read_timeout(args: &Value) -> Duration {
    let secs = match args.get("timeout_seconds") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match secs {
        Some(s) if s.is_finite() && s >= 0.0 => Duration::from_secs_f64(s),
        _ => Duration::from_secs(1),
    }
}

#[async_trait]
impl Tool for GetShellOutputTool {
    fn name(&self) -> &str {
        "get_shell_output"
    }

    fn description(&self) -> &str {
        "Read everything the container shell printed since the last read. Waits up to timeout_seconds for output to arrive."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::optional(
            "timeout_seconds",
            ParamKind::Number,
            "How long to wait for output (read window, not a strict sleep)",
            json!(1),
        )]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let timeout = read_timeout(&args);
        self.broker.lock().await.read_output(timeout).await
    }
}

/// `restart_shell_session{}`
pub struct RestartShellSessionTool {
    broker: SharedBroker,
}

impl RestartShellSessionTool {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl Tool for RestartShellSessionTool {
    fn name(&self) -> &str {
        "restart_shell_session"
    }

    fn description(&self) -> &str {
        "Force-terminate the container shell session. A new one starts on the next input."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![]
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        let mut broker = self.broker.lock().await;
        if !broker.is_enabled() {
            return Err(disabled_error());
        }
        broker.restart().await;
        Ok("Session terminated. It will restart on next input.".to_string())
    }
}
