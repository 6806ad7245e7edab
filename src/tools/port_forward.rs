//! On-demand TCP port forwarding from the host into the container.
//!
//! Each forward is a separate relay process (`muli relay ...`) keyed by host
//! port. [`PortForwardRelay`] owns the relay children; dropping it kills them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ShellConfig;
use crate::error::ToolError;
use crate::relay::READY_LINE;
use crate::runtime::ContainerEnvironment;

use super::shell_session::disabled_error;
use super::types::{port_arg, ParamKind, Tool, ToolParam, ToolResult};

const READY_TIMEOUT: Duration = Duration::from_secs(5);
const TERM_GRACE: Duration = Duration::from_secs(1);

/// One active forward.
#[derive(Debug)]
pub struct PortForward {
    pub host_port: u16,
    pub container_port: u16,
    pub target_address: String,
    child: Child,
}

impl PortForward {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn stop(mut self) {
        if let Some(pid) = self.child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        match tokio::time::timeout(TERM_GRACE, self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                debug!(host_port = self.host_port, "Relay ignored SIGTERM, killing");
                if let Err(e) = self.child.kill().await {
                    warn!(host_port = self.host_port, error = %e, "Failed to kill relay");
                }
            }
        }
    }
}

/// Manager of relay processes.
pub struct PortForwardRelay {
    environment: Arc<dyn ContainerEnvironment>,
    enabled: bool,
    container: String,
    relay_program: PathBuf,
    forwards: BTreeMap<u16, PortForward>,
}

impl PortForwardRelay {
    /// The relay program defaults to the running executable.
    pub fn new(environment: Arc<dyn ContainerEnvironment>, config: &ShellConfig) -> Self {
        let relay_program = config
            .relay_program
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| std::env::current_exe().ok())
            .unwrap_or_else(|| PathBuf::from("muli"));
        Self {
            environment,
            enabled: config.enable,
            container: config.container_name.clone(),
            relay_program,
            forwards: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Forward `host_port` (0 picks a free one) to `container_port`.
    /// Returns the host port in use.
    pub async fn expose(&mut self, container_port: u16, host_port: u16) -> Result<u16, ToolError> {
        if !self.enabled {
            return Err(disabled_error());
        }
        if container_port == 0 {
            return Err(ToolError::execution(
                "container_port must be between 1 and 65535",
            ));
        }
        if !self.environment.is_running(&self.container).await {
            return Err(ToolError::EnvironmentNotReady(format!(
                "{} container '{}' is not running. Please deploy it first.",
                self.environment.name(),
                self.container
            )));
        }
        let address = self
            .environment
            .address(&self.container)
            .await
            .ok_or_else(|| {
                ToolError::EnvironmentNotReady(format!(
                    "Could not determine IP for container '{}'.",
                    self.container
                ))
            })?;

        let host_port = if host_port == 0 {
            free_port().await.map_err(|e| {
                ToolError::execution(format!("could not find a free host port: {}", e))
            })?
        } else {
            host_port
        };

        self.prune();
        if self.forwards.contains_key(&host_port) {
            return Err(ToolError::DuplicatePort(host_port));
        }

        let target = format!("{}:{}", address, container_port);
        let child = self.spawn_relay(host_port, &target).await?;
        info!(host_port, container_port, target = %target, "Port forward started");
        self.forwards.insert(
            host_port,
            PortForward {
                host_port,
                container_port,
                target_address: address,
                child,
            },
        );
        Ok(host_port)
    }

    async fn spawn_relay(&self, host_port: u16, target: &str) -> Result<Child, ToolError> {
        let mut child = Command::new(&self.relay_program)
            .args(["relay", "--listen-port", &host_port.to_string(), "--target", target])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolError::execution(format!(
                    "failed to start relay {}: {}",
                    self.relay_program.display(),
                    e
                ))
            })?;

        let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            return Err(ToolError::execution("relay stdio was not captured"));
        };

        let mut lines = BufReader::new(stdout).lines();
        let ready = tokio::time::timeout(READY_TIMEOUT, async {
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim() == READY_LINE {
                    return true;
                }
            }
            false
        })
        .await;

        match ready {
            Ok(true) => {
                // Keep draining stderr so relay logging never blocks on a full pipe.
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(host_port, "relay: {}", line);
                    }
                });
                Ok(child)
            }
            Ok(false) => {
                let mut err = String::new();
                let _ = tokio::time::timeout(TERM_GRACE, stderr.read_to_string(&mut err)).await;
                let _ = child.kill().await;
                Err(ToolError::execution(format!(
                    "Port forwarder failed to start. Port {} might be in use. {}",
                    host_port,
                    err.trim()
                )))
            }
            Err(_) => {
                let _ = child.kill().await;
                Err(ToolError::execution(format!(
                    "Port forwarder on host port {} did not become ready within {}s",
                    host_port,
                    READY_TIMEOUT.as_secs()
                )))
            }
        }
    }

    /// Drop entries whose relay has exited.
    fn prune(&mut self) {
        self.forwards.retain(|port, forward| {
            let alive = forward.is_alive();
            if !alive {
                warn!(host_port = *port, "Relay process died, removing forward");
            }
            alive
        });
    }

    /// Active forwards sorted by host port.
    pub fn list(&mut self) -> Vec<&PortForward> {
        self.prune();
        self.forwards.values().collect()
    }

    /// Stop the relay for `host_port`.
    pub async fn close(&mut self, host_port: u16) -> Result<(), ToolError> {
        let forward = self
            .forwards
            .remove(&host_port)
            .ok_or(ToolError::PortNotFound(host_port))?;
        forward.stop().await;
        info!(host_port, "Port forward stopped");
        Ok(())
    }

    /// Stop every relay.
    pub async fn close_all(&mut self) {
        let forwards = std::mem::take(&mut self.forwards);
        for forward in forwards.into_values() {
            forward.stop().await;
        }
    }
}

/// Bind an ephemeral port and release it.
async fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
    Ok(listener.local_addr()?.port())
}

/// Shared handle used by the port tools.
pub type SharedRelay = Arc<Mutex<PortForwardRelay>>;

/// `expose_container_port{container_port, host_port=0}`
pub struct ExposePortTool {
    relay: SharedRelay,
}

impl ExposePortTool {
    pub fn new(relay: SharedRelay) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl Tool for ExposePortTool {
    fn name(&self) -> &str {
        "expose_container_port"
    }

    fn description(&self) -> &str {
        "Expose a TCP port from the container on the host. If host_port is 0 or omitted, a free port is chosen."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required(
                "container_port",
                ParamKind::Integer,
                "The port inside the container to expose",
            ),
            ToolParam::optional(
                "host_port",
                ParamKind::Integer,
                "The port on the host to bind to",
                json!(0),
            ),
        ]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let container_port = port_arg(&args, "container_port")?
            .ok_or_else(|| ToolError::execution("missing required argument 'container_port'"))?;
        let host_port = port_arg(&args, "host_port")?.unwrap_or(0);
        let host_port = self
            .relay
            .lock()
            .await
            .expose(container_port, host_port)
            .await?;
        Ok(format!(
            "Successfully exposed Container:{} -> Host:{}",
            container_port, host_port
        ))
    }
}

/// `list_exposed_ports{}`
pub struct ListPortsTool {
    relay: SharedRelay,
}

impl ListPortsTool {
    pub fn new(relay: SharedRelay) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl Tool for ListPortsTool {
    fn name(&self) -> &str {
        "list_exposed_ports"
    }

    fn description(&self) -> &str {
        "List all active container port forwards"
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![]
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        let mut relay = self.relay.lock().await;
        if !relay.is_enabled() {
            return Err(disabled_error());
        }
        let forwards = relay.list();
        if forwards.is_empty() {
            return Ok("No ports currently exposed.".to_string());
        }
        let mut lines = vec!["Active Port Forwards:".to_string()];
        lines.extend(forwards.iter().map(|f| {
            format!(
                "  Host:{} -> Container:{} ({}) (Active)",
                f.host_port, f.container_port, f.target_address
            )
        }));
        Ok(lines.join("\n"))
    }
}

/// `close_exposed_port{host_port}`
pub struct ClosePortTool {
    relay: SharedRelay,
}

impl ClosePortTool {
    pub fn new(relay: SharedRelay) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl Tool for ClosePortTool {
    fn name(&self) -> &str {
        "close_exposed_port"
    }

    fn description(&self) -> &str {
        "Stop forwarding the given host port"
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required(
            "host_port",
            ParamKind::Integer,
            "The host port to close the forwarding for",
        )]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let host_port = port_arg(&args, "host_port")?
            .ok_or_else(|| ToolError::execution("missing required argument 'host_port'"))?;
        let mut relay = self.relay.lock().await;
        if !relay.is_enabled() {
            return Err(disabled_error());
        }
        relay.close(host_port).await?;
        Ok(format!("Port forwarding on host port {} stopped.", host_port))
    }
}
