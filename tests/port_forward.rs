//! Port forwarding tests against the real relay binary.
//!
//! The container is faked: its address is 127.0.0.1 and the "container port"
//! is a local echo server, so these run without docker.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::resource::{setrlimit, Resource};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;
use tokio::sync::Mutex;

use muli::config::ShellConfig;
use muli::error::ToolError;
use muli::relay::READY_LINE;
use muli::runtime::{ContainerEnvironment, RuntimeResult, ShellCommand};
use muli::tools::port_forward::{ClosePortTool, ExposePortTool, ListPortsTool, PortForwardRelay};
use muli::tools::Tool;

/// A "container" that is the local host.
struct LoopbackEnvironment;

#[async_trait]
impl ContainerEnvironment for LoopbackEnvironment {
    fn name(&self) -> &str {
        "loopback"
    }

    async fn is_running(&self, _container: &str) -> bool {
        true
    }

    async fn address(&self, _container: &str) -> Option<String> {
        Some("127.0.0.1".to_string())
    }

    fn shell_command(&self, _container: &str) -> ShellCommand {
        ShellCommand::new("sh", &[])
    }

    async fn copy_in(&self, _c: &str, _host: &Path, _inside: &str) -> RuntimeResult<()> {
        Ok(())
    }

    async fn copy_out(&self, _c: &str, _inside: &str, _host: &Path) -> RuntimeResult<()> {
        Ok(())
    }
}

fn relay_config() -> ShellConfig {
    ShellConfig {
        enable: true,
        relay_program: Some(env!("CARGO_BIN_EXE_muli").to_string()),
        ..ShellConfig::default()
    }
}

fn new_relay() -> PortForwardRelay {
    PortForwardRelay::new(Arc::new(LoopbackEnvironment), &relay_config())
}

/// Echo server on an ephemeral port; returns the port.
async fn echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    port
}

async fn round_trip(host_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", host_port)).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn test_forward_reaches_container_port() {
    let target = echo_server().await;
    let mut relay = new_relay();

    let host_port = relay.expose(target, 0).await.unwrap();
    assert_ne!(host_port, 0);
    assert_eq!(round_trip(host_port, b"ping through relay").await, b"ping through relay");

    relay.close_all().await;
}

#[tokio::test]
async fn test_duplicate_host_port_rejected() {
    let target = echo_server().await;
    let mut relay = new_relay();

    let host_port = relay.expose(target, 0).await.unwrap();
    let err = relay.expose(target, host_port).await.unwrap_err();
    assert_eq!(err, ToolError::DuplicatePort(host_port));

    relay.close_all().await;
}

#[tokio::test]
async fn test_close_removes_forward() {
    let target = echo_server().await;
    let mut relay = new_relay();

    let host_port = relay.expose(target, 0).await.unwrap();
    assert_eq!(relay.list().len(), 1);

    relay.close(host_port).await.unwrap();
    assert!(relay.list().is_empty());
    assert!(TcpStream::connect(("127.0.0.1", host_port)).await.is_err());

    assert_eq!(
        relay.close(host_port).await.unwrap_err(),
        ToolError::PortNotFound(host_port)
    );
}

#[tokio::test]
async fn test_host_port_in_use_reports_failure() {
    let target = echo_server().await;
    let occupied = TcpListener::bind("0.0.0.0:0").await.unwrap();
    let busy_port = occupied.local_addr().unwrap().port();

    let mut relay = new_relay();
    let err = relay.expose(target, busy_port).await.unwrap_err();
    assert!(err
        .to_string()
        .contains(&format!("Port forwarder failed to start. Port {} might be in use.", busy_port)));
    assert!(relay.list().is_empty());
}

#[tokio::test]
async fn test_port_tools_text() {
    let target = echo_server().await;
    let relay = Arc::new(Mutex::new(new_relay()));
    let expose = ExposePortTool::new(Arc::clone(&relay));
    let list = ListPortsTool::new(Arc::clone(&relay));
    let close = ClosePortTool::new(Arc::clone(&relay));

    assert_eq!(
        list.execute(serde_json::json!({})).await.unwrap(),
        "No ports currently exposed."
    );

    let out = expose
        .execute(serde_json::json!({ "container_port": target }))
        .await
        .unwrap();
    let prefix = format!("Successfully exposed Container:{} -> Host:", target);
    assert!(out.starts_with(&prefix), "{}", out);
    let host_port: u16 = out[prefix.len()..].parse().unwrap();

    let listing = list.execute(serde_json::json!({})).await.unwrap();
    assert_eq!(
        listing,
        format!(
            "Active Port Forwards:\n  Host:{} -> Container:{} (127.0.0.1) (Active)",
            host_port, target
        )
    );

    let closed = close
        .execute(serde_json::json!({ "host_port": host_port }))
        .await
        .unwrap();
    assert_eq!(
        closed,
        format!("Port forwarding on host port {} stopped.", host_port)
    );

    relay.lock().await.close_all().await;
}

#[tokio::test]
async fn test_relay_survives_descriptor_exhaustion() {
    let target = echo_server().await;
    let listen_port = {
        let free = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        free.local_addr().unwrap().port()
    };

    let mut command = Command::new(env!("CARGO_BIN_EXE_muli"));
    command
        .args([
            "relay",
            "--listen-port",
            &listen_port.to_string(),
            "--target",
            &format!("127.0.0.1:{}", target),
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    // SAFETY: setrlimit is a single syscall, safe between fork and exec.
    unsafe {
        command.pre_exec(|| {
            setrlimit(Resource::RLIMIT_NOFILE, 24, 24).map_err(std::io::Error::from)
        });
    }
    let mut child = command.spawn().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap()).lines();
    let ready = tokio::time::timeout(Duration::from_secs(5), stdout.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ready.as_deref(), Some(READY_LINE));

    // Hold more connections open than the relay has descriptors for.
    let mut held = Vec::new();
    for _ in 0..30 {
        if let Ok(Ok(stream)) = tokio::time::timeout(
            Duration::from_secs(1),
            TcpStream::connect(("127.0.0.1", listen_port)),
        )
        .await
        {
            held.push(stream);
        }
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(child.try_wait().unwrap().is_none(), "relay exited under load");

    drop(held);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(child.try_wait().unwrap().is_none(), "relay exited after load");

    let reply = tokio::time::timeout(Duration::from_secs(5), round_trip(listen_port, b"still here"))
        .await
        .unwrap();
    assert_eq!(reply, b"still here");

    let _ = child.kill().await;
}
