//! TCP relay worker.
//!
//! Runs inside the child process started by
//! [`PortForwardRelay`](crate::tools::port_forward::PortForwardRelay) via the
//! hidden `muli relay` subcommand. It binds the host port, prints `READY` on
//! stdout once listening, then pipes every accepted connection to the target
//! until both directions have closed.

use std::io::Write;
use std::time::Duration;

use nix::errno::Errno;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::error::Result;
use crate::log_component;

/// Line printed on stdout once the listener is bound.
pub const READY_LINE: &str = "READY";

/// Bind `0.0.0.0:listen_port`, announce readiness and relay forever.
pub async fn run(listen_port: u16, target: &str) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", listen_port)).await?;
    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", READY_LINE)?;
        stdout.flush()?;
    }
    log_component!(info, "relay", "Relay listening", listen_port = listen_port, target = target);
    serve(listener, target).await
}

/// Pause after an accept error. Descriptor and buffer exhaustion clear up
/// once connections close, so those back off; anything else retries at once.
fn accept_backoff(error: &std::io::Error) -> Duration {
    const EXHAUSTED: [Errno; 4] = [Errno::EMFILE, Errno::ENFILE, Errno::ENOBUFS, Errno::ENOMEM];
    match error.raw_os_error() {
        Some(code) if EXHAUSTED.iter().any(|e| *e as i32 == code) => Duration::from_millis(100),
        _ => Duration::ZERO,
    }
}

/// Accept loop. Each connection gets its own pair of copy tasks; accept
/// errors are logged and never end the loop.
pub async fn serve(listener: TcpListener, target: &str) -> Result<()> {
    loop {
        let (client, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Relay accept error");
                let pause = accept_backoff(&e);
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
                continue;
            }
        };
        let target = target.to_string();
        tokio::spawn(async move {
            match TcpStream::connect(&target).await {
                Ok(upstream) => {
                    debug!(%peer, %target, "Relaying connection");
                    pipe(client, upstream);
                }
                Err(e) => {
                    warn!(%peer, %target, error = %e, "Failed to reach relay target, dropping client");
                }
            }
        });
    }
}

/// Copy both directions independently. A side that reaches EOF shuts down the
/// opposite write half, so half-closes propagate.
fn pipe(client: TcpStream, upstream: TcpStream) {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut upstream_read, mut upstream_write) = upstream.into_split();

    tokio::spawn(async move {
        if let Err(e) = tokio::io::copy(&mut client_read, &mut upstream_write).await {
            debug!(error = %e, "client -> target copy ended");
        }
        let _ = upstream_write.shutdown().await;
    });
    tokio::spawn(async move {
        if let Err(e) = tokio::io::copy(&mut upstream_read, &mut client_write).await {
            debug!(error = %e, "target -> client copy ended");
        }
        let _ = client_write.shutdown().await;
    });
}
