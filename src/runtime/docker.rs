//! Docker environment implementation
//!
//! Talks to an already-running container through the docker CLI.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{ContainerEnvironment, RuntimeError, RuntimeResult, ShellCommand};

const ADDRESS_FORMAT: &str = "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}";

/// Docker-backed [`ContainerEnvironment`].
#[derive(Debug, Clone)]
pub struct DockerEnvironment {
    /// Docker CLI binary
    program: String,
}

impl DockerEnvironment {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }

    /// Use a different CLI binary (e.g. `podman`).
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Run the CLI to completion and return trimmed stdout.
    async fn run(&self, args: &[&str]) -> RuntimeResult<String> {
        debug!(program = %self.program, ?args, "Running container command");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(RuntimeError::CommandFailed(if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            }))
        }
    }
}

impl Default for DockerEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEnvironment for DockerEnvironment {
    fn name(&self) -> &str {
        "docker"
    }

    async fn is_running(&self, container: &str) -> bool {
        let filter = format!("name={}", container);
        self.run(&["ps", "-q", "-f", &filter])
            .await
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    async fn address(&self, container: &str) -> Option<String> {
        self.run(&["inspect", "-f", ADDRESS_FORMAT, container])
            .await
            .ok()
            .filter(|ip| !ip.is_empty())
    }

    fn shell_command(&self, container: &str) -> ShellCommand {
        ShellCommand::new(
            &self.program,
            &["exec", "-it", container, "env", "TERM=xterm", "bash"],
        )
    }

    async fn copy_in(&self, container: &str, host: &Path, inside: &str) -> RuntimeResult<()> {
        let src = host.to_string_lossy();
        let dst = format!("{}:{}", container, inside);
        self.run(&["cp", &src, &dst]).await.map(|_| ())
    }

    async fn copy_out(&self, container: &str, inside: &str, host: &Path) -> RuntimeResult<()> {
        let src = format!("{}:{}", container, inside);
        let dst = host.to_string_lossy();
        self.run(&["cp", &src, &dst]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_command() {
        let env = DockerEnvironment::new();
        assert_eq!(env.name(), "docker");
        assert_eq!(
            env.shell_command("box"),
            ShellCommand::new(
                "docker",
                &["exec", "-it", "box", "env", "TERM=xterm", "bash"]
            )
        );
    }

    #[test]
    fn test_with_program() {
        let env = DockerEnvironment::default().with_program("podman");
        assert_eq!(env.shell_command("box").program, "podman");
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_running() {
        let env = DockerEnvironment::new().with_program("/nonexistent/docker-cli");
        assert!(!env.is_running("box").await);
        assert!(env.address("box").await.is_none());
        let err = env
            .copy_in("box", Path::new("/tmp/x"), "/tmp/x")
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_docker_container_not_running() {
        let env = DockerEnvironment::new();
        assert!(!env.is_running("muli-definitely-not-a-container").await);
    }
}
