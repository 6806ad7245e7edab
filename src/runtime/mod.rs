//! Container runtime module for muli
//!
//! The shell and port-forwarding tools never talk to docker directly. They go
//! through [`ContainerEnvironment`], which answers three questions about a
//! named container (is it running, what is its address, how do I get a shell
//! in it) and moves files in and out of it.

pub mod docker;

pub use docker::DockerEnvironment;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from container commands.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The runtime binary could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited non-zero.
    #[error("{0}")]
    CommandFailed(String),
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Program and arguments for the interactive shell child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Build an unconfigured tokio command for this program line.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Access to the isolated environment the shell tools operate on.
#[async_trait]
pub trait ContainerEnvironment: Send + Sync {
    /// Runtime name for logs.
    fn name(&self) -> &str;

    /// Whether `container` exists and is running.
    async fn is_running(&self, container: &str) -> bool;

    /// Network address of `container`, if it has one.
    async fn address(&self, container: &str) -> Option<String>;

    /// Command that attaches an interactive shell to `container`.
    fn shell_command(&self, container: &str) -> ShellCommand;

    /// Copy a host file or directory into the container.
    async fn copy_in(&self, container: &str, host: &Path, inside: &str) -> RuntimeResult<()>;

    /// Copy a file or directory out of the container to the host.
    async fn copy_out(&self, container: &str, inside: &str, host: &Path) -> RuntimeResult<()>;
}
