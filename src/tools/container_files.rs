//! Copy files between the host and the container.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::ShellConfig;
use crate::error::ToolError;
use crate::runtime::ContainerEnvironment;

use super::shell_session::disabled_error;
use super::types::{string_list, ParamKind, Tool, ToolParam, ToolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToContainer,
    FromContainer,
}

/// Shared state of both copy tools.
struct CopyTarget {
    environment: Arc<dyn ContainerEnvironment>,
    enabled: bool,
    container: String,
}

impl CopyTarget {
    fn new(environment: Arc<dyn ContainerEnvironment>, config: &ShellConfig) -> Self {
        Self {
            environment,
            enabled: config.enable,
            container: config.container_name.clone(),
        }
    }

    /// Copy each source to the destination at the same index. Returns a JSON
    /// object mapping source to `"ok"` or the failure text.
    async fn copy_pairs(
        &self,
        direction: Direction,
        sources: Vec<String>,
        destinations: Vec<String>,
    ) -> ToolResult {
        if !self.enabled {
            return Err(disabled_error());
        }
        if sources.is_empty() {
            return Err(ToolError::execution("no paths given"));
        }
        if sources.len() != destinations.len() {
            return Err(ToolError::execution(format!(
                "source and destination lists must have the same length ({} vs {})",
                sources.len(),
                destinations.len()
            )));
        }
        if !self.environment.is_running(&self.container).await {
            return Err(ToolError::EnvironmentNotReady(format!(
                "{} container '{}' is not running. Please deploy it first.",
                self.environment.name(),
                self.container
            )));
        }

        let mut results = Map::new();
        for (source, destination) in sources.into_iter().zip(destinations) {
            let outcome = match direction {
                Direction::ToContainer => {
                    self.environment
                        .copy_in(&self.container, Path::new(&source), &destination)
                        .await
                }
                Direction::FromContainer => {
                    self.environment
                        .copy_out(&self.container, &source, Path::new(&destination))
                        .await
                }
            };
            let status = match outcome {
                Ok(()) => {
                    info!(?direction, source = %source, destination = %destination, "Copied");
                    "ok".to_string()
                }
                Err(e) => {
                    warn!(?direction, source = %source, error = %e, "Copy failed");
                    e.to_string()
                }
            };
            results.insert(source, Value::String(status));
        }
        Ok(Value::Object(results).to_string())
    }
}

/// `copy_to_container{host_paths, container_paths}`
pub struct CopyToContainerTool {
    target: CopyTarget,
}

impl CopyToContainerTool {
    pub fn new(environment: Arc<dyn ContainerEnvironment>, config: &ShellConfig) -> Self {
        Self {
            target: CopyTarget::new(environment, config),
        }
    }
}

#[async_trait]
impl Tool for CopyToContainerTool {
    fn name(&self) -> &str {
        "copy_to_container"
    }

    fn description(&self) -> &str {
        "Copy files from the host into the container. host_paths[i] is copied to container_paths[i]."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("host_paths", ParamKind::Array, "Absolute host source paths"),
            ToolParam::required(
                "container_paths",
                ParamKind::Array,
                "Destination paths inside the container, one per source",
            ),
        ]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let sources = string_list(&args, "host_paths")?;
        let destinations = string_list(&args, "container_paths")?;
        self.target
            .copy_pairs(Direction::ToContainer, sources, destinations)
            .await
    }
}

/// `copy_from_container{container_paths, host_paths}`
pub struct CopyFromContainerTool {
    target: CopyTarget,
}

impl CopyFromContainerTool {
    pub fn new(environment: Arc<dyn ContainerEnvironment>, config: &ShellConfig) -> Self {
        Self {
            target: CopyTarget::new(environment, config),
        }
    }
}

#[async_trait]
impl Tool for CopyFromContainerTool {
    fn name(&self) -> &str {
        "copy_from_container"
    }

    fn description(&self) -> &str {
        "Copy files out of the container to the host. container_paths[i] is copied to host_paths[i]."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required(
                "container_paths",
                ParamKind::Array,
                "Absolute source paths inside the container",
            ),
            ToolParam::required(
                "host_paths",
                ParamKind::Array,
                "Destination paths on the host, one per source",
            ),
        ]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let sources = string_list(&args, "container_paths")?;
        let destinations = string_list(&args, "host_paths")?;
        self.target
            .copy_pairs(Direction::FromContainer, sources, destinations)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{RuntimeError, RuntimeResult, ShellCommand};
    use serde_json::json;
    use std::sync::Mutex;

    /// Records copies; sources containing "missing" fail.
    #[derive(Default)]
    struct RecordingEnvironment {
        copies: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ContainerEnvironment for RecordingEnvironment {
        fn name(&self) -> &str {
            "test"
        }
        async fn is_running(&self, _container: &str) -> bool {
            true
        }
        async fn address(&self, _container: &str) -> Option<String> {
            None
        }
        fn shell_command(&self, _container: &str) -> ShellCommand {
            ShellCommand::new("true", &[])
        }
        async fn copy_in(&self, _c: &str, host: &Path, inside: &str) -> RuntimeResult<()> {
            let src = host.to_string_lossy().to_string();
            if src.contains("missing") {
                return Err(RuntimeError::CommandFailed("no such file".into()));
            }
            self.copies.lock().unwrap().push((src, inside.to_string()));
            Ok(())
        }
        async fn copy_out(&self, _c: &str, inside: &str, host: &Path) -> RuntimeResult<()> {
            self.copies
                .lock()
                .unwrap()
                .push((inside.to_string(), host.to_string_lossy().to_string()));
            Ok(())
        }
    }

    fn enabled() -> ShellConfig {
        ShellConfig {
            enable: true,
            ..ShellConfig::default()
        }
    }

    #[tokio::test]
    async fn test_copy_to_container_reports_each_pair() {
        let env = Arc::new(RecordingEnvironment::default());
        let tool = CopyToContainerTool::new(env.clone(), &enabled());
        let out = tool
            .execute(json!({
                "host_paths": ["/tmp/a.txt", "/tmp/missing.txt"],
                "container_paths": ["/work/a.txt", "/work/b.txt"]
            }))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["/tmp/a.txt"], "ok");
        assert_eq!(parsed["/tmp/missing.txt"], "no such file");
        assert_eq!(
            env.copies.lock().unwrap().clone(),
            vec![("/tmp/a.txt".to_string(), "/work/a.txt".to_string())]
        );
    }

    #[tokio::test]
    async fn test_copy_from_container() {
        let env = Arc::new(RecordingEnvironment::default());
        let tool = CopyFromContainerTool::new(env.clone(), &enabled());
        let out = tool
            .execute(json!({
                "container_paths": ["/work/out.log"],
                "host_paths": ["/tmp/out.log"]
            }))
            .await
            .unwrap();
        assert_eq!(out, r#"{"/work/out.log":"ok"}"#);
    }

    #[tokio::test]
    async fn test_length_mismatch() {
        let tool = CopyToContainerTool::new(Arc::new(RecordingEnvironment::default()), &enabled());
        let err = tool
            .execute(json!({"host_paths": ["/a", "/b"], "container_paths": ["/c"]}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn test_empty_lists() {
        let tool = CopyToContainerTool::new(Arc::new(RecordingEnvironment::default()), &enabled());
        assert!(tool
            .execute(json!({"host_paths": [], "container_paths": []}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_disabled() {
        let tool = CopyFromContainerTool::new(
            Arc::new(RecordingEnvironment::default()),
            &ShellConfig::default(),
        );
        let err = tool
            .execute(json!({"container_paths": ["/a"], "host_paths": ["/b"]}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Disabled(_)));
    }
}
