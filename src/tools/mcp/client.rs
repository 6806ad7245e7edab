//! MCP client over HTTP (JSON-RPC POST, plain JSON or SSE-framed replies).

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult, McpTool,
    PROTOCOL_VERSION,
};
use crate::error::{MuliError, Result};

const SESSION_HEADER: &str = "mcp-session-id";

/// Upper bound on `tools/list` pages fetched from one server.
pub const MAX_LIST_PAGES: usize = 64;

/// Client for one remote capability server.
pub struct McpClient {
    name: String,
    url: String,
    http: reqwest::Client,
    next_id: AtomicI64,
    session_id: RwLock<Option<String>>,
}

impl McpClient {
    /// Create a client. No request is made until [`McpClient::initialize`].
    pub fn new(name: &str, url: &str, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            name: name.to_string(),
            url: url.to_string(),
            http,
            next_id: AtomicI64::new(1),
            session_id: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handshake: `initialize` followed by `notifications/initialized`.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: Implementation {
                name: "muli".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let result = self
            .request("initialize", Some(serde_json::to_value(&params)?))
            .await?;
        let result: InitializeResult = serde_json::from_value(result)?;

        self.notify("notifications/initialized", None).await?;

        info!(
            server = %self.name,
            url = %self.url,
            remote = %result.server_info.name,
            version = %result.server_info.version,
            "Connected to MCP server"
        );
        Ok(result)
    }

    /// All tools the server advertises, following pagination cursors.
    /// Listing stops early when a cursor repeats or after [`MAX_LIST_PAGES`].
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult =
                serde_json::from_value(self.request("tools/list", params).await?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen.insert(next.clone()) {
                        warn!(server = %self.name, cursor = %next, "MCP server repeated a list cursor");
                        break;
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }
        debug!(server = %self.name, count = tools.len(), "Listed MCP tools");
        Ok(tools)
    }

    /// Invoke a remote tool.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    fn post(&self) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream");
        if let Ok(guard) = self.session_id.read() {
            if let Some(id) = guard.as_deref() {
                builder = builder.header(SESSION_HEADER, id);
            }
        }
        builder
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let response = self.post().json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MuliError::Mcp(format!(
                "{} {} returned HTTP {}: {}",
                self.name, method, status, body
            )));
        }

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut guard) = self.session_id.write() {
                *guard = Some(session.to_string());
            }
        }

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);
        let body = response.text().await?;
        let reply = if is_sse {
            parse_sse_reply(&body, id)?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body)?
        };

        if let Some(error) = reply.error {
            return Err(MuliError::Mcp(format!(
                "{} {} failed ({}): {}",
                self.name, method, error.code, error.message
            )));
        }
        reply
            .result
            .ok_or_else(|| MuliError::Mcp(format!("{} {}: empty response", self.name, method)))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        let response = self.post().json(&notification).send().await?;
        if !response.status().is_success() {
            return Err(MuliError::Mcp(format!(
                "{} {} returned HTTP {}",
                self.name,
                method,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Pick the response for `id` out of an SSE body.
fn parse_sse_reply(body: &str, id: i64) -> Result<JsonRpcResponse> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<JsonRpcResponse>(data.trim()).ok())
        .find(|reply| reply.id.as_ref().and_then(Value::as_i64) == Some(id))
        .ok_or_else(|| MuliError::Mcp(format!("no response for request {} in event stream", id)))
}
