//! OpenAI-compatible chat completions adapter
//!
//! Works against any endpoint speaking the Chat Completions wire format
//! (OpenAI, DeepSeek, local servers). `reasoning_content`, returned by
//! thinking models, is read from replies and sent back on assistant messages
//! that still carry it.
//!
//! Non-2xx replies map to [`ProviderError`] variants by status code so the
//! agent loop can tell auth failures from rate limits.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{MuliError, ProviderError, Result};
use crate::session::{Message, Role};

use super::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDescriptor, Usage};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// The model used when none is configured.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// A message in the wire format.
#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    /// Null for an assistant message that only calls tools
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireCallOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_content: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireCallOut {
    id: String,
    r#type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: ToolDescriptor,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireCallIn>>,
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCallIn {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// OpenAI-compatible oracle.
pub struct OpenAIProvider {
    api_key: String,
    api_base: String,
    model: String,
    client: Client,
}

impl OpenAIProvider {
    /// Create a provider for the public OpenAI endpoint.
    ///
    /// # Example
    /// ```
    /// use muli::providers::openai::OpenAIProvider;
    /// use muli::providers::LLMProvider;
    ///
    /// let provider = OpenAIProvider::new("sk-test").with_model("gpt-4o");
    /// assert_eq!(provider.default_model(), "gpt-4o");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_client(api_key, OPENAI_API_URL, Client::new())
    }

    /// Create a provider for any compatible endpoint (trailing slash is removed).
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self::with_client(api_key, api_base, Client::new())
    }

    /// Create a provider with a custom HTTP client (timeouts, proxies).
    pub fn with_client(api_key: &str, api_base: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            client,
        }
    }

    /// Build from config: endpoint, key, timeout and default model.
    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        let api_key = config
            .providers
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                MuliError::Config(
                    "no API key configured (set providers.api_key or MULI_PROVIDERS_API_KEY)"
                        .to_string(),
                )
            })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.providers.timeout_secs))
            .build()?;
        Ok(Self::with_client(&api_key, &config.providers.api_base, client)
            .with_model(&config.agent.model))
    }

    /// Override the default model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

fn convert_messages(messages: Vec<Message>) -> Vec<WireMessage> {
    messages
        .into_iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };

            let tool_calls = msg.tool_calls.filter(|tcs| !tcs.is_empty()).map(|tcs| {
                tcs.into_iter()
                    .map(|tc| WireCallOut {
                        id: tc.id,
                        r#type: "function",
                        function: WireFunction {
                            name: tc.name,
                            arguments: tc.arguments,
                        },
                    })
                    .collect()
            });

            WireMessage {
                role,
                content: if msg.content.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(msg.content)
                },
                tool_calls,
                tool_call_id: msg.tool_call_id,
                reasoning_content: msg.reasoning_content,
            }
        })
        .collect()
}

fn convert_tools(tools: Vec<ToolDescriptor>) -> Vec<WireTool> {
    tools
        .into_iter()
        .map(|function| WireTool {
            r#type: "function",
            function,
        })
        .collect()
}

fn convert_response(response: CompletionReply) -> Result<LLMResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| MuliError::Provider("response contained no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            // Some compatible servers omit the id; replies still need one.
            let id = if tc.id.is_empty() {
                format!("call_{}", Uuid::new_v4().simple())
            } else {
                tc.id
            };
            LLMToolCall::new(&id, &tc.function.name, &tc.function.arguments)
        })
        .collect();

    Ok(LLMResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        reasoning_content: choice.message.reasoning_content,
        usage: response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens)),
    })
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDescriptor>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let model = model.unwrap_or(&self.model);
        let request = CompletionRequest {
            model: model.to_string(),
            messages: convert_messages(messages),
            tools: if tools.is_empty() {
                None
            } else {
                Some(convert_tools(tools))
            },
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        debug!(model = %model, messages = request.messages.len(), "Chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorEnvelope>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(ProviderError::from_status(status, detail).into());
        }

        let body: CompletionReply = response
            .json()
            .await
            .map_err(|e| MuliError::Provider(format!("failed to parse response: {}", e)))?;

        let llm_response = convert_response(body)?;
        info!(
            tool_calls = llm_response.tool_calls.len(),
            total_tokens = llm_response.usage.map(|u| u.total()).unwrap_or(0),
            "Chat completion received"
        );
        Ok(llm_response)
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "openai"
    }
}
