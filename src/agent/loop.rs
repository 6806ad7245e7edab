//! Agent loop implementation
//!
//! One call to [`AgentLoop::process`] is one user turn:
//!
//! ```text
//! AwaitingInput -> ModelTurn -> (ToolTurn -> ModelTurn)* -> Done -> AwaitingInput
//! ```
//!
//! The model is called with the full history and the registry's descriptors.
//! Tool calls are run one at a time, in the order the model issued them, and
//! each result is appended as a `tool` message before the model is asked
//! again. When the model answers with plain content the turn ends, the history
//! is compacted if it grew past the budget, and the conversation is saved.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::{AgentConfig, CompactionConfig, Config};
use crate::error::Result;
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{ConversationStore, DisplayKind, DisplayLog, Message, Role};
use crate::tools::{ToolDispatcher, ToolRegistry};
use crate::utils::string::preview;

use super::context::{ContextManager, ContextState};

/// Where the loop is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    ModelTurn,
    ToolTurn,
    Done,
}

/// Progress reported while a turn runs, for live console output.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Text the model sent alongside tool calls.
    Commentary(String),
    /// A tool call about to run.
    ToolCall { name: String, arguments: String },
    /// A finished tool call, truncated for display.
    ToolResult { name: String, preview: String },
}

/// The conversation driver.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use muli::agent::AgentLoop;
/// use muli::config::Config;
/// use muli::providers::OpenAIProvider;
/// use muli::session::{ConversationStore, DisplayLog};
/// use muli::tools::ToolRegistry;
///
/// let config = Config::load()?;
/// let provider = Arc::new(OpenAIProvider::from_config(&config)?);
/// let mut agent = AgentLoop::new(
///     provider,
///     ToolRegistry::new(),
///     ConversationStore::new_memory(),
///     DisplayLog::new_memory(),
///     &config,
/// );
/// let answer = agent.process("Hello").await?;
/// ```
pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    dispatcher: ToolDispatcher,
    context: ContextManager,
    store: ConversationStore,
    display: DisplayLog,
    agent: AgentConfig,
    compaction: CompactionConfig,
    messages: Vec<Message>,
    state: LoopState,
    context_state: ContextState,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl AgentLoop {
    /// Create a loop whose history holds only the system prompt.
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        registry: ToolRegistry,
        store: ConversationStore,
        display: DisplayLog,
        config: &Config,
    ) -> Self {
        let options = chat_options(&config.agent);
        let mut context = ContextManager::new(Arc::clone(&provider)).with_options(options);
        if !config.agent.model.is_empty() {
            context = context.with_model(&config.agent.model);
        }
        let messages = vec![Message::system(&config.agent.system_prompt)];
        let context_state = ContextState {
            token_count: ContextManager::estimate_tokens(&messages),
            budget: config.compaction.context_limit,
            compacted: false,
        };

        Self {
            provider,
            dispatcher: ToolDispatcher::new(registry),
            context,
            store,
            display,
            agent: config.agent.clone(),
            compaction: config.compaction.clone(),
            messages,
            state: LoopState::AwaitingInput,
            context_state,
            events: None,
        }
    }

    /// Send progress events to `sink`.
    pub fn with_events(mut self, sink: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Resume the saved conversation. The configured system prompt always
    /// replaces whatever prompt was saved.
    pub async fn load_history(&mut self) -> Result<()> {
        let mut saved = self.store.load().await?;
        let prompt = Message::system(&self.agent.system_prompt);
        match saved.first_mut() {
            Some(first) if first.role == Role::System => *first = prompt,
            _ => saved.insert(0, prompt),
        }
        info!(messages = saved.len(), "Conversation restored");
        self.messages = saved;
        self.refresh_context_state(false);
        Ok(())
    }

    /// Drop the conversation, keeping only the system prompt.
    pub async fn reset(&mut self) -> Result<()> {
        self.store.clear().await?;
        self.messages = vec![Message::system(&self.agent.system_prompt)];
        self.refresh_context_state(false);
        info!("Conversation reset");
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn context_state(&self) -> ContextState {
        self.context_state
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub fn display(&self) -> &DisplayLog {
        &self.display
    }

    /// Run one user turn and return the final answer.
    ///
    /// An oracle failure is returned as `Err`; the user message stays in the
    /// saved history.
    pub async fn process(&mut self, input: &str) -> Result<String> {
        // AwaitingInput
        for message in &mut self.messages {
            message.reasoning_content = None;
        }
        self.messages.push(Message::user(input));
        self.display.log("user", input, DisplayKind::Text).await;
        self.transition(LoopState::ModelTurn);

        let descriptors = self.dispatcher.registry().descriptors().to_vec();
        let model = (!self.agent.model.is_empty()).then(|| self.agent.model.clone());
        let options = chat_options(&self.agent);
        let max_iterations = self.agent.max_tool_iterations;
        let mut iterations = 0;

        let answer = loop {
            // ModelTurn
            let response = match self
                .provider
                .chat(
                    self.messages.clone(),
                    descriptors.clone(),
                    model.as_deref(),
                    options.clone(),
                )
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(provider = %self.provider.name(), error = %e, "Oracle call failed");
                    if let Err(save_err) = self.store.save(&self.messages).await {
                        warn!(error = %save_err, "Failed to save conversation");
                    }
                    self.transition(LoopState::AwaitingInput);
                    return Err(e);
                }
            };
            if let Some(usage) = response.usage {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "Oracle usage"
                );
            }

            if !response.has_tool_calls() {
                let content = response.content.clone();
                self.messages.push(response.into_message());
                break content;
            }

            if iterations >= max_iterations {
                warn!(iterations, "Tool loop reached maximum iterations");
                let text = format!(
                    "Stopped after {} rounds of tool calls without reaching a final answer. \
                     Ask me to continue if more work is needed.",
                    iterations
                );
                self.messages.push(
                    Message::assistant(&text).with_reasoning(response.reasoning_content.clone()),
                );
                break text;
            }
            iterations += 1;
            debug!("Tool iteration {} of {}", iterations, max_iterations);

            if !response.content.trim().is_empty() {
                self.display
                    .log("assistant", &response.content, DisplayKind::Markdown)
                    .await;
                self.emit(AgentEvent::Commentary(response.content.clone()));
            }
            let calls = response.tool_calls.clone();
            self.messages.push(response.into_message());

            // ToolTurn
            self.transition(LoopState::ToolTurn);
            for call in calls {
                info!(tool = %call.name, id = %call.id, "Executing tool");
                self.emit(AgentEvent::ToolCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
                self.display
                    .log(
                        "tool",
                        &format!("{}({})", call.name, call.arguments),
                        DisplayKind::Tool,
                    )
                    .await;

                let result = self.dispatcher.invoke(&call.name, &call.arguments).await;

                let shown = preview(&result, self.agent.console_preview_chars);
                self.display.log("tool", &shown, DisplayKind::Tool).await;
                self.emit(AgentEvent::ToolResult {
                    name: call.name.clone(),
                    preview: shown,
                });
                self.messages.push(Message::tool_result(&call.id, &result));
            }
            self.transition(LoopState::ModelTurn);
        };

        // Done
        self.transition(LoopState::Done);
        self.display
            .log("assistant", &answer, DisplayKind::Markdown)
            .await;

        let mut compacted = false;
        if self.compaction.enabled {
            let before = self.messages.len();
            let history = std::mem::take(&mut self.messages);
            self.messages = self
                .context
                .maybe_compact(history, self.compaction.context_limit)
                .await;
            compacted = self.messages.len() < before;
        }
        self.refresh_context_state(compacted);

        let saved = self.store.save(&self.messages).await;
        self.transition(LoopState::AwaitingInput);
        saved?;

        info!(
            tool_rounds = iterations,
            tokens = self.context_state.token_count,
            compacted,
            "Turn complete"
        );
        Ok(answer)
    }

    fn transition(&mut self, next: LoopState) {
        trace!(from = ?self.state, to = ?next, "Loop state");
        self.state = next;
    }

    fn refresh_context_state(&mut self, compacted: bool) {
        self.context_state = ContextState {
            token_count: ContextManager::estimate_tokens(&self.messages),
            budget: self.compaction.context_limit,
            compacted,
        };
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(sink) = &self.events {
            let _ = sink.send(event);
        }
    }
}

fn chat_options(agent: &AgentConfig) -> ChatOptions {
    ChatOptions::new()
        .with_max_tokens(agent.max_tokens)
        .with_temperature(agent.temperature)
}
