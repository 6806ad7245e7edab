//! End-to-end tests for the agent loop
//!
//! These exercise AgentLoop with the registry, dispatcher, context manager and
//! on-disk persistence together. The oracle is always a mock provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use muli::agent::{AgentLoop, ContextManager, SUMMARY_MARKER};
use muli::config::Config;
use muli::error::{MuliError, Result};
use muli::providers::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDescriptor};
use muli::session::{ConversationStore, DisplayKind, DisplayLog, Message, Role};
use muli::tools::{
    builtin_tools, ParamKind, Tool, ToolParam, ToolRegistry, ToolResult,
};

// ============================================================================
// Fixtures
// ============================================================================

/// Echoes the `x` argument back as text.
struct EchoX;

#[async_trait]
impl Tool for EchoX {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return x"
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required("x", ParamKind::Integer, "Value to return")]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        Ok(args["x"].to_string())
    }
}

/// Calls `echo` with `{"x":42}` once, then answers with the tool output.
/// Records every request it receives.
#[derive(Default)]
struct ToolThenAnswer {
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

#[async_trait]
impl LLMProvider for ToolThenAnswer {
    fn name(&self) -> &str {
        "mock-tool"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        _tools: Vec<ToolDescriptor>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> Result<LLMResponse> {
        self.seen.lock().unwrap().push(messages.clone());
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(LLMResponse::with_tools(
                "",
                vec![LLMToolCall::new("c1", "echo", r#"{"x":42}"#)],
            ))
        } else {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(LLMResponse::text(&format!("The tool said {}", last)))
        }
    }
}

/// Answers turns with a long reply and summary requests (no tools) with a
/// short summary, or an error when `fail_summary` is set.
struct Verbose {
    fail_summary: bool,
    summaries: AtomicUsize,
}

#[async_trait]
impl LLMProvider for Verbose {
    fn name(&self) -> &str {
        "mock-verbose"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn chat(
        &self,
        _messages: Vec<Message>,
        tools: Vec<ToolDescriptor>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> Result<LLMResponse> {
        if tools.is_empty() {
            self.summaries.fetch_add(1, Ordering::SeqCst);
            if self.fail_summary {
                return Err(MuliError::Provider("summary unavailable".into()));
            }
            return Ok(LLMResponse::text("User asked for a long story."));
        }
        Ok(LLMResponse::text(&"once upon a time ".repeat(100)))
    }
}

/// Appends `start:<tag>` and `end:<tag>` to a shared journal, sleeping
/// `delay_ms` in between.
struct Journal(Arc<Mutex<Vec<String>>>);

#[async_trait]
impl Tool for Journal {
    fn name(&self) -> &str {
        "journal"
    }

    fn description(&self) -> &str {
        "Record a tag"
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("tag", ParamKind::String, "Tag to record"),
            ToolParam::required("delay_ms", ParamKind::Integer, "Pause before finishing"),
        ]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let tag = args["tag"].as_str().unwrap_or_default().to_string();
        self.0.lock().unwrap().push(format!("start:{}", tag));
        let delay = args["delay_ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        self.0.lock().unwrap().push(format!("end:{}", tag));
        Ok(format!("recorded {}", tag))
    }
}

/// Requests two `journal` calls in one reply, the first one slow.
struct Batch(AtomicUsize);

#[async_trait]
impl LLMProvider for Batch {
    fn name(&self) -> &str {
        "mock-batch"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn chat(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<ToolDescriptor>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> Result<LLMResponse> {
        if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(LLMResponse::with_tools(
                "",
                vec![
                    LLMToolCall::new("c1", "journal", r#"{"tag":"first","delay_ms":50}"#),
                    LLMToolCall::new("c2", "journal", r#"{"tag":"second","delay_ms":0}"#),
                ],
            ))
        } else {
            Ok(LLMResponse::text("both recorded"))
        }
    }
}

fn registry_with(tools: Vec<Arc<dyn Tool>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register_local(tool);
    }
    registry
}

fn agent(provider: Arc<dyn LLMProvider>, registry: ToolRegistry, config: &Config) -> AgentLoop {
    AgentLoop::new(
        provider,
        registry,
        ConversationStore::new_memory(),
        DisplayLog::new_memory(),
        config,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_tool_call_message_ordering() {
    let provider = Arc::new(ToolThenAnswer::default());
    let mut agent = agent(
        provider.clone(),
        registry_with(vec![Arc::new(EchoX)]),
        &Config::default(),
    );

    let answer = agent.process("what is x?").await.unwrap();
    assert_eq!(answer, "The tool said 42");

    let messages = agent.messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1], Message::user("what is x?"));

    let calls = messages[2].tool_calls.as_ref().unwrap();
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "c1");
    assert_eq!(calls[0].name, "echo");
    assert_eq!(calls[0].arguments, r#"{"x":42}"#);

    assert_eq!(messages[3], Message::tool_result("c1", "42"));
    assert_eq!(messages[4].role, Role::Assistant);
    assert!(!messages[4].has_tool_calls());

    // The second oracle request already carried the tool result last.
    let seen = provider.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].last().unwrap(), &Message::tool_result("c1", "42"));
}

#[tokio::test]
async fn test_unknown_tool_reported_to_model() {
    struct CallsMissing(AtomicUsize);

    #[async_trait]
    impl LLMProvider for CallsMissing {
        fn name(&self) -> &str {
            "mock-missing"
        }
        fn default_model(&self) -> &str {
            "mock-model"
        }
        async fn chat(
            &self,
            _messages: Vec<Message>,
            _tools: Vec<ToolDescriptor>,
            _model: Option<&str>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(LLMResponse::with_tools(
                    "",
                    vec![LLMToolCall::new("c9", "does_not_exist", "{}")],
                ))
            } else {
                Ok(LLMResponse::text("Sorry, that tool is missing."))
            }
        }
    }

    let mut agent = agent(
        Arc::new(CallsMissing(AtomicUsize::new(0))),
        registry_with(builtin_tools()),
        &Config::default(),
    );
    let answer = agent.process("use a tool").await.unwrap();
    assert_eq!(answer, "Sorry, that tool is missing.");

    let result = agent
        .messages()
        .iter()
        .find(|m| m.is_tool_result())
        .unwrap();
    assert_eq!(result.tool_call_id.as_deref(), Some("c9"));
    assert_eq!(
        result.content,
        "Error: ToolNotFound: no tool named 'does_not_exist'"
    );
}

#[tokio::test]
async fn test_compaction_over_budget() {
    let mut config = Config::default();
    config.compaction.context_limit = 200;
    let provider = Arc::new(Verbose {
        fail_summary: false,
        summaries: AtomicUsize::new(0),
    });
    let mut agent = agent(provider.clone(), registry_with(builtin_tools()), &config);

    let answer = agent.process("tell me a long story").await.unwrap();
    assert!(answer.starts_with("once upon a time"));
    assert_eq!(provider.summaries.load(Ordering::SeqCst), 1);

    let messages = agent.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::System);
    assert_eq!(
        messages[1].content,
        format!("{}User asked for a long story.", SUMMARY_MARKER)
    );

    let state = agent.context_state();
    assert!(state.compacted);
    assert_eq!(state.token_count, ContextManager::estimate_tokens(messages));
    assert!(state.token_count <= state.budget);
}

#[tokio::test]
async fn test_compaction_failure_keeps_history() {
    let mut config = Config::default();
    config.compaction.context_limit = 200;
    let provider = Arc::new(Verbose {
        fail_summary: true,
        summaries: AtomicUsize::new(0),
    });
    let mut agent = agent(provider.clone(), registry_with(builtin_tools()), &config);

    agent.process("tell me a long story").await.unwrap();
    assert_eq!(provider.summaries.load(Ordering::SeqCst), 1);
    assert_eq!(agent.messages().len(), 3);
    assert!(!agent.context_state().compacted);
}

#[tokio::test]
async fn test_compaction_disabled() {
    let mut config = Config::default();
    config.compaction.enabled = false;
    config.compaction.context_limit = 10;
    let provider = Arc::new(Verbose {
        fail_summary: false,
        summaries: AtomicUsize::new(0),
    });
    let mut agent = agent(provider.clone(), registry_with(builtin_tools()), &config);

    agent.process("tell me a long story").await.unwrap();
    assert_eq!(provider.summaries.load(Ordering::SeqCst), 0);
    assert_eq!(agent.messages().len(), 3);
}

#[tokio::test]
async fn test_history_persists_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.agent.system_prompt = "first prompt".to_string();

    {
        let provider = Arc::new(ToolThenAnswer::default());
        let mut agent = AgentLoop::new(
            provider,
            registry_with(vec![Arc::new(EchoX)]),
            ConversationStore::with_dir(dir.path()).unwrap(),
            DisplayLog::with_dir(dir.path()).unwrap(),
            &config,
        );
        agent.process("what is x?").await.unwrap();
    }

    config.agent.system_prompt = "second prompt".to_string();
    let mut agent = AgentLoop::new(
        Arc::new(ToolThenAnswer::default()),
        registry_with(vec![Arc::new(EchoX)]),
        ConversationStore::with_dir(dir.path()).unwrap(),
        DisplayLog::with_dir(dir.path()).unwrap(),
        &config,
    );
    agent.load_history().await.unwrap();

    let messages = agent.messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0], Message::system("second prompt"));
    assert_eq!(messages[3], Message::tool_result("c1", "42"));

    let display = agent.display().entries();
    assert_eq!(display.first().unwrap().role, "user");
    assert_eq!(display.first().unwrap().kind, DisplayKind::Text);
    assert_eq!(display.last().unwrap().kind, DisplayKind::Markdown);
}

#[tokio::test]
async fn test_corrupt_history_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("conversation.json"), "{not json").unwrap();

    let mut agent = AgentLoop::new(
        Arc::new(ToolThenAnswer::default()),
        ToolRegistry::new(),
        ConversationStore::with_dir(dir.path()).unwrap(),
        DisplayLog::new_memory(),
        &Config::default(),
    );
    assert!(matches!(
        agent.load_history().await,
        Err(MuliError::Session(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batched_tool_calls_run_in_request_order() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let mut agent = agent(
        Arc::new(Batch(AtomicUsize::new(0))),
        registry_with(vec![Arc::new(Journal(Arc::clone(&journal)))]),
        &Config::default(),
    );

    assert_eq!(agent.process("record two").await.unwrap(), "both recorded");

    // Sequential: the slow first call finishes before the second starts.
    assert_eq!(
        *journal.lock().unwrap(),
        ["start:first", "end:first", "start:second", "end:second"]
    );

    let messages = agent.messages();
    assert_eq!(messages.len(), 6);
    let requested: Vec<&str> = messages[2]
        .tool_calls
        .as_ref()
        .unwrap()
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    assert_eq!(requested, ["c1", "c2"]);
    assert_eq!(messages[3], Message::tool_result("c1", "recorded first"));
    assert_eq!(messages[4], Message::tool_result("c2", "recorded second"));
    assert_eq!(messages[5].role, Role::Assistant);
}
