//! The conversation loop.
//!
//! One user message drives one turn: the accumulated history plus a
//! freshly computed system prompt go to the model, the stream is folded
//! into a finalized assistant message, requested tools run strictly in
//! order, and the loop repeats until a round produces no tool calls or
//! a terminal condition ends the turn. Every finalized message is
//! appended to the session store before the next round starts.

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiClient, ChatRequest, StreamEvent, StreamResult};
use crate::error::Result;
use crate::events::{EngineEvent, EventSender, ToolStatus};
use crate::mcp::McpManager;
use crate::models::{Message, Mode, ToolCall};
use crate::parser::{self, ParsedOutput};
use crate::session::SessionStore;
use crate::tools::{self, ToolOutput};

/// Cumulative usage at which the engine warns the user.
pub const SOFT_TOKEN_LIMIT: u64 = 180_000;
/// Cumulative usage at which the session is retired. The next user
/// input starts a fresh session.
pub const HARD_TOKEN_LIMIT: u64 = 200_000;

const STREAM_CHANNEL_CAPACITY: usize = 64;
const TRUNCATION_PREVIEW_BYTES: usize = 500;

pub struct Engine {
    client: ApiClient,
    model: String,
    mode: Mode,
    history: Vec<Message>,
    session_id: Option<String>,
    store: Option<Arc<SessionStore>>,
    mcp: Option<Arc<tokio::sync::Mutex<McpManager>>>,
    total_tokens: u64,
    budget_exhausted: bool,
    budget_warned: bool,
    cancel_token: CancellationToken,
}

impl Engine {
    pub fn new(client: ApiClient, model: &str, mode: Mode) -> Self {
        Self {
            client,
            model: model.to_string(),
            mode,
            history: Vec::new(),
            session_id: None,
            store: None,
            mcp: None,
            total_tokens: 0,
            budget_exhausted: false,
            budget_warned: false,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn set_session(&mut self, session_id: String, store: Arc<SessionStore>) {
        self.session_id = Some(session_id);
        self.store = Some(store);
    }

    pub fn set_mcp_manager(&mut self, manager: Arc<tokio::sync::Mutex<McpManager>>) {
        self.mcp = Some(manager);
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Replace the cancel token and return a handle the caller can
    /// trigger. Armed once per turn.
    pub fn arm_cancel(&mut self) -> CancellationToken {
        self.cancel_token = CancellationToken::new();
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Restore in-memory history from a previously persisted transcript.
    pub fn load_history(&mut self, messages: Vec<Message>) {
        self.history = messages;
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Run one full turn for a user message. `file_context` carries
    /// pre-materialized attached-file blocks (see [`format_file_context`]).
    pub async fn send_message(
        &mut self,
        user_input: &str,
        file_context: Option<&str>,
        events: &EventSender,
    ) -> Result<()> {
        self.rotate_session_if_exhausted(events).await?;

        let api_content = match file_context {
            Some(ctx) => format!("{}\n\nUser request: {}", ctx, user_input),
            None => user_input.to_string(),
        };

        self.history.push(Message::user(api_content.clone()));
        if let (Some(session_id), Some(store)) = (&self.session_id, &self.store) {
            store.maybe_title_session(session_id, user_input)?;
            store.save_message(session_id, "user", &api_content, None, None, None)?;
        }

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            let _ = events.send(EngineEvent::StreamStart).await;

            let round = self.run_stream_round(events).await;
            let result = match round {
                Ok(r) => r,
                Err(e) => {
                    // Transport-level failure: record it in the transcript
                    // and end the turn.
                    let content = format!("[Error: {}]", e);
                    let _ = events.send(EngineEvent::Error(e.to_string())).await;
                    self.finalize_assistant(content, Vec::new(), Vec::new(), events)
                        .await?;
                    break;
                }
            };

            let parsed = parser::parse_assistant_text(&result.content);
            let reasoning_blob = result.reasoning_details.clone();

            // Reasoning the model inlined as <think> tags was carved out
            // of the content stream. The structured channel already went
            // out as deltas, so emit only the joined tail: accumulated
            // reasoning deltas then equal both streams joined by a
            // single newline.
            let structured_reasoning = result.reasoning_details.concat();
            let combined_reasoning = join_reasoning(&structured_reasoning, &parsed.reasoning);
            let reasoning_tail = &combined_reasoning[structured_reasoning.len()..];
            if !reasoning_tail.is_empty() {
                let _ = events
                    .send(EngineEvent::ReasoningDelta(reasoning_tail.to_string()))
                    .await;
            }

            let mut final_tool_calls = if result.tool_calls.is_empty() {
                synthesize_xml_tool_calls(&parsed)
            } else {
                result.tool_calls.clone()
            };

            // A cancelled round never surfaces a call whose arguments
            // are not closed JSON.
            if result.cancelled {
                final_tool_calls.retain(|tc| {
                    serde_json::from_str::<Value>(&tc.function.arguments).is_ok()
                });
            }

            let final_content = finalize_content(&parsed, &final_tool_calls, &result);

            self.finalize_assistant(final_content, final_tool_calls.clone(), reasoning_blob, events)
                .await?;

            self.track_usage(&result, events).await;

            if result.error.is_some() {
                self.fail_pending_tools(&final_tool_calls, "Error: not executed (stream error)", events)
                    .await?;
                break;
            }

            if result.cancelled || self.cancel_token.is_cancelled() {
                // Invariant repair: every surfaced call still gets a result.
                self.fail_pending_tools(&final_tool_calls, "Error: cancelled before execution", events)
                    .await?;
                break;
            }

            if final_tool_calls.is_empty() {
                break;
            }

            self.run_tools(&final_tool_calls, events).await?;
        }

        let _ = events.send(EngineEvent::TurnDone).await;
        Ok(())
    }

    /// One model round: send the request, forward stream events, and
    /// collect the accumulated result.
    async fn run_stream_round(&self, events: &EventSender) -> Result<StreamResult> {
        let mut tool_defs = tools::definitions(self.mode);
        if let Some(mcp) = &self.mcp {
            if let Ok(manager) = mcp.try_lock() {
                tool_defs.extend(match self.mode {
                    Mode::Builder => manager.tool_definitions(),
                    Mode::Plan => manager.read_only_tool_definitions(),
                });
            }
        }

        let mut messages = vec![Message::system(self.system_prompt())];
        messages.extend(self.history.iter().cloned());

        let request = ChatRequest::new(&self.model, messages, Some(tool_defs));
        let response = self.client.send_chat_request(&request).await?;

        let (stream_tx, mut stream_rx) =
            mpsc::channel::<StreamEvent>(STREAM_CHANNEL_CAPACITY);
        let forward_events = events.clone();
        let forward = tokio::spawn(async move {
            while let Some(event) = stream_rx.recv().await {
                let mapped = match event {
                    StreamEvent::ReasoningChunk(text) => EngineEvent::ReasoningDelta(text),
                    StreamEvent::ContentChunk(text) => EngineEvent::ContentDelta(text),
                    StreamEvent::ToolCallDelta(calls) => EngineEvent::ToolCallSnapshot(calls),
                    StreamEvent::Error(message) => EngineEvent::Error(message),
                    StreamEvent::Done(..) => continue,
                };
                if forward_events.send(mapped).await.is_err() {
                    break;
                }
            }
        });

        let result =
            api::process_stream(response, &stream_tx, &self.cancel_token).await;
        drop(stream_tx);
        let _ = forward.await;
        result
    }

    async fn track_usage(&mut self, result: &StreamResult, events: &EventSender) {
        if result.usage.total_tokens > 0 {
            self.total_tokens += result.usage.total_tokens;
            let _ = events
                .send(EngineEvent::TokenUsage {
                    prompt_tokens: result.usage.prompt_tokens,
                    completion_tokens: result.usage.completion_tokens,
                    total_tokens: self.total_tokens,
                })
                .await;
        }

        if self.total_tokens >= HARD_TOKEN_LIMIT && !self.budget_exhausted {
            self.budget_exhausted = true;
            let _ = events
                .send(EngineEvent::SystemNotice(format!(
                    "Token budget exceeded ({} >= {}). A fresh session will start with your next message.",
                    self.total_tokens, HARD_TOKEN_LIMIT
                )))
                .await;
        } else if self.total_tokens >= SOFT_TOKEN_LIMIT && !self.budget_warned {
            self.budget_warned = true;
            let _ = events
                .send(EngineEvent::SystemNotice(format!(
                    "Approaching the token budget ({} of {}).",
                    self.total_tokens, HARD_TOKEN_LIMIT
                )))
                .await;
        }
    }

    async fn rotate_session_if_exhausted(&mut self, events: &EventSender) -> Result<()> {
        if !self.budget_exhausted {
            return Ok(());
        }
        if let Some(store) = &self.store {
            let session = store.create_session(&self.model)?;
            let _ = events
                .send(EngineEvent::SystemNotice(format!(
                    "Started a fresh session ({}).",
                    session.id
                )))
                .await;
            self.session_id = Some(session.id);
        }
        self.history.clear();
        self.total_tokens = 0;
        self.budget_exhausted = false;
        self.budget_warned = false;
        Ok(())
    }

    /// Append the finalized assistant message to history and store,
    /// sanitizing any tool call whose arguments are not valid JSON.
    async fn finalize_assistant(
        &mut self,
        content: String,
        tool_calls: Vec<ToolCall>,
        reasoning_details: Vec<String>,
        events: &EventSender,
    ) -> Result<()> {
        let sanitized: Vec<ToolCall> = tool_calls
            .into_iter()
            .map(|mut tc| {
                if serde_json::from_str::<Value>(&tc.function.arguments).is_err() {
                    tc.function.arguments = "{}".to_string();
                }
                tc
            })
            .collect();

        let message = Message {
            role: "assistant".to_string(),
            content: Some(content.clone()),
            reasoning_details: (!reasoning_details.is_empty()).then(|| {
                reasoning_details
                    .iter()
                    .map(|t| serde_json::json!({ "text": t }))
                    .collect()
            }),
            tool_calls: (!sanitized.is_empty()).then(|| sanitized.clone()),
            tool_call_id: None,
            name: None,
        };
        self.history.push(message);

        let mut message_id = self.history.len() as i64;
        if let (Some(session_id), Some(store)) = (&self.session_id, &self.store) {
            let tool_calls_json = if sanitized.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&sanitized)?)
            };
            message_id = store.save_message(
                session_id,
                "assistant",
                &content,
                tool_calls_json.as_deref(),
                None,
                None,
            )?;
        }

        let _ = events.send(EngineEvent::AssistantFinalized(message_id)).await;
        Ok(())
    }

    /// Execute every finalized tool call, strictly in order. A cancel
    /// observed between calls fails the remaining ones instead of
    /// running them.
    async fn run_tools(&mut self, calls: &[ToolCall], events: &EventSender) -> Result<()> {
        for (i, tc) in calls.iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                self.fail_pending_tools(&calls[i..], "Error: cancelled before execution", events)
                    .await?;
                return Ok(());
            }

            let name = &tc.function.name;
            let _ = events
                .send(EngineEvent::ToolStart {
                    id: tc.id.clone(),
                    name: name.clone(),
                })
                .await;

            // bash and bridge calls are interruptible (killing the
            // subprocess / abandoning the request); filesystem tools
            // are short and run to completion.
            let interruptible = name == "bash" || name.starts_with("mcp__");
            let output = if interruptible {
                tokio::select! {
                    output = self.dispatch_tool(name, &tc.function.arguments) => output,
                    _ = self.cancel_token.cancelled() => {
                        ToolOutput::text("Error: interrupted by cancellation")
                    }
                }
            } else {
                self.dispatch_tool(name, &tc.function.arguments).await
            };

            let status = if output.is_error() {
                ToolStatus::Error
            } else {
                ToolStatus::Done
            };
            let _ = events
                .send(EngineEvent::ToolEnd {
                    id: tc.id.clone(),
                    name: name.clone(),
                    status,
                    result: output.result.clone(),
                    meta: output.meta.clone(),
                })
                .await;

            self.append_tool_result(tc, &output.result)?;
        }
        Ok(())
    }

    async fn dispatch_tool(&self, name: &str, arguments: &str) -> ToolOutput {
        if name.starts_with("mcp__") {
            self.call_mcp_tool(name, arguments).await
        } else {
            tools::execute_tool(name, arguments, self.mode).await
        }
    }

    async fn call_mcp_tool(&self, name: &str, arguments: &str) -> ToolOutput {
        let args: Value =
            serde_json::from_str(arguments).unwrap_or_else(|_| serde_json::json!({}));
        match &self.mcp {
            Some(mcp) => {
                let manager = mcp.lock().await;
                match manager.call_tool(name, args).await {
                    Ok(result) => ToolOutput::text(result),
                    Err(e) => ToolOutput::text(format!("Error: MCP tool failed: {}", e)),
                }
            }
            None => ToolOutput::text(format!(
                "Error: MCP tool \"{}\" called but no MCP manager available",
                name
            )),
        }
    }

    /// Record a failure result for calls that will not run, keeping the
    /// call/result pairing intact.
    async fn fail_pending_tools(
        &mut self,
        calls: &[ToolCall],
        reason: &str,
        events: &EventSender,
    ) -> Result<()> {
        for tc in calls {
            let _ = events
                .send(EngineEvent::ToolStart {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                })
                .await;
            let _ = events
                .send(EngineEvent::ToolEnd {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    status: ToolStatus::Error,
                    result: reason.to_string(),
                    meta: None,
                })
                .await;
            self.append_tool_result(tc, reason)?;
        }
        Ok(())
    }

    fn append_tool_result(&mut self, tc: &ToolCall, result: &str) -> Result<()> {
        self.history
            .push(Message::tool_result(&tc.id, &tc.function.name, result));
        if let (Some(session_id), Some(store)) = (&self.session_id, &self.store) {
            store.save_message(
                session_id,
                "tool",
                result,
                None,
                Some(&tc.id),
                Some(&tc.function.name),
            )?;
        }
        Ok(())
    }

    /// The system prelude is rebuilt for every request: it depends on
    /// the current mode and working directory, and picks up agent.md
    /// when the project provides one.
    pub fn system_prompt(&self) -> String {
        let cwd = std::env::current_dir()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let base = match self.mode {
            Mode::Plan => format!(
                "You are a coding assistant in a terminal (READ-ONLY mode).\n\
                Working directory: {}\n\n\
                Available tools: read_file, glob, grep, list_directory, web_search (read-only).\n\
                You CANNOT write, edit, or run commands. Tell the user to switch to BUILDER mode (Tab) for modifications.\n\
                Focus on: analysis, planning, explaining code, suggesting strategies.",
                cwd
            ),
            Mode::Builder => format!(
                "You are a coding assistant in a terminal.\n\
                Working directory: {}\n\n\
                TOOL USAGE:\n\
                - Read before editing: always use read_file before edit_file to see current content\n\
                - Use edit_file for modifications to existing files, write_file only for new files\n\
                - Use glob/grep to find files before reading them\n\
                - Use bash for git, package managers, and other CLI operations\n\
                - Use web_search for current information, docs, or answers not in local files\n\
                - Execute one logical step at a time, verify results, then proceed\n\n\
                Be concise. Show relevant code, skip obvious explanations.",
                cwd
            ),
        };

        let base = format!(
            "{}\n\nToday's date is {}.",
            base,
            chrono::Local::now().format("%A, %B %d, %Y")
        );

        let agent_path = Path::new(&cwd).join("agent.md");
        if let Ok(agent_content) = std::fs::read_to_string(&agent_path) {
            return format!("{}\n\n--- agent.md ---\n{}", base, agent_content);
        }
        base
    }
}

/// Decide the user-visible content for a finalized round.
///
/// A non-empty raw buffer that parsed to nothing gets a truncation
/// notice with the first bytes of the raw output; a fully empty round
/// gets an empty-response notice carrying the finish reason. A stream
/// that ended with an in-band error wraps whatever was parsed.
pub fn finalize_content(
    parsed: &ParsedOutput,
    tool_calls: &[ToolCall],
    result: &StreamResult,
) -> String {
    if let Some(error) = &result.error {
        return if parsed.content.is_empty() {
            format!("[Error: {}]", error)
        } else {
            format!("[Error: {}] {}", error, parsed.content)
        };
    }

    if !parsed.content.is_empty() || !tool_calls.is_empty() {
        return parsed.content.clone();
    }

    if !result.content.is_empty() {
        let cut = floor_char_boundary(&result.content, TRUNCATION_PREVIEW_BYTES);
        return format!(
            "[Response truncated - the model's output was cut off mid-tool-call]\n\n{}",
            &result.content[..cut]
        );
    }

    format!(
        "[Empty response from API - the model returned nothing{}]",
        if result.finish_reason.is_empty() {
            String::new()
        } else {
            format!(" (finish_reason: {})", result.finish_reason)
        }
    )
}

/// Recover tool calls embedded as XML. Only consulted when the server
/// sent no structured calls; ids are synthesized deterministically.
pub fn synthesize_xml_tool_calls(parsed: &ParsedOutput) -> Vec<ToolCall> {
    parsed
        .tool_calls
        .iter()
        .enumerate()
        .map(|(i, tc)| {
            let args: serde_json::Map<String, Value> = tc
                .arguments
                .iter()
                .map(|(k, v)| (k.clone(), parser::coerce_param(v)))
                .collect();
            ToolCall::new(
                format!("xml_tc_{}_{}", timestamp_ms(), i),
                tc.name.clone(),
                serde_json::to_string(&args).unwrap_or_else(|_| "{}".to_string()),
            )
        })
        .collect()
}

/// Join the structured reasoning channel and `<think>`-derived text
/// with a single newline. Both streams are preserved verbatim; no
/// deduplication is attempted.
pub fn join_reasoning(structured: &str, think: &str) -> String {
    match (structured.is_empty(), think.is_empty()) {
        (true, _) => think.to_string(),
        (_, true) => structured.to_string(),
        _ => format!("{}\n{}", structured, think),
    }
}

/// Materialize attached files as bracketed blocks the model can read
/// verbatim.
pub fn format_file_context(files: &[(String, String)]) -> String {
    files
        .iter()
        .map(|(path, content)| format!("[file path=\"{}\"]\n{}\n[/file]", path, content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn timestamp_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
