//! SSE decoding for the chat completions stream.
//!
//! The response body is a stream of `data: <json>` lines. Chunks may
//! split lines arbitrarily, so bytes are buffered until a full line is
//! available. Each decoded chunk is folded into a [`StreamState`] and
//! mirrored out as [`StreamEvent`]s in server send order.

use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{MmcodeError, Result};
use crate::models::ToolCall;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Events emitted while the stream is live. Chunks of the same kind
/// concatenate losslessly; `ToolCallDelta` carries the full accumulated
/// snapshot each time.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    ReasoningChunk(String),
    ContentChunk(String),
    ToolCallDelta(Vec<ToolCall>),
    Done(Usage, String),
    Error(String),
}

/// Everything accumulated once the stream terminates.
#[derive(Debug, Clone)]
pub struct StreamResult {
    pub content: String,
    pub reasoning_details: Vec<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub finish_reason: String,
    pub cancelled: bool,
    /// Set when the server sent an in-band error chunk.
    pub error: Option<String>,
}

/// Transient per-round accumulator for the delta stream.
#[derive(Debug, Default)]
pub struct StreamState {
    pub content: String,
    pub reasoning_details: Vec<String>,
    pub tool_calls: HashMap<usize, ToolCall>,
    pub usage: Usage,
    pub finish_reason: String,
    pub chunk_count: u64,
    pub error: Option<String>,
}

impl StreamState {
    pub fn ordered_tool_calls(&self) -> Vec<ToolCall> {
        let mut entries: Vec<(usize, &ToolCall)> =
            self.tool_calls.iter().map(|(k, v)| (*k, v)).collect();
        entries.sort_by_key(|(k, _)| *k);
        entries.into_iter().map(|(_, v)| v.clone()).collect()
    }

    fn into_result(self, cancelled: bool) -> StreamResult {
        let tool_calls = self.ordered_tool_calls();
        StreamResult {
            content: self.content,
            reasoning_details: self.reasoning_details,
            tool_calls,
            usage: self.usage,
            finish_reason: if cancelled {
                "cancelled".to_string()
            } else {
                self.finish_reason
            },
            cancelled,
            error: self.error,
        }
    }
}

/// Fold one decoded SSE chunk into the state, returning the events it
/// produced. Kept free of I/O so the delta grammar is testable.
pub fn process_chunk(state: &mut StreamState, chunk: &Value) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    state.chunk_count += 1;

    // Usage replaces the accumulator wholesale.
    if let Some(u) = chunk.get("usage") {
        state.usage = Usage {
            prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            completion_tokens: u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        };
    }

    if let Some(err) = chunk.get("error") {
        let msg = err
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown API error");
        state.error = Some(msg.to_string());
        events.push(StreamEvent::Error(format!("API error: {}", msg)));
        return events;
    }

    let choice = match chunk.get("choices").and_then(|c| c.get(0)) {
        Some(c) => c,
        None => return events,
    };

    if let Some(fr) = choice.get("finish_reason").and_then(|v| v.as_str()) {
        if !fr.is_empty() {
            state.finish_reason = fr.to_string();
        }
    }

    let delta = match choice.get("delta") {
        Some(d) => d,
        None => return events,
    };

    if let Some(items) = delta.get("reasoning_details").and_then(|v| v.as_array()) {
        for item in items {
            if let Some(text) = item.get("text").and_then(|v| v.as_str()) {
                state.reasoning_details.push(text.to_string());
                events.push(StreamEvent::ReasoningChunk(text.to_string()));
            }
        }
    }
    if let Some(text) = delta.get("reasoning_content").and_then(|v| v.as_str()) {
        state.reasoning_details.push(text.to_string());
        events.push(StreamEvent::ReasoningChunk(text.to_string()));
    }

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        state.content.push_str(text);
        events.push(StreamEvent::ContentChunk(text.to_string()));
    }

    if let Some(tcs) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tcs {
            let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let entry = state
                .tool_calls
                .entry(idx)
                .or_insert_with(|| ToolCall::new("", "", ""));

            if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                entry.id = id.to_string();
            }
            if let Some(func) = tc.get("function") {
                if let Some(name) = func.get("name").and_then(|v| v.as_str()) {
                    entry.function.name = name.to_string();
                }
                if let Some(args) = func.get("arguments").and_then(|v| v.as_str()) {
                    entry.function.arguments.push_str(args);
                }
            }
        }
        events.push(StreamEvent::ToolCallDelta(state.ordered_tool_calls()));
    }

    events
}

/// Drive the SSE response to completion, emitting events as they decode.
///
/// Terminates on stream end, an in-band error chunk, cancellation, or a
/// transport error (the only `Err` case). The returned result always
/// carries whatever accumulated; cancellation reports finish reason
/// `"cancelled"`.
pub async fn process_stream(
    response: reqwest::Response,
    event_tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) -> Result<StreamResult> {
    let mut stream = response.bytes_stream();
    let mut state = StreamState::default();
    let mut line_buffer = String::new();
    let mut cancelled = false;

    'outer: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            chunk = stream.next() => {
                let bytes = match chunk {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        let msg = format!("Stream error: {}", e);
                        let _ = event_tx.send(StreamEvent::Error(msg.clone())).await;
                        return Err(MmcodeError::Other(msg));
                    }
                    None => break,
                };
                line_buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = line_buffer.find('\n') {
                    let line = line_buffer[..line_end].trim_end_matches('\r').to_string();
                    line_buffer = line_buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        continue;
                    }

                    if let Ok(chunk_json) = serde_json::from_str::<Value>(data) {
                        for event in process_chunk(&mut state, &chunk_json) {
                            let _ = event_tx.send(event).await;
                        }
                        if state.error.is_some() {
                            break 'outer;
                        }
                    }
                }
            }
        }
    }

    if state.chunk_count == 0 && state.content.is_empty() && state.tool_calls.is_empty() {
        let _ = event_tx
            .send(StreamEvent::Error(
                "No response received from API (0 chunks)".to_string(),
            ))
            .await;
    }

    let result = state.into_result(cancelled);
    let _ = event_tx
        .send(StreamEvent::Done(
            result.usage.clone(),
            result.finish_reason.clone(),
        ))
        .await;

    Ok(result)
}
