//! One-way event stream from the engine to its single UI consumer.
//!
//! The channel is bounded: a slow consumer blocks the engine at the
//! next suspension point instead of buffering without limit.

use tokio::sync::mpsc;

use crate::models::ToolCall;
use crate::tools::ToolResultMeta;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Done,
    Error,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A new assistant streaming round started.
    StreamStart,
    ReasoningDelta(String),
    ContentDelta(String),
    /// Accumulated tool-call snapshot, in stream-index order.
    ToolCallSnapshot(Vec<ToolCall>),
    /// The assistant message was finalized and persisted under this id.
    AssistantFinalized(i64),
    ToolStart {
        id: String,
        name: String,
    },
    ToolEnd {
        id: String,
        name: String,
        status: ToolStatus,
        result: String,
        meta: Option<ToolResultMeta>,
    },
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    SystemNotice(String),
    Error(String),
    TurnDone,
}

pub type EventSender = mpsc::Sender<EngineEvent>;
pub type EventReceiver = mpsc::Receiver<EngineEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}
