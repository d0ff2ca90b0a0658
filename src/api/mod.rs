pub mod client;
pub mod quota;
pub mod streaming;

pub use client::{ApiClient, ChatRequest};
pub use quota::QuotaInfo;
pub use streaming::{process_stream, StreamEvent, StreamResult, Usage};
