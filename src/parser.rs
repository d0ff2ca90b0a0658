//! Splits raw assistant text into reasoning, user-visible content, and
//! embedded tool invocations.
//!
//! The model interleaves prose with `<think>` blocks and
//! `<minimax:tool_call>` blocks. This is a single-pass scanner over the
//! buffer with exact tag matching, not an XML parser. It is safe to run
//! on a partial buffer while streaming: incomplete blocks set `pending`
//! and never leak tag fragments into `content`.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

const THINK_OPEN: &str = "<think>";
const TOOL_CALL_OPEN: &str = "<minimax:tool_call>";

const KNOWN_TAGS: &[&str] = &[
    "<think>",
    "</think>",
    "<minimax:tool_call>",
    "</minimax:tool_call>",
];

/// One `<invoke>` recovered from an embedded tool-call block.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlToolCall {
    pub name: String,
    pub arguments: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ParsedOutput {
    pub reasoning: String,
    pub content: String,
    pub tool_calls: Vec<XmlToolCall>,
    /// Set when the buffer ends inside an unclosed block or partial tag.
    pub pending: bool,
}

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").unwrap());

static TOOL_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<minimax:tool_call>(.*?)</minimax:tool_call>").unwrap());

static INVOKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<invoke\s+name=["']?([^"'>\s]+)["']?\s*>(.*?)</invoke>"#).unwrap()
});

static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<parameter\s+name=["']?([^"'>\s]+)["']?\s*>(.*?)</parameter>"#).unwrap()
});

pub fn parse_assistant_text(raw: &str) -> ParsedOutput {
    let mut reasoning = String::new();
    let mut pending = false;
    let mut working = raw.to_string();

    for cap in THINK_RE.captures_iter(&working) {
        append_reasoning(&mut reasoning, cap[1].trim());
    }
    working = THINK_RE.replace_all(&working, "").to_string();

    // A <think> left over after removing complete blocks is unclosed:
    // everything after it is partial reasoning.
    if let Some(idx) = working.find(THINK_OPEN) {
        append_reasoning(&mut reasoning, working[idx + THINK_OPEN.len()..].trim());
        working.truncate(idx);
        pending = true;
    }

    let mut tool_calls = Vec::new();
    for cap in TOOL_BLOCK_RE.captures_iter(&working) {
        tool_calls.extend(parse_invokes(&cap[1]));
    }
    working = TOOL_BLOCK_RE.replace_all(&working, "").to_string();

    // An unclosed tool-call block truncates the visible content at its
    // start; the partial block is never surfaced.
    if let Some(idx) = working.find(TOOL_CALL_OPEN) {
        working.truncate(idx);
        pending = true;
    }

    if let Some(idx) = trailing_partial_tag(&working) {
        working.truncate(idx);
        pending = true;
    }

    ParsedOutput {
        reasoning,
        content: working.trim().to_string(),
        tool_calls,
        pending,
    }
}

fn append_reasoning(reasoning: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !reasoning.is_empty() {
        reasoning.push('\n');
    }
    reasoning.push_str(text);
}

/// Start index of a trailing fragment that could still grow into one of
/// the recognized tags. Fragments of unrelated tags are left alone.
fn trailing_partial_tag(text: &str) -> Option<usize> {
    let idx = text.rfind('<')?;
    let fragment = &text[idx..];
    if fragment.contains('>') {
        return None;
    }
    let fragment = fragment.to_lowercase();
    KNOWN_TAGS
        .iter()
        .any(|tag| tag.starts_with(&fragment))
        .then_some(idx)
}

fn parse_invokes(block: &str) -> Vec<XmlToolCall> {
    INVOKE_RE
        .captures_iter(block)
        .map(|cap| {
            let arguments = PARAM_RE
                .captures_iter(&cap[2])
                .map(|p| (p[1].to_string(), p[2].trim().to_string()))
                .collect();
            XmlToolCall {
                name: cap[1].to_string(),
                arguments,
            }
        })
        .collect()
}

/// Give an XML parameter value its natural JSON type. Tried in order:
/// boolean, integer, float, inline JSON array/object, plain string.
pub fn coerce_param(value: &str) -> serde_json::Value {
    match value {
        "true" => serde_json::Value::Bool(true),
        "false" => serde_json::Value::Bool(false),
        _ => {
            if let Ok(n) = value.parse::<i64>() {
                return serde_json::Value::Number(n.into());
            }
            if let Ok(n) = value.parse::<f64>() {
                if let Some(n) = serde_json::Number::from_f64(n) {
                    return serde_json::Value::Number(n);
                }
            }
            if value.starts_with('[') || value.starts_with('{') {
                if let Ok(v) = serde_json::from_str::<serde_json::Value>(value) {
                    return v;
                }
            }
            serde_json::Value::String(value.to_string())
        }
    }
}
