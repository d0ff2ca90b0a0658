//! Built-in tool registry.
//!
//! Each tool lives in its own module and exposes `definition()` (OpenAI
//! function-calling JSON) plus an async `execute(args)`. The registry is
//! fixed at compile time; names prefixed `mcp__` belong to external
//! servers and are dispatched by the engine, not here.

pub mod executor;
mod fs_tools;
mod search_tools;
mod shell;
mod web;

pub use executor::execute_tool;

use serde_json::Value;

use crate::models::Mode;

/// Structured summary attached to a tool result for rendering
/// collaborators (e.g. a diff preview for edits).
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResultMeta {
    EditFile {
        path: String,
        old_str: String,
        new_str: String,
    },
    WriteFile {
        path: String,
        content: String,
        is_new: bool,
    },
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub result: String,
    pub meta: Option<ToolResultMeta>,
}

impl ToolOutput {
    pub fn text(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            meta: None,
        }
    }

    pub fn with_meta(result: impl Into<String>, meta: ToolResultMeta) -> Self {
        Self {
            result: result.into(),
            meta: Some(meta),
        }
    }

    pub fn is_error(&self) -> bool {
        self.result.starts_with("Error")
    }
}

pub fn is_read_only(name: &str) -> bool {
    matches!(
        name,
        "read_file" | "glob" | "grep" | "list_directory" | "web_search"
    )
}

pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "bash"
            | "read_file"
            | "write_file"
            | "edit_file"
            | "glob"
            | "grep"
            | "list_directory"
            | "web_search"
    )
}

/// All tool definitions visible in the given mode. PLAN only exposes
/// the read-only set.
pub fn definitions(mode: Mode) -> Vec<Value> {
    let all = vec![
        shell::definition(),
        fs_tools::read_file_definition(),
        fs_tools::write_file_definition(),
        fs_tools::edit_file_definition(),
        search_tools::glob_definition(),
        search_tools::grep_definition(),
        search_tools::list_directory_definition(),
        web::definition(),
    ];

    match mode {
        Mode::Builder => all,
        Mode::Plan => all
            .into_iter()
            .filter(|d| {
                let name = d
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|n| n.as_str())
                    .unwrap_or("");
                is_read_only(name)
            })
            .collect(),
    }
}
