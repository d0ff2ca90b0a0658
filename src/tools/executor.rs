use serde_json::Value;

use super::{fs_tools, is_builtin, is_read_only, search_tools, shell, web, ToolOutput};
use crate::models::Mode;

/// Dispatch one tool call.
///
/// `arguments` is the JSON-encoded string straight off the wire; a
/// string that fails to decode is treated as `{}` and the tool reports
/// its own validation error. Every failure path produces a textual
/// result, never an `Err`; the conversation loop must keep running.
pub async fn execute_tool(name: &str, arguments: &str, mode: Mode) -> ToolOutput {
    let args: Value = serde_json::from_str(arguments).unwrap_or_else(|_| serde_json::json!({}));

    if !is_builtin(name) && !name.starts_with("mcp__") {
        return ToolOutput::text(format!("Error: Unknown tool \"{}\"", name));
    }

    if mode == Mode::Plan && !is_read_only(name) && !name.starts_with("mcp__") {
        return ToolOutput::text(format!(
            "Error: Tool \"{}\" is not available in PLAN mode. Switch to BUILDER mode (Tab) to use it.",
            name
        ));
    }

    match name {
        "bash" => shell::execute(args).await,
        "read_file" => fs_tools::read_file(args).await,
        "write_file" => fs_tools::write_file(args).await,
        "edit_file" => fs_tools::edit_file(args).await,
        "glob" => search_tools::glob(args).await,
        "grep" => search_tools::grep(args).await,
        "list_directory" => search_tools::list_directory(args).await,
        "web_search" => web::execute(args).await,
        // External-bridge names are routed by the engine, never here.
        other => ToolOutput::text(format!("Error: Unknown tool \"{}\"", other)),
    }
}
