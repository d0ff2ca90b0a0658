pub mod client;
pub mod types;

pub use client::McpManager;
pub use types::McpToolInfo;

/// Prefix under which external-server tools are surfaced to the model.
pub fn prefixed_tool_name(server: &str, tool: &str) -> String {
    format!("mcp__{}__{}", server, tool)
}
