//! External tool bridge.
//!
//! Each configured server runs as a child process speaking JSON-RPC
//! over its standard streams with Content-Length framing. Connecting
//! performs the initialize handshake and a tools/list; discovered tools
//! are surfaced to the model as `mcp__<server>__<tool>`. Access to a
//! server is serialized through a per-connection mutex.

use colored::Colorize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::types::{JsonRpcRequest, JsonRpcResponse, McpToolInfo};
use super::prefixed_tool_name;
use crate::config::McpServerConfig;
use crate::error::{MmcodeError, Result};

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "mmcode";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const CALL_TIMEOUT: Duration = Duration::from_secs(15);

struct McpConnection {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl McpConnection {
    async fn send_request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        };
        self.write_framed(&serde_json::to_string(&request)?).await?;

        loop {
            let response = self.read_response().await?;
            // Skip server-initiated notifications while waiting for our id.
            if response.id.is_some() && response.id != Some(id) {
                continue;
            }
            if let Some(err) = response.error {
                return Err(MmcodeError::Other(format!("MCP error: {}", err.message)));
            }
            if response.id.is_none() {
                continue;
            }
            return response
                .result
                .ok_or_else(|| MmcodeError::Other("Empty MCP response".to_string()));
        }
    }

    async fn send_notification(&mut self, method: &str) -> Result<()> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": {}
        });
        self.write_framed(&serde_json::to_string(&notification)?)
            .await
    }

    async fn write_framed(&mut self, payload: &str) -> Result<()> {
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());
        self.stdin.write_all(header.as_bytes()).await?;
        self.stdin.write_all(payload.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<JsonRpcResponse> {
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(MmcodeError::Other(
                    "MCP server closed its output stream".to_string(),
                ));
            }
            let trimmed = line.trim();

            if let Some(len_str) = trimmed.strip_prefix("Content-Length:") {
                let content_length: usize = len_str
                    .trim()
                    .parse()
                    .map_err(|e| MmcodeError::Other(format!("Bad Content-Length: {}", e)))?;

                // Blank separator line, then the body.
                let mut separator = String::new();
                self.reader.read_line(&mut separator).await?;

                let mut body = vec![0u8; content_length];
                self.reader.read_exact(&mut body).await?;
                return Ok(serde_json::from_slice(&body)?);
            }

            if trimmed.is_empty() {
                continue;
            }

            // Some servers emit newline-delimited JSON without framing.
            if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(trimmed) {
                return Ok(response);
            }
        }
    }
}

pub struct McpManager {
    connections: HashMap<String, Mutex<McpConnection>>,
    tool_map: HashMap<String, McpToolInfo>,
    verbose: bool,
}

impl McpManager {
    pub fn new(verbose: bool) -> Self {
        Self {
            connections: HashMap::new(),
            tool_map: HashMap::new(),
            verbose,
        }
    }

    /// Spawn and handshake every configured server. A server that fails
    /// to come up is reported and skipped; the rest stay usable.
    /// Returns the prefixed names of all discovered tools.
    pub async fn init_servers(
        &mut self,
        servers: &HashMap<String, McpServerConfig>,
    ) -> Vec<String> {
        let mut connected = Vec::new();
        for (name, server_config) in servers {
            match self.connect_server(name, server_config).await {
                Ok(tools) => connected.extend(tools),
                Err(e) => {
                    eprintln!("Warning: failed to connect MCP server '{}': {}", name, e);
                }
            }
        }
        connected
    }

    async fn connect_server(
        &mut self,
        server_name: &str,
        server_config: &McpServerConfig,
    ) -> Result<Vec<String>> {
        let mut cmd = Command::new(&server_config.command);
        cmd.args(&server_config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &server_config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MmcodeError::Other("No stdin on MCP child".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MmcodeError::Other("No stdout on MCP child".to_string()))?;

        let mut conn = McpConnection {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 1,
        };

        let init_params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION }
        });
        tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            conn.send_request("initialize", Some(init_params)),
        )
        .await
        .map_err(|_| MmcodeError::Other("MCP initialize timeout".to_string()))??;

        conn.send_notification("notifications/initialized").await?;

        let tools_result = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            conn.send_request("tools/list", None),
        )
        .await
        .map_err(|_| MmcodeError::Other("MCP tools/list timeout".to_string()))??;

        let mut tool_names = Vec::new();
        if let Some(tools) = tools_result.get("tools").and_then(|t| t.as_array()) {
            for tool in tools {
                let name = tool.get("name").and_then(|n| n.as_str()).unwrap_or("");
                if name.is_empty() {
                    continue;
                }
                let description = tool
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("");
                let input_schema = tool
                    .get("inputSchema")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                let read_only = tool
                    .get("annotations")
                    .and_then(|a| a.get("readOnlyHint"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);

                let prefixed = prefixed_tool_name(server_name, name);
                if self.verbose {
                    eprintln!(
                        "{}",
                        format!("[mcp] {} provides {}", server_name, prefixed).dimmed()
                    );
                }
                self.tool_map.insert(
                    prefixed.clone(),
                    McpToolInfo {
                        server_name: server_name.to_string(),
                        tool_name: name.to_string(),
                        description: description.to_string(),
                        input_schema,
                        read_only,
                    },
                );
                tool_names.push(prefixed);
            }
        }

        self.connections
            .insert(server_name.to_string(), Mutex::new(conn));
        Ok(tool_names)
    }

    /// Function-calling definitions for every discovered external tool.
    pub fn tool_definitions(&self) -> Vec<Value> {
        self.definitions_where(|_| true)
    }

    /// Definitions restricted to tools the server marked read-only.
    pub fn read_only_tool_definitions(&self) -> Vec<Value> {
        self.definitions_where(|info| info.read_only)
    }

    fn definitions_where(&self, keep: impl Fn(&McpToolInfo) -> bool) -> Vec<Value> {
        self.tool_map
            .iter()
            .filter(|(_, info)| keep(info))
            .map(|(prefixed, info)| {
                json!({
                    "type": "function",
                    "function": {
                        "name": prefixed,
                        "description": format!("[MCP:{}] {}", info.server_name, info.description),
                        "parameters": info.input_schema
                    }
                })
            })
            .collect()
    }

    pub fn is_mcp_tool(&self, name: &str) -> bool {
        self.tool_map.contains_key(name)
    }

    /// Call an external tool by its prefixed name. The result is the
    /// newline-joined text content, or pretty-printed JSON when the
    /// server returned no text entries.
    pub async fn call_tool(&self, prefixed_name: &str, args: Value) -> Result<String> {
        let info = self.tool_map.get(prefixed_name).ok_or_else(|| {
            MmcodeError::Other(format!("Unknown MCP tool: {}", prefixed_name))
        })?;

        let conn_mutex = self.connections.get(&info.server_name).ok_or_else(|| {
            MmcodeError::Other(format!("MCP server '{}' not connected", info.server_name))
        })?;

        let mut conn = conn_mutex.lock().await;
        let params = json!({
            "name": info.tool_name,
            "arguments": args
        });

        let result = tokio::time::timeout(
            CALL_TIMEOUT,
            conn.send_request("tools/call", Some(params)),
        )
        .await
        .map_err(|_| {
            MmcodeError::Other(format!(
                "MCP tool call timed out after {} seconds",
                CALL_TIMEOUT.as_secs()
            ))
        })??;

        if let Some(content) = result.get("content").and_then(|c| c.as_array()) {
            let texts: Vec<String> = content
                .iter()
                .filter_map(|item| {
                    (item.get("type").and_then(|t| t.as_str()) == Some("text"))
                        .then(|| item.get("text").and_then(|t| t.as_str()).map(String::from))
                        .flatten()
                })
                .collect();
            if !texts.is_empty() {
                return Ok(texts.join("\n"));
            }
        }

        Ok(serde_json::to_string_pretty(&result)?)
    }

    /// Best-effort shutdown of every server: a shutdown request, then a
    /// kill of the child process.
    pub async fn shutdown(&mut self) {
        for (_name, conn_mutex) in self.connections.drain() {
            let mut conn = conn_mutex.into_inner();
            let _ = tokio::time::timeout(
                Duration::from_secs(2),
                conn.send_request("shutdown", None),
            )
            .await;
            let _ = conn.child.kill().await;
        }
        self.tool_map.clear();
    }
}
