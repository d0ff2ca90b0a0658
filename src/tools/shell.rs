use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::ToolOutput;
use crate::tools::search_tools::floor_char_boundary;

const TIMEOUT_SECS: u64 = 30;
const OUTPUT_CAP: usize = 10_000;

pub fn definition() -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": "bash",
            "description": "Execute a bash command. Use for: running scripts, git operations, installing packages, or any terminal task. Timeout: 30s. Output truncated at 10KB. Prefer other tools over bash when possible (e.g., use read_file instead of cat, glob instead of find).",
            "parameters": {
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The bash command to execute"
                    }
                },
                "required": ["command"]
            }
        }
    })
}

pub async fn execute(args: Value) -> ToolOutput {
    let command = args.get("command").and_then(|v| v.as_str()).unwrap_or("");
    if command.is_empty() {
        return ToolOutput::text("Error: No command provided");
    }

    let mut child = match Command::new("bash")
        .args(["-lc", command])
        .current_dir(std::env::current_dir().unwrap_or_default())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(c) => c,
        Err(e) => return ToolOutput::text(format!("Error executing command: {}", e)),
    };

    let (mut stdout_pipe, mut stderr_pipe) = match (child.stdout.take(), child.stderr.take()) {
        (Some(out), Some(err)) => (out, err),
        _ => return ToolOutput::text("Error: failed to capture command output"),
    };
    let mut stdout_buf: Vec<u8> = Vec::new();
    let mut stderr_buf: Vec<u8> = Vec::new();

    // Read both pipes to EOF, then reap the child. Dropped on timeout,
    // which releases the buffers with whatever was read so far.
    let collect = async {
        let (out, err) = tokio::join!(
            stdout_pipe.read_to_end(&mut stdout_buf),
            stderr_pipe.read_to_end(&mut stderr_buf),
        );
        out?;
        err?;
        child.wait().await
    };

    match tokio::time::timeout(Duration::from_secs(TIMEOUT_SECS), collect).await {
        Ok(Ok(status)) => ToolOutput::text(format_output(
            status.code().unwrap_or(-1),
            &stdout_buf,
            &stderr_buf,
        )),
        Ok(Err(e)) => ToolOutput::text(format!("Error executing command: {}", e)),
        Err(_) => {
            let _ = child.kill().await;
            let partial = format_streams(&stdout_buf, &stderr_buf);
            if partial.is_empty() {
                ToolOutput::text(format!(
                    "Error: Command timed out after {} seconds (no output)",
                    TIMEOUT_SECS
                ))
            } else {
                ToolOutput::text(format!(
                    "Error: Command timed out after {} seconds. Partial output:\n{}\n...(truncated at timeout)",
                    TIMEOUT_SECS, partial
                ))
            }
        }
    }
}

fn format_output(exit_code: i32, stdout: &[u8], stderr: &[u8]) -> String {
    let mut result = format_streams(stdout, stderr);
    if exit_code != 0 {
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&format!("Exit code: {}", exit_code));
    }
    if result.is_empty() {
        result = "(no output)".to_string();
    }
    result
}

fn format_streams(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = truncate(&String::from_utf8_lossy(stdout));
    let stderr = truncate(&String::from_utf8_lossy(stderr));

    let mut result = String::new();
    if !stdout.is_empty() {
        result.push_str(&stdout);
    }
    if !stderr.is_empty() {
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str("stderr: ");
        result.push_str(&stderr);
    }
    result
}

fn truncate(text: &str) -> String {
    if text.len() > OUTPUT_CAP {
        let cut = floor_char_boundary(text, OUTPUT_CAP);
        format!("{}...(truncated)", &text[..cut])
    } else {
        text.to_string()
    }
}
