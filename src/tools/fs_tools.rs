use serde_json::Value;
use std::path::Path;
use tokio::fs;

use super::{ToolOutput, ToolResultMeta};

const READ_LINE_CAP: usize = 2000;

pub fn read_file_definition() -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": "read_file",
            "description": "Read a file's contents with line numbers. Returns numbered lines (format: '1\\tline content'). Files over 2000 lines are automatically truncated. Use start_line/end_line for large files.",
            "parameters": {
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute or relative path to the file"
                    },
                    "start_line": {
                        "type": "number",
                        "description": "Starting line number (1-based). Optional."
                    },
                    "end_line": {
                        "type": "number",
                        "description": "Ending line number (1-based, inclusive). Optional."
                    }
                },
                "required": ["path"]
            }
        }
    })
}

pub async fn read_file(args: Value) -> ToolOutput {
    let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
    if path.is_empty() {
        return ToolOutput::text("Error: No path provided");
    }
    if !Path::new(path).exists() {
        return ToolOutput::text(format!("Error: File not found: {}", path));
    }

    let text = match fs::read_to_string(path).await {
        Ok(t) => t,
        Err(e) => return ToolOutput::text(format!("Error reading file: {}", e)),
    };

    let lines: Vec<&str> = text.split('\n').collect();
    let start_line = args
        .get("start_line")
        .and_then(|v| v.as_u64())
        .map(|v| v.max(1) as usize);
    let end_line = args.get("end_line").and_then(|v| v.as_u64()).map(|v| v as usize);

    if start_line.is_some() || end_line.is_some() {
        let start = start_line.unwrap_or(1).saturating_sub(1).min(lines.len());
        let end = end_line.map(|e| e.min(lines.len())).unwrap_or(lines.len());
        let end = end.max(start);
        return ToolOutput::text(number_lines(&lines[start..end], start));
    }

    if lines.len() > READ_LINE_CAP {
        return ToolOutput::text(format!(
            "{}\n...(file has {} lines, showing first {})",
            number_lines(&lines[..READ_LINE_CAP], 0),
            lines.len(),
            READ_LINE_CAP
        ));
    }

    ToolOutput::text(number_lines(&lines, 0))
}

fn number_lines(lines: &[&str], offset: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{}\t{}", offset + i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn write_file_definition() -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": "write_file",
            "description": "Create or overwrite a file with the given content. Creates parent directories automatically. WARNING: Completely replaces existing content. For partial edits use edit_file instead.",
            "parameters": {
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute or relative path to the file"
                    },
                    "content": {
                        "type": "string",
                        "description": "The content to write to the file"
                    }
                },
                "required": ["path", "content"]
            }
        }
    })
}

pub async fn write_file(args: Value) -> ToolOutput {
    let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
    let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");

    if path.is_empty() {
        return ToolOutput::text("Error: No path provided");
    }

    let is_new = !Path::new(path).exists();

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolOutput::text(format!("Error creating directories: {}", e));
            }
        }
    }

    // Write through a sibling temp file and rename so an existing file
    // is replaced atomically, never left half-written.
    let tmp_path = format!("{}.tmp.{}", path, std::process::id());
    if let Err(e) = fs::write(&tmp_path, content).await {
        return ToolOutput::text(format!("Error writing file: {}", e));
    }
    match fs::rename(&tmp_path, path).await {
        Ok(_) => ToolOutput::with_meta(
            format!("File written successfully: {}", path),
            ToolResultMeta::WriteFile {
                path: path.to_string(),
                content: content.to_string(),
                is_new,
            },
        ),
        Err(e) => {
            let _ = fs::remove_file(&tmp_path).await;
            ToolOutput::text(format!("Error writing file: {}", e))
        }
    }
}

pub fn edit_file_definition() -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": "edit_file",
            "description": "Replace an exact string in a file. old_str must match exactly once (including whitespace/indentation). If old_str appears 0 or >1 times, the edit fails; add more surrounding context to make it unique. Preferred over write_file for modifying existing files.",
            "parameters": {
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to edit"
                    },
                    "old_str": {
                        "type": "string",
                        "description": "The exact string to find and replace. Must be unique in the file."
                    },
                    "new_str": {
                        "type": "string",
                        "description": "The replacement string"
                    }
                },
                "required": ["path", "old_str", "new_str"]
            }
        }
    })
}

pub async fn edit_file(args: Value) -> ToolOutput {
    let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
    let old_str = args.get("old_str").and_then(|v| v.as_str()).unwrap_or("");
    let new_str = args.get("new_str").and_then(|v| v.as_str()).unwrap_or("");

    if path.is_empty() {
        return ToolOutput::text("Error: No path provided");
    }
    if !Path::new(path).exists() {
        return ToolOutput::text(format!("Error: File not found: {}", path));
    }
    if old_str.is_empty() {
        return ToolOutput::text("Error: old_str must not be empty");
    }

    let content = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => return ToolOutput::text(format!("Error reading file: {}", e)),
    };

    let occurrences = content.matches(old_str).count();
    if occurrences == 0 {
        return ToolOutput::text(format!("Error: old_str not found in {}", path));
    }
    if occurrences > 1 {
        return ToolOutput::text(format!(
            "Error: old_str found {} times in {}. It must be unique. Add more context to make it unique.",
            occurrences, path
        ));
    }

    let new_content = content.replacen(old_str, new_str, 1);
    match fs::write(path, &new_content).await {
        Ok(_) => ToolOutput::with_meta(
            format!("File edited successfully: {}", path),
            ToolResultMeta::EditFile {
                path: path.to_string(),
                old_str: old_str.to_string(),
                new_str: new_str.to_string(),
            },
        ),
        Err(e) => ToolOutput::text(format!("Error writing file: {}", e)),
    }
}
