use globset::Glob;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use super::ToolOutput;

const GLOB_RESULT_CAP: usize = 500;
const GREP_MATCH_CAP: usize = 200;
const GREP_OUTPUT_CAP: usize = 10_000;

pub fn glob_definition() -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": "glob",
            "description": "Find files by glob pattern. Returns one path per line. Max 500 results. Ignores dotfiles. Examples: '**/*.rs' for all Rust files, 'src/**/*.test.ts' for test files in src.",
            "parameters": {
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Glob pattern to match (e.g., \"**/*.rs\", \"src/**/*.tsx\")"
                    },
                    "cwd": {
                        "type": "string",
                        "description": "Directory to search in. Defaults to current working directory."
                    }
                },
                "required": ["pattern"]
            }
        }
    })
}

pub async fn glob(args: Value) -> ToolOutput {
    let pattern = args.get("pattern").and_then(|v| v.as_str()).unwrap_or("");
    let cwd = args
        .get("cwd")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(current_dir_string);

    if pattern.is_empty() {
        return ToolOutput::text("Error: No pattern provided");
    }

    let matcher = match Glob::new(pattern) {
        Ok(g) => g.compile_matcher(),
        Err(e) => return ToolOutput::text(format!("Error: Invalid glob pattern: {}", e)),
    };

    let base = Path::new(&cwd);
    let mut results = Vec::new();

    for entry in WalkDir::new(base)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(&e.file_name().to_string_lossy()))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if entry.file_type().is_dir() {
            continue;
        }

        let rel = match entry.path().strip_prefix(base) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };

        if matcher.is_match(&rel) {
            results.push(rel);
            if results.len() >= GLOB_RESULT_CAP {
                results.push(format!("...(truncated at {} results)", GLOB_RESULT_CAP));
                break;
            }
        }
    }

    if results.is_empty() {
        return ToolOutput::text("No files matched the pattern.");
    }
    ToolOutput::text(results.join("\n"))
}

pub fn grep_definition() -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": "grep",
            "description": "Search file contents by regex. Returns 'path:line: content' per match. Max 200 matches. Skips node_modules and dotfiles. Use 'include' to filter by extension, e.g., include='*.rs'. Use context_lines for surrounding context.",
            "parameters": {
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regex pattern to search for"
                    },
                    "path": {
                        "type": "string",
                        "description": "File or directory to search in. Defaults to current directory."
                    },
                    "include": {
                        "type": "string",
                        "description": "File extension filter (e.g., \"*.rs\", \"*.toml\")"
                    },
                    "context_lines": {
                        "type": "number",
                        "description": "Number of context lines before and after each match. Default 0."
                    }
                },
                "required": ["pattern"]
            }
        }
    })
}

pub async fn grep(args: Value) -> ToolOutput {
    let pattern = args.get("pattern").and_then(|v| v.as_str()).unwrap_or("");
    let search_path = args
        .get("path")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(current_dir_string);
    let include = args.get("include").and_then(|v| v.as_str());
    let context_lines = args
        .get("context_lines")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize;

    if pattern.is_empty() {
        return ToolOutput::text("Error: No pattern provided");
    }

    let matcher = match Regex::new(pattern) {
        Ok(m) => m,
        Err(e) => return ToolOutput::text(format!("Error: Invalid regex pattern: {}", e)),
    };

    let base = Path::new(&search_path);
    let cwd = std::env::current_dir().unwrap_or_default();
    let files: Vec<String> = if base.is_file() {
        vec![search_path.clone()]
    } else {
        collect_files(base, include)
    };

    let mut results: Vec<String> = Vec::new();
    let mut match_count = 0;

    'files: for file_path in &files {
        let path = Path::new(file_path);
        let rel = path
            .strip_prefix(&cwd)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let lines: Vec<&str> = content.split('\n').collect();

        for (i, line) in lines.iter().enumerate() {
            if match_count >= GREP_MATCH_CAP {
                results.push(format!("...(truncated at {} matches)", GREP_MATCH_CAP));
                break 'files;
            }
            if !matcher.is_match(line) {
                continue;
            }
            match_count += 1;

            if context_lines > 0 {
                results.push(format!("--- {} ---", rel));
                let start = i.saturating_sub(context_lines);
                let end = (i + context_lines).min(lines.len().saturating_sub(1));
                for j in start..=end {
                    let prefix = if j == i { ">" } else { " " };
                    results.push(format!("{} {}: {}", prefix, j + 1, lines[j]));
                }
                results.push(String::new());
            } else {
                results.push(format!("{}:{}: {}", rel, i + 1, line.trim_end()));
            }
        }
    }

    if results.is_empty() {
        return ToolOutput::text("No matches found.");
    }

    let output = results.join("\n");
    if output.len() > GREP_OUTPUT_CAP {
        let cut = floor_char_boundary(&output, GREP_OUTPUT_CAP);
        ToolOutput::text(format!("{}...(truncated)", &output[..cut]))
    } else {
        ToolOutput::text(output)
    }
}

pub fn list_directory_definition() -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": "list_directory",
            "description": "List directory contents with file sizes. Directories end with '/'. Default max_depth=1 (non-recursive). Set max_depth=2 or 3 to see nested structure.",
            "parameters": {
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path to list. Defaults to current directory."
                    },
                    "max_depth": {
                        "type": "number",
                        "description": "Maximum depth to recurse. Default 1 (non-recursive)."
                    }
                },
                "required": []
            }
        }
    })
}

pub async fn list_directory(args: Value) -> ToolOutput {
    let dir = args
        .get("path")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(current_dir_string);
    let max_depth = args.get("max_depth").and_then(|v| v.as_u64()).unwrap_or(1) as usize;

    let mut results = Vec::new();
    list_recursive(Path::new(&dir), max_depth, 0, &mut results);

    if results.is_empty() {
        return ToolOutput::text("Directory is empty.");
    }
    ToolOutput::text(results.join("\n"))
}

fn list_recursive(dir: &Path, max_depth: usize, depth: usize, results: &mut Vec<String>) {
    if depth > max_depth {
        return;
    }

    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            results.push(format!("Error reading {}: {}", dir.display(), e));
            return;
        }
    };

    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    let indent = "  ".repeat(depth);
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') && depth == 0 {
            continue;
        }
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };

        if file_type.is_dir() {
            results.push(format!("{}{}/", indent, name));
            if depth < max_depth {
                list_recursive(&entry.path(), max_depth, depth + 1, results);
            }
        } else {
            let size = entry
                .metadata()
                .map(|m| human_size(m.len()))
                .unwrap_or_default();
            results.push(format!("{}{} ({})", indent, name, size));
        }
    }
}

fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn current_dir_string() -> String {
    std::env::current_dir()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || name == "node_modules"
}

fn collect_files(dir: &Path, include: Option<&str>) -> Vec<String> {
    let suffix: Option<String> = include.map(|inc| inc.replace('*', ""));

    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(&e.file_name().to_string_lossy()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| match &suffix {
            Some(suffix) => e.file_name().to_string_lossy().ends_with(suffix.as_str()),
            None => true,
        })
        .map(|e| e.path().to_string_lossy().to_string())
        .collect()
}

pub(crate) fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
