use mmcode::models::Mode;
use mmcode::tools::{definitions, execute_tool, is_read_only, ToolResultMeta};
use std::fs;
use tempfile::TempDir;

fn path_arg(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().to_string()
}

#[tokio::test]
async fn read_file_numbers_lines() {
    let dir = TempDir::new().unwrap();
    let path = path_arg(&dir, "test.txt");
    fs::write(&path, "alpha\nbeta\ngamma").unwrap();

    let args = format!(r#"{{"path": "{}"}}"#, path);
    let output = execute_tool("read_file", &args, Mode::Builder).await;
    assert_eq!(output.result, "1\talpha\n2\tbeta\n3\tgamma");
}

#[tokio::test]
async fn read_file_respects_line_range() {
    let dir = TempDir::new().unwrap();
    let path = path_arg(&dir, "test.txt");
    fs::write(&path, "a\nb\nc\nd\ne").unwrap();

    let args = format!(r#"{{"path": "{}", "start_line": 2, "end_line": 4}}"#, path);
    let output = execute_tool("read_file", &args, Mode::Builder).await;
    assert_eq!(output.result, "2\tb\n3\tc\n4\td");
}

#[tokio::test]
async fn read_file_truncates_large_files() {
    let dir = TempDir::new().unwrap();
    let path = path_arg(&dir, "big.txt");
    let content: Vec<String> = (0..2500).map(|i| format!("line {}", i)).collect();
    fs::write(&path, content.join("\n")).unwrap();

    let args = format!(r#"{{"path": "{}"}}"#, path);
    let output = execute_tool("read_file", &args, Mode::Builder).await;
    assert!(output.result.contains("2000\tline 1999"));
    assert!(!output.result.contains("2001\tline 2000"));
    assert!(output
        .result
        .ends_with("...(file has 2500 lines, showing first 2000)"));
}

#[tokio::test]
async fn read_file_missing_reports_error() {
    let output = execute_tool("read_file", r#"{"path": "/no/such/file"}"#, Mode::Builder).await;
    assert!(output.result.starts_with("Error: File not found"));
}

#[tokio::test]
async fn write_file_creates_parents_and_reports_preview() {
    let dir = TempDir::new().unwrap();
    let path = path_arg(&dir, "nested/dir/out.txt");

    let args = format!(r#"{{"path": "{}", "content": "payload"}}"#, path);
    let output = execute_tool("write_file", &args, Mode::Builder).await;
    assert!(output.result.starts_with("File written successfully"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "payload");

    match output.meta {
        Some(ToolResultMeta::WriteFile { is_new, content, .. }) => {
            assert!(is_new);
            assert_eq!(content, "payload");
        }
        other => panic!("expected WriteFile meta, got {:?}", other),
    }
}

#[tokio::test]
async fn edit_file_replaces_unique_occurrence() {
    let dir = TempDir::new().unwrap();
    let path = path_arg(&dir, "x.txt");
    fs::write(&path, "hello world\n").unwrap();

    let args = format!(
        r#"{{"path": "{}", "old_str": "world", "new_str": "rust"}}"#,
        path
    );
    let output = execute_tool("edit_file", &args, Mode::Builder).await;
    assert!(output.result.starts_with("File edited successfully"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "hello rust\n");
    assert!(matches!(output.meta, Some(ToolResultMeta::EditFile { .. })));
}

#[tokio::test]
async fn edit_file_rejects_ambiguous_old_str() {
    let dir = TempDir::new().unwrap();
    let path = path_arg(&dir, "x");
    fs::write(&path, "ab\nab\n").unwrap();

    let args = format!(
        r#"{{"path": "{}", "old_str": "ab", "new_str": "cd"}}"#,
        path
    );
    let output = execute_tool("edit_file", &args, Mode::Builder).await;
    assert!(
        output
            .result
            .starts_with(&format!("Error: old_str found 2 times in {}.", path)),
        "got: {}",
        output.result
    );
    // The file must be untouched.
    assert_eq!(fs::read_to_string(&path).unwrap(), "ab\nab\n");
}

#[tokio::test]
async fn edit_file_rejects_missing_old_str() {
    let dir = TempDir::new().unwrap();
    let path = path_arg(&dir, "x");
    fs::write(&path, "ab\n").unwrap();

    let args = format!(
        r#"{{"path": "{}", "old_str": "zz", "new_str": "cd"}}"#,
        path
    );
    let output = execute_tool("edit_file", &args, Mode::Builder).await;
    assert!(output.result.starts_with("Error: old_str not found"));
}

#[tokio::test]
async fn glob_matches_and_skips_dotfiles() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/a.rs"), "").unwrap();
    fs::write(dir.path().join("src/b.txt"), "").unwrap();
    fs::write(dir.path().join(".hidden.rs"), "").unwrap();

    let args = format!(
        r#"{{"pattern": "**/*.rs", "cwd": "{}"}}"#,
        dir.path().to_string_lossy()
    );
    let output = execute_tool("glob", &args, Mode::Builder).await;
    assert_eq!(output.result, "src/a.rs");
}

#[tokio::test]
async fn grep_reports_path_line_and_content() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("code.rs"), "fn main() {}\nlet x = 1;\n").unwrap();

    let args = format!(
        r#"{{"pattern": "fn main", "path": "{}"}}"#,
        dir.path().to_string_lossy()
    );
    let output = execute_tool("grep", &args, Mode::Builder).await;
    assert!(output.result.contains("code.rs:1: fn main() {}"));
}

#[tokio::test]
async fn grep_context_lines_mark_the_match() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("code.txt"), "one\ntwo\nthree\nfour\n").unwrap();

    let args = format!(
        r#"{{"pattern": "three", "path": "{}", "context_lines": 1}}"#,
        dir.path().to_string_lossy()
    );
    let output = execute_tool("grep", &args, Mode::Builder).await;
    assert!(output.result.contains("  2: two"));
    assert!(output.result.contains("> 3: three"));
    assert!(output.result.contains("  4: four"));
}

#[tokio::test]
async fn grep_rejects_bad_regex() {
    let output = execute_tool("grep", r#"{"pattern": "("}"#, Mode::Builder).await;
    assert!(output.result.starts_with("Error: Invalid regex pattern"));
}

#[tokio::test]
async fn list_directory_marks_dirs_and_sizes() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("file.txt"), "12345").unwrap();

    let args = format!(r#"{{"path": "{}"}}"#, dir.path().to_string_lossy());
    let output = execute_tool("list_directory", &args, Mode::Builder).await;
    assert!(output.result.contains("sub/"));
    assert!(output.result.contains("file.txt (5B)"));
}

#[tokio::test]
async fn bash_reports_exit_code() {
    let output = execute_tool("bash", r#"{"command": "echo hi; exit 3"}"#, Mode::Builder).await;
    assert!(output.result.contains("hi"));
    assert!(output.result.contains("Exit code: 3"));
}

#[tokio::test]
async fn bash_captures_stderr() {
    let output = execute_tool("bash", r#"{"command": "echo oops 1>&2"}"#, Mode::Builder).await;
    assert!(output.result.contains("stderr: oops"));
}

#[tokio::test]
async fn unknown_tool_is_a_textual_error() {
    let output = execute_tool("definitely_not_a_tool", "{}", Mode::Builder).await;
    assert_eq!(
        output.result,
        "Error: Unknown tool \"definitely_not_a_tool\""
    );
}

#[tokio::test]
async fn invalid_arguments_fall_back_to_empty_object() {
    // Not valid JSON: the tool itself reports the missing path.
    let output = execute_tool("read_file", "{not json", Mode::Builder).await;
    assert_eq!(output.result, "Error: No path provided");
}

#[tokio::test]
async fn plan_mode_denies_mutating_tools_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let path = path_arg(&dir, "never.txt");

    let args = format!(r#"{{"path": "{}", "content": "nope"}}"#, path);
    let output = execute_tool("write_file", &args, Mode::Plan).await;
    assert!(output
        .result
        .starts_with("Error: Tool \"write_file\" is not available in PLAN mode"));
    assert!(!std::path::Path::new(&path).exists());

    let output = execute_tool("bash", r#"{"command": "echo hi"}"#, Mode::Plan).await;
    assert!(output
        .result
        .starts_with("Error: Tool \"bash\" is not available in PLAN mode"));
}

#[tokio::test]
async fn plan_mode_still_allows_read_only_tools() {
    let dir = TempDir::new().unwrap();
    let path = path_arg(&dir, "ok.txt");
    fs::write(&path, "readable").unwrap();

    let args = format!(r#"{{"path": "{}"}}"#, path);
    let output = execute_tool("read_file", &args, Mode::Plan).await;
    assert_eq!(output.result, "1\treadable");
}

#[test]
fn plan_schemas_expose_only_read_only_tools() {
    let plan_names: Vec<String> = definitions(Mode::Plan)
        .iter()
        .map(|d| d["function"]["name"].as_str().unwrap().to_string())
        .collect();
    assert!(!plan_names.is_empty());
    for name in &plan_names {
        assert!(is_read_only(name), "{} leaked into PLAN schemas", name);
    }

    let builder_names: Vec<String> = definitions(Mode::Builder)
        .iter()
        .map(|d| d["function"]["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(builder_names.len(), 8);
    assert!(builder_names.iter().any(|n| n == "bash"));
    assert!(builder_names.iter().any(|n| n == "edit_file"));
}
