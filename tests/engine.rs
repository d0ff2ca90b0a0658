use mmcode::engine::synthesize_xml_tool_calls;
use mmcode::models::Mode;
use mmcode::parser::parse_assistant_text;
use mmcode::tools::execute_tool;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

/// XML fallback end to end: the block in the raw buffer becomes one
/// synthesized call whose arguments decode in the executor to the
/// coerced argument map.
#[tokio::test]
async fn xml_tool_call_arguments_survive_to_dispatch() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("a.txt");
    fs::write(&file, "first\nsecond\nthird").unwrap();

    let raw = format!(
        "Looking...<minimax:tool_call><invoke name=\"read_file\">\
         <parameter name=\"path\">{}</parameter>\
         <parameter name=\"start_line\">2</parameter>\
         </invoke></minimax:tool_call>",
        file.to_string_lossy()
    );

    let parsed = parse_assistant_text(&raw);
    assert_eq!(parsed.content, "Looking...");

    let calls = synthesize_xml_tool_calls(&parsed);
    assert_eq!(calls.len(), 1);
    assert!(calls[0].id.starts_with("xml_tc_"));
    assert_eq!(calls[0].function.name, "read_file");

    // Coerced types reach the tool intact: start_line is a number.
    let decoded: Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
    assert_eq!(decoded["start_line"], 2);

    let output = execute_tool(
        &calls[0].function.name,
        &calls[0].function.arguments,
        Mode::Builder,
    )
    .await;
    assert_eq!(output.result, "2\tsecond\n3\tthird");
}

#[tokio::test]
async fn synthesized_ids_are_unique_within_a_round() {
    let raw = "<minimax:tool_call>\
        <invoke name=\"glob\"><parameter name=\"pattern\">*.rs</parameter></invoke>\
        <invoke name=\"glob\"><parameter name=\"pattern\">*.toml</parameter></invoke>\
        </minimax:tool_call>";
    let parsed = parse_assistant_text(raw);
    let calls = synthesize_xml_tool_calls(&parsed);
    assert_eq!(calls.len(), 2);
    assert_ne!(calls[0].id, calls[1].id);
}
