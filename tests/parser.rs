use mmcode::parser::{coerce_param, parse_assistant_text};
use serde_json::json;

#[test]
fn plain_content_untouched() {
    let output = parse_assistant_text("Hello, world!");
    assert_eq!(output.content, "Hello, world!");
    assert!(output.reasoning.is_empty());
    assert!(output.tool_calls.is_empty());
    assert!(!output.pending);
}

#[test]
fn think_block_extracted() {
    let output = parse_assistant_text("<think>Let me analyze this</think>Here is my response.");
    assert_eq!(output.reasoning, "Let me analyze this");
    assert_eq!(output.content, "Here is my response.");
    assert!(!output.pending);
}

#[test]
fn multiple_think_blocks_joined_with_newline() {
    let output = parse_assistant_text("<think>one</think>text<think>two</think>");
    assert_eq!(output.reasoning, "one\ntwo");
    assert_eq!(output.content, "text");
}

#[test]
fn unclosed_think_becomes_partial_reasoning() {
    let output = parse_assistant_text("<think>Still thinking about");
    assert_eq!(output.reasoning, "Still thinking about");
    assert!(output.content.is_empty());
    assert!(output.pending);
}

#[test]
fn unclosed_think_after_complete_block() {
    let output = parse_assistant_text("<think>done</think>visible<think>more");
    assert_eq!(output.reasoning, "done\nmore");
    assert_eq!(output.content, "visible");
    assert!(output.pending);
}

#[test]
fn tool_call_extracted_and_removed_from_content() {
    let raw = r#"Let me read the file.
<minimax:tool_call>
<invoke name="read_file">
<parameter name="path">src/main.rs</parameter>
</invoke>
</minimax:tool_call>"#;
    let output = parse_assistant_text(raw);
    assert_eq!(output.content, "Let me read the file.");
    assert_eq!(output.tool_calls.len(), 1);
    assert_eq!(output.tool_calls[0].name, "read_file");
    assert_eq!(output.tool_calls[0].arguments["path"], "src/main.rs");
}

#[test]
fn multiple_invokes_in_one_block() {
    let raw = r#"<minimax:tool_call>
<invoke name="read_file">
<parameter name="path">a.rs</parameter>
</invoke>
<invoke name="read_file">
<parameter name="path">b.rs</parameter>
</invoke>
</minimax:tool_call>"#;
    let output = parse_assistant_text(raw);
    assert_eq!(output.tool_calls.len(), 2);
    assert_eq!(output.tool_calls[0].arguments["path"], "a.rs");
    assert_eq!(output.tool_calls[1].arguments["path"], "b.rs");
}

#[test]
fn unclosed_tool_call_truncates_content() {
    let output = parse_assistant_text("Some content<minimax:tool_call><invoke name=\"bash\">");
    assert_eq!(output.content, "Some content");
    assert!(output.pending);
    assert!(output.tool_calls.is_empty());
}

#[test]
fn trailing_partial_tag_stripped() {
    for raw in ["Some content<thi", "Some content<minimax:tool", "Some content</think", "Some content<"] {
        let output = parse_assistant_text(raw);
        assert_eq!(output.content, "Some content", "input: {:?}", raw);
        assert!(output.pending, "input: {:?}", raw);
    }
}

#[test]
fn unrelated_tags_survive() {
    let output = parse_assistant_text("Use <code>foo</code> and <div>");
    assert_eq!(output.content, "Use <code>foo</code> and <div>");
    assert!(!output.pending);

    let output = parse_assistant_text("Inline math: a < b");
    assert_eq!(output.content, "Inline math: a < b");
}

#[test]
fn think_and_tool_call_together() {
    let raw = r#"<think>I should read the file first</think>
Let me check that file.
<minimax:tool_call>
<invoke name="read_file">
<parameter name="path">test.txt</parameter>
</invoke>
</minimax:tool_call>"#;
    let output = parse_assistant_text(raw);
    assert_eq!(output.reasoning, "I should read the file first");
    assert_eq!(output.content, "Let me check that file.");
    assert_eq!(output.tool_calls.len(), 1);
}

#[test]
fn content_never_contains_recognized_tags() {
    let buffers = [
        "<think>a</think>b<minimax:tool_call><invoke name=\"x\"></invoke></minimax:tool_call>c",
        "<think>only thinking",
        "text<minimax:tool_call>partial",
        "plain text with no tags at all",
        "<think>a</think><think>b",
    ];
    for raw in buffers {
        let output = parse_assistant_text(raw);
        assert!(!output.content.contains("<think>"), "input: {:?}", raw);
        assert!(
            !output.content.contains("<minimax:tool_call>"),
            "input: {:?}",
            raw
        );
    }
}

#[test]
fn reparsing_own_content_is_a_no_op() {
    let raw = "<think>plan</think>Answer text <code>kept</code>\n<minimax:tool_call><invoke name=\"glob\"><parameter name=\"pattern\">*.rs</parameter></invoke></minimax:tool_call>";
    let first = parse_assistant_text(raw);
    let second = parse_assistant_text(&first.content);
    assert_eq!(second.content, first.content);
    assert!(second.reasoning.is_empty());
    assert!(second.tool_calls.is_empty());
}

#[test]
fn every_prefix_is_streaming_safe() {
    let raw = "Hello <think>deep thought</think> world.\n<minimax:tool_call>\n<invoke name=\"read_file\">\n<parameter name=\"path\">a.txt</parameter>\n</invoke>\n</minimax:tool_call> Done.";
    let full = parse_assistant_text(raw);

    for (i, _) in raw.char_indices() {
        let parsed = parse_assistant_text(&raw[..i]);
        assert!(
            parsed.pending || full.content.starts_with(&parsed.content),
            "prefix at byte {} produced {:?}, full content {:?}",
            i,
            parsed.content,
            full.content
        );
    }
}

#[test]
fn parameter_values_coerce_in_order() {
    assert_eq!(coerce_param("true"), json!(true));
    assert_eq!(coerce_param("false"), json!(false));
    assert_eq!(coerce_param("42"), json!(42));
    assert_eq!(coerce_param("3.14"), json!(3.14));
    assert_eq!(coerce_param("hello"), json!("hello"));
    assert_eq!(coerce_param("[1,2,3]"), json!([1, 2, 3]));
    assert_eq!(coerce_param("{\"a\": 1}"), json!({"a": 1}));
    assert_eq!(coerce_param("{not json"), json!("{not json"));
}
