use mmcode::models::ToolCall;
use mmcode::session::{SessionStore, DEFAULT_SESSION_NAME};
use tempfile::TempDir;

#[test]
fn create_list_and_delete_sessions() {
    let store = SessionStore::open_in_memory().unwrap();
    let s1 = store.create_session("MiniMax-M2.5").unwrap();
    let s2 = store.create_session("MiniMax-M2.5-highspeed").unwrap();
    assert_eq!(s1.name, DEFAULT_SESSION_NAME);

    let sessions = store.list_sessions().unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(sessions.len(), 2);
    assert!(ids.contains(&s1.id.as_str()));
    assert!(ids.contains(&s2.id.as_str()));

    store.delete_session(&s1.id).unwrap();
    assert_eq!(store.list_sessions().unwrap().len(), 1);
}

#[test]
fn delete_session_cascades_to_messages() {
    let store = SessionStore::open_in_memory().unwrap();
    let s = store.create_session("MiniMax-M2.5").unwrap();
    store
        .save_message(&s.id, "user", "hello", None, None, None)
        .unwrap();
    assert_eq!(store.session_messages(&s.id).unwrap().len(), 1);

    store.delete_session(&s.id).unwrap();
    assert!(store.session_messages(&s.id).unwrap().is_empty());
}

#[test]
fn message_ids_are_strictly_increasing() {
    let store = SessionStore::open_in_memory().unwrap();
    let s = store.create_session("MiniMax-M2.5").unwrap();

    let mut last = 0;
    for i in 0..10 {
        let id = store
            .save_message(&s.id, "user", &format!("msg {}", i), None, None, None)
            .unwrap();
        assert!(id > last);
        last = id;
    }

    let messages = store.session_messages(&s.id).unwrap();
    for pair in messages.windows(2) {
        assert!(pair[0].id < pair[1].id);
    }
}

#[test]
fn first_message_titles_session_exactly_once() {
    let store = SessionStore::open_in_memory().unwrap();
    let s = store.create_session("MiniMax-M2.5").unwrap();

    store
        .maybe_title_session(&s.id, "Fix the\nlogin bug")
        .unwrap();
    let titled = store.get_session(&s.id).unwrap().unwrap();
    assert_eq!(titled.name, "Fix the login bug");

    // A later message must not retitle.
    store
        .maybe_title_session(&s.id, "unrelated follow-up")
        .unwrap();
    let after = store.get_session(&s.id).unwrap().unwrap();
    assert_eq!(after.name, "Fix the login bug");
}

#[test]
fn session_title_caps_at_fifty_chars() {
    let store = SessionStore::open_in_memory().unwrap();
    let s = store.create_session("MiniMax-M2.5").unwrap();

    let long = "x".repeat(80);
    store.maybe_title_session(&s.id, &long).unwrap();
    let titled = store.get_session(&s.id).unwrap().unwrap();
    assert_eq!(titled.name.chars().count(), 50);
}

#[test]
fn assistant_tool_calls_round_trip() {
    let store = SessionStore::open_in_memory().unwrap();
    let s = store.create_session("MiniMax-M2.5").unwrap();

    let calls = vec![
        ToolCall::new("c1", "glob", r#"{"pattern":"*.txt"}"#),
        ToolCall::new("c2", "read_file", r#"{"path":"a.txt"}"#),
    ];
    let calls_json = serde_json::to_string(&calls).unwrap();

    store
        .save_message(&s.id, "assistant", "", Some(&calls_json), None, None)
        .unwrap();
    store
        .save_message(&s.id, "tool", "output", None, Some("c1"), Some("glob"))
        .unwrap();

    let messages = store.session_messages(&s.id).unwrap();
    assert_eq!(messages.len(), 2);

    let reloaded: Vec<ToolCall> =
        serde_json::from_str(messages[0].tool_calls.as_deref().unwrap()).unwrap();
    assert_eq!(reloaded, calls);
    assert_eq!(messages[1].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(messages[1].name.as_deref(), Some("glob"));

    // Rebuilding the wire message keeps ids, names, and argument strings.
    let wire = messages[0].to_message();
    assert_eq!(wire.role, "assistant");
    assert_eq!(wire.tool_calls.as_deref(), Some(calls.as_slice()));

    let tool_wire = messages[1].to_message();
    assert_eq!(tool_wire.tool_call_id.as_deref(), Some("c1"));
    assert!(tool_wire.tool_calls.is_none());
}

#[test]
fn store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("sessions.db");

    let session_id = {
        let store = SessionStore::open_at(db_path.clone()).unwrap();
        let s = store.create_session("MiniMax-M2.5").unwrap();
        store
            .save_message(&s.id, "user", "persisted", None, None, None)
            .unwrap();
        s.id
    };

    let store = SessionStore::open_at(db_path).unwrap();
    let messages = store.session_messages(&session_id).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "persisted");
}
