use serde_json::json;

use kiro_types::error::TranslationError;
use kiro_types::protocol::{CanonicalResponse, ContentBlock, Role, StopReason, Usage};

use super::{normalize_chat_request, render_chat_request, render_chat_response};

fn base(messages: serde_json::Value) -> serde_json::Value {
    json!({"model": "claude-sonnet-4-20250514", "messages": messages})
}

#[test]
fn test_system_and_developer_messages_become_system() {
    let raw = base(json!([
        {"role": "system", "content": "You are terse."},
        {"role": "developer", "content": [{"type": "text", "text": "Use metric units."}]},
        {"role": "user", "content": "Hi"},
    ]));
    let request = normalize_chat_request(&raw).unwrap().request;

    assert_eq!(request.system.as_deref(), Some("You are terse.\n\nUse metric units."));
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, Role::User);
}

#[test]
fn test_tool_calls_and_tool_runs() {
    let raw = json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 100,
        "max_completion_tokens": 200,
        "stream": true,
        "stream_options": {"include_usage": true},
        "stop": "END",
        "tools": [
            {"type": "function", "function": {"name": "weather", "parameters": {"type": "object"}}},
            {"type": "function", "function": {"name": "time"}},
        ],
        "messages": [
            {"role": "user", "content": "Weather and time in Paris?"},
            {"role": "assistant", "content": "Checking.", "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "weather", "arguments": "{\"city\":\"Paris\"}"}},
                {"id": "call_2", "type": "function", "function": {"name": "time", "arguments": ""}},
            ]},
            {"role": "tool", "tool_call_id": "call_1", "content": "18C"},
            {"role": "tool", "tool_call_id": "call_2", "content": "14:00"},
            {"role": "user", "content": "Thanks"},
        ],
    });
    let request = normalize_chat_request(&raw).unwrap().request;

    assert_eq!(request.max_tokens, Some(200));
    assert!(request.stream);
    assert!(request.stream_usage);
    assert_eq!(request.stop_sequences, vec!["END".to_string()]);
    assert_eq!(request.tools[1].input_schema, json!({"type": "object", "properties": {}}));

    assert_eq!(request.messages.len(), 4);
    let assistant = &request.messages[1];
    assert_eq!(assistant.content[0], ContentBlock::text("Checking."));
    assert_eq!(
        assistant.content[1],
        ContentBlock::ToolUse { id: "call_1".to_string(), name: "weather".to_string(), input: json!({"city": "Paris"}) }
    );
    assert_eq!(
        assistant.content[2],
        ContentBlock::ToolUse { id: "call_2".to_string(), name: "time".to_string(), input: json!({}) }
    );

    let results = &request.messages[2];
    assert_eq!(results.role, Role::User);
    assert_eq!(results.content.len(), 2);
    assert!(matches!(&results.content[1], ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "call_2"));
    assert_eq!(request.messages[3].content, vec![ContentBlock::text("Thanks")]);
}

#[test]
fn test_images_and_unknown_fields() {
    let mut raw = base(json!([{"role": "user", "content": [
        {"type": "text", "text": "Compare"},
        {"type": "image_url", "image_url": {"url": "data:image/png;base64,aGVsbG8="}},
        {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}},
    ]}]));
    raw["tool_choice"] = json!("auto");

    let normalized = normalize_chat_request(&raw).unwrap();
    assert_eq!(normalized.warnings.len(), 2);
    assert_eq!(
        normalized.request.messages[0].content,
        vec![
            ContentBlock::text("Compare"),
            ContentBlock::Image { media_type: "image/png".to_string(), data: "aGVsbG8=".to_string() },
        ]
    );
}

#[test]
fn test_rejected_inputs() {
    let unknown_role = base(json!([{"role": "narrator", "content": "hi"}]));
    assert!(matches!(normalize_chat_request(&unknown_role), Err(TranslationError::MalformedInput { .. })));

    let legacy = base(json!([{"role": "function", "name": "f", "content": "x"}]));
    assert!(matches!(normalize_chat_request(&legacy), Err(TranslationError::UnsupportedField { .. })));

    let orphan = base(json!([{"role": "tool", "content": "x"}]));
    assert!(matches!(normalize_chat_request(&orphan), Err(TranslationError::MalformedInput { .. })));

    let mut many = base(json!([{"role": "user", "content": "hi"}]));
    many["n"] = json!(2);
    assert!(matches!(normalize_chat_request(&many), Err(TranslationError::UnsupportedField { .. })));

    let mut no_function = base(json!([{"role": "user", "content": "hi"}]));
    no_function["tools"] = json!([{"type": "function"}]);
    assert!(matches!(normalize_chat_request(&no_function), Err(TranslationError::MalformedInput { .. })));

    let mut wrong_tool = base(json!([{"role": "user", "content": "hi"}]));
    wrong_tool["tools"] = json!([{"type": "code_interpreter"}]);
    assert!(matches!(normalize_chat_request(&wrong_tool), Err(TranslationError::UnsupportedField { .. })));

    let bad_args = base(json!([
        {"role": "user", "content": "hi"},
        {"role": "assistant", "tool_calls": [{"id": "c", "type": "function", "function": {"name": "f", "arguments": "{oops"}}]},
    ]));
    assert!(matches!(normalize_chat_request(&bad_args), Err(TranslationError::MalformedInput { .. })));

    let bad_data_url = base(json!([{"role": "user", "content": [
        {"type": "image_url", "image_url": {"url": "data:image/png;base64,%%%"}},
    ]}]));
    assert!(normalize_chat_request(&bad_data_url).is_err());
}

#[test]
fn test_round_trip_preserves_roles_blocks_and_tools() {
    let raw = json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 300,
        "stream": true,
        "stream_options": {"include_usage": true},
        "stop": ["A", "B"],
        "top_p": 0.25,
        "tools": [{"type": "function", "function": {
            "name": "lookup", "description": "Find things", "parameters": {"type": "object"},
        }}],
        "messages": [
            {"role": "system", "content": "Be helpful."},
            {"role": "user", "content": [
                {"type": "text", "text": "Look at"},
                {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,aGVsbG8="}},
            ]},
            {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}},
            ]},
            {"role": "tool", "tool_call_id": "call_1", "content": "found"},
            {"role": "user", "content": "And then?"},
        ],
    });
    let first = normalize_chat_request(&raw).unwrap().request;
    let rendered = render_chat_request(&first).unwrap();
    let second = normalize_chat_request(&rendered).unwrap().request;
    assert_eq!(first, second);
}

#[test]
fn test_response_rendering() {
    let response = CanonicalResponse {
        id: "msg_abc123".to_string(),
        model: "claude-sonnet-4-20250514".to_string(),
        created: 1_700_000_000,
        content: vec![
            ContentBlock::text("Looking "),
            ContentBlock::text("it up."),
            ContentBlock::ToolUse { id: "call_1".to_string(), name: "lookup".to_string(), input: json!({"q": "x"}) },
        ],
        stop_reason: StopReason::ToolUse,
        usage: Usage { input_tokens: 10, output_tokens: 4 },
    };
    let body = render_chat_response(&response);

    assert_eq!(body["id"], "chatcmpl-abc123");
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["created"], 1_700_000_000);
    let choice = &body["choices"][0];
    assert_eq!(choice["finish_reason"], "tool_calls");
    assert_eq!(choice["message"]["content"], "Looking it up.");
    assert_eq!(choice["message"]["tool_calls"][0]["function"]["name"], "lookup");
    let arguments: serde_json::Value =
        serde_json::from_str(choice["message"]["tool_calls"][0]["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(arguments, json!({"q": "x"}));
    assert_eq!(body["usage"]["total_tokens"], 14);

    let empty = CanonicalResponse { content: vec![], stop_reason: StopReason::EndTurn, ..response };
    let body = render_chat_response(&empty);
    assert!(body["choices"][0]["message"]["content"].is_null());
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}
