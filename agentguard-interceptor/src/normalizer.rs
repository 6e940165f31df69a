//! Heterogeneous payload normalization into an [`Action`] (§4.1).
//!
//! Three entry points cover the payload shapes a tool invocation can arrive
//! in; [`normalize`] dispatches between them by inspecting the shape of the
//! raw payload so callers do not have to know in advance which one applies.

use agentguard_core::{infer_action_type, Action, ActionType};
use serde_json::Value as Json;
use std::collections::BTreeMap;

fn parse_action_type(s: &str) -> Option<ActionType> {
    match s {
        "tool_call" => Some(ActionType::ToolCall),
        "shell_command" => Some(ActionType::ShellCommand),
        "file_read" => Some(ActionType::FileRead),
        "file_write" => Some(ActionType::FileWrite),
        "http_request" => Some(ActionType::HttpRequest),
        "memory_write" => Some(ActionType::MemoryWrite),
        "credential_access" => Some(ActionType::CredentialAccess),
        _ => None,
    }
}

fn json_object_to_params(value: Option<&Json>) -> BTreeMap<String, Json> {
    match value {
        Some(Json::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => BTreeMap::new(),
    }
}

fn finish(tool_name: String, action_type: Option<ActionType>, parameters: BTreeMap<String, Json>, raw: Json) -> Action {
    let action_type = action_type.unwrap_or_else(|| infer_action_type(&tool_name, &parameters));
    Action::new(tool_name, action_type).with_parameters(parameters).with_raw_payload(raw)
}

/// Generic mapping: `tool_name|name|tool`, `parameters|args|input`, optional
/// `action_type|type`.
pub fn normalize_generic(payload: &Json) -> Action {
    let obj = payload.as_object();
    let tool_name = obj
        .and_then(|o| o.get("tool_name").or_else(|| o.get("name")).or_else(|| o.get("tool")))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let parameters = json_object_to_params(
        obj.and_then(|o| o.get("parameters").or_else(|| o.get("args")).or_else(|| o.get("input"))),
    );

    let declared_type = obj
        .and_then(|o| o.get("action_type").or_else(|| o.get("type")))
        .and_then(|v| v.as_str())
        .and_then(parse_action_type);

    finish(tool_name, declared_type, parameters, payload.clone())
}

/// Vendor-specific tool-call envelope: `{"function": {"name", "arguments"}}`,
/// where `arguments` is a JSON-encoded string. Malformed JSON never raises —
/// it degrades to a single `raw` parameter carrying the original string.
pub fn normalize_tool_call_envelope(payload: &Json) -> Action {
    let function = payload.get("function").cloned().unwrap_or(Json::Null);
    let tool_name = function
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let parameters = match function.get("arguments") {
        Some(Json::String(raw)) => match serde_json::from_str::<Json>(raw) {
            Ok(Json::Object(map)) => map.into_iter().collect(),
            Ok(other) => {
                let mut m = BTreeMap::new();
                m.insert("raw".to_string(), other);
                m
            }
            Err(_) => {
                let mut m = BTreeMap::new();
                m.insert("raw".to_string(), Json::String(raw.clone()));
                m
            }
        },
        Some(Json::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => BTreeMap::new(),
    };

    let declared_type = payload
        .get("action_type")
        .or_else(|| payload.get("type"))
        .and_then(|v| v.as_str())
        .and_then(parse_action_type);

    finish(tool_name, declared_type, parameters, payload.clone())
}

/// Framework message: either a `tool_calls` list (each entry a tool-call
/// envelope) or a flat `name`+`args` pair. Returns every action the message
/// carries, in order.
pub fn normalize_framework_message(payload: &Json) -> Vec<Action> {
    if let Some(Json::Array(calls)) = payload.get("tool_calls") {
        return calls.iter().map(normalize_tool_call_envelope).collect();
    }

    if payload.get("name").is_some() {
        let tool_name = payload.get("name").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        let parameters = json_object_to_params(payload.get("args").or_else(|| payload.get("arguments")));
        return vec![finish(tool_name, None, parameters, payload.clone())];
    }

    vec![normalize_generic(payload)]
}

/// Dispatch on payload shape: a `tool_calls` list or `function` envelope
/// routes to the framework/tool-call normalizers (first action wins when
/// several are present — the interceptor evaluates one action per call);
/// everything else is treated as a generic mapping.
pub fn normalize(payload: &Json, _framework: Option<&str>) -> Action {
    if payload.get("tool_calls").is_some() {
        return normalize_framework_message(payload)
            .into_iter()
            .next()
            .unwrap_or_else(|| normalize_generic(payload));
    }
    if payload.get("function").is_some() {
        return normalize_tool_call_envelope(payload);
    }
    if payload.get("name").is_some() && payload.get("tool_name").is_none() && payload.get("args").is_some() {
        return normalize_framework_message(payload).into_iter().next().unwrap_or_else(|| normalize_generic(payload));
    }
    normalize_generic(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generic_mapping_infers_type_from_tool_name() {
        let action = normalize_generic(&json!({"tool_name": "bash", "parameters": {"command": "ls"}}));
        assert_eq!(action.action_type, ActionType::ShellCommand);
        assert_eq!(action.tool_name, "bash");
    }

    #[test]
    fn generic_mapping_accepts_alternate_keys() {
        let action = normalize_generic(&json!({"name": "read_file", "args": {"path": "notes.txt"}}));
        assert_eq!(action.action_type, ActionType::FileRead);
    }

    #[test]
    fn explicit_action_type_is_trusted_over_inference() {
        let action = normalize_generic(&json!({
            "tool_name": "read_file",
            "parameters": {"path": "notes.txt"},
            "action_type": "memory_write",
        }));
        assert_eq!(action.action_type, ActionType::MemoryWrite);
    }

    #[test]
    fn tool_call_envelope_parses_json_string_arguments() {
        let action = normalize_tool_call_envelope(&json!({
            "function": {"name": "http_post", "arguments": "{\"url\": \"https://evil.example.com\"}"}
        }));
        assert_eq!(action.action_type, ActionType::HttpRequest);
        assert_eq!(action.parameters.get("url").and_then(|v| v.as_str()), Some("https://evil.example.com"));
    }

    #[test]
    fn tool_call_envelope_never_raises_on_malformed_arguments() {
        let action = normalize_tool_call_envelope(&json!({
            "function": {"name": "weird_tool", "arguments": "not json at all"}
        }));
        assert_eq!(action.parameters.get("raw").and_then(|v| v.as_str()), Some("not json at all"));
    }

    #[test]
    fn framework_message_expands_tool_calls_list() {
        let payload = json!({
            "tool_calls": [
                {"function": {"name": "bash", "arguments": "{\"command\": \"ls\"}"}},
                {"function": {"name": "curl", "arguments": "{\"url\": \"https://example.com\"}"}}
            ]
        });
        let actions = normalize_framework_message(&payload);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_type, ActionType::ShellCommand);
        assert_eq!(actions[1].action_type, ActionType::HttpRequest);
    }

    #[test]
    fn framework_message_handles_flat_name_args_pair() {
        let payload = json!({"name": "save_file", "args": {"path": "out.txt"}});
        let actions = normalize_framework_message(&payload);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::FileWrite);
    }

    #[test]
    fn credential_path_upgrades_regardless_of_entry_point_p1() {
        let action = normalize_generic(&json!({"tool_name": "read_file", "parameters": {"path": "~/.ssh/id_rsa"}}));
        assert_eq!(action.action_type, ActionType::CredentialAccess);
    }
}
