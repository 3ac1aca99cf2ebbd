//! Typed progress events and the normalization of raw engine output.

use serde_json::{Map, Value};
use tokio::sync::oneshot;

/// Field names that may carry tool arguments, in priority order.
///
/// Engines and older protocol versions disagree on where arguments live. The
/// first present, non-null field wins.
pub const TOOL_ARG_FIELDS: &[&str] = &["args", "arguments", "input", "parameters", "params"];

/// Field names that may carry the tool name, in priority order.
pub const TOOL_NAME_FIELDS: &[&str] = &["name", "toolName", "tool_name", "tool"];

const CALL_ID_FIELDS: &[&str] = &["id", "toolCallId", "tool_call_id", "call_id"];
const TEXT_FIELDS: &[&str] = &["text", "content", "delta"];
const ERROR_FIELDS: &[&str] = &["message", "error"];

/// A progress event from a running task.
#[derive(Debug)]
pub enum AgentEvent {
    /// Model output text.
    Message { text: String },
    /// The model wants to call a tool. The consumer must answer through
    /// [`ToolInvocation::resolve`]; an unanswered invocation is skipped.
    ToolUse(ToolInvocation),
    /// Something failed. `tool_name` is set for tool execution errors.
    Error {
        message: String,
        tool_name: Option<String>,
    },
    /// Anything else the engine emitted.
    Other { kind: String },
}

impl AgentEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Message { .. } => "message",
            Self::ToolUse(_) => "tool_use",
            Self::Error { .. } => "error",
            Self::Other { kind } => kind,
        }
    }
}

/// The consumer's answer to a tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolVerdict {
    /// Run the tool with these (possibly corrected) arguments.
    Execute { args: serde_json::Value },
    /// Do not run the tool.
    Skip { reason: String },
}

impl ToolVerdict {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip {
            reason: reason.into(),
        }
    }
}

/// A pending tool call.
#[derive(Debug)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub args: Value,
    permit: Option<oneshot::Sender<ToolVerdict>>,
}

impl ToolInvocation {
    /// Create an invocation and the receiver the engine waits on.
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        args: Value,
    ) -> (Self, oneshot::Receiver<ToolVerdict>) {
        let (tx, rx) = oneshot::channel();
        let invocation = Self {
            call_id: call_id.into(),
            name: name.into(),
            args,
            permit: Some(tx),
        };
        (invocation, rx)
    }

    /// Answer the engine. Only the first answer counts.
    pub fn resolve(&mut self, verdict: ToolVerdict) {
        if let Some(permit) = self.permit.take() {
            // The engine may already have given up on this call.
            let _ = permit.send(verdict);
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.permit.is_none()
    }
}

/// An event as parsed from an engine's JSON output, before a permit is
/// attached to tool calls.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Message {
        text: String,
    },
    ToolUse {
        call_id: String,
        name: String,
        args: Value,
    },
    Error {
        message: String,
        tool_name: Option<String>,
    },
    Other {
        kind: String,
    },
}

impl RawEvent {
    /// Parse a `{type: ...}` event object.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::Other {
                kind: "invalid".to_string(),
            };
        };
        let kind = obj.get("type").and_then(Value::as_str).unwrap_or("unknown");

        match kind {
            "message" | "text" | "text-delta" => Self::Message {
                text: first_str(obj, TEXT_FIELDS).unwrap_or_default(),
            },
            "tool_use" | "tool_call" | "tool-call" => Self::ToolUse {
                call_id: first_str(obj, CALL_ID_FIELDS)
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                name: first_str(obj, TOOL_NAME_FIELDS).unwrap_or_else(|| "unknown".to_string()),
                args: normalize_tool_args(obj),
            },
            "error" | "tool_error" | "tool-error" => Self::Error {
                message: first_str(obj, ERROR_FIELDS)
                    .unwrap_or_else(|| "unknown error".to_string()),
                tool_name: first_str(obj, TOOL_NAME_FIELDS),
            },
            other => Self::Other {
                kind: other.to_string(),
            },
        }
    }
}

/// Extract tool arguments from an event object.
///
/// Tries [`TOOL_ARG_FIELDS`] in order and returns the first candidate that is
/// present and not null. When none is present the arguments are `{}`.
pub fn normalize_tool_args(obj: &Map<String, Value>) -> Value {
    TOOL_ARG_FIELDS
        .iter()
        .filter_map(|field| obj.get(*field))
        .find(|candidate| !candidate.is_null())
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

fn first_str(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| obj.get(*field))
        .find_map(|v| v.as_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args_of(value: Value) -> Value {
        normalize_tool_args(value.as_object().unwrap())
    }

    #[test]
    fn test_args_field_wins_over_legacy_names() {
        let args = args_of(json!({"args": {"q": 1}, "arguments": {"q": 2}, "input": {"q": 3}}));
        assert_eq!(args, json!({"q": 1}));
    }

    #[test]
    fn test_fallback_order() {
        assert_eq!(args_of(json!({"arguments": {"a": 1}, "input": {"b": 2}})), json!({"a": 1}));
        assert_eq!(args_of(json!({"input": {"b": 2}, "parameters": {"c": 3}})), json!({"b": 2}));
        assert_eq!(args_of(json!({"parameters": {"c": 3}, "params": {"d": 4}})), json!({"c": 3}));
        assert_eq!(args_of(json!({"params": {"d": 4}})), json!({"d": 4}));
    }

    #[test]
    fn test_null_candidate_is_skipped() {
        assert_eq!(args_of(json!({"args": null, "input": {"b": 2}})), json!({"b": 2}));
    }

    #[test]
    fn test_missing_args_default_to_empty_object() {
        assert_eq!(args_of(json!({"name": "web_search"})), json!({}));
    }

    #[test]
    fn test_parse_tool_use_with_legacy_fields() {
        let raw = RawEvent::from_value(&json!({
            "type": "tool_call",
            "toolCallId": "call-1",
            "toolName": "web_search",
            "arguments": {"query": "rust"}
        }));
        assert_eq!(
            raw,
            RawEvent::ToolUse {
                call_id: "call-1".to_string(),
                name: "web_search".to_string(),
                args: json!({"query": "rust"}),
            }
        );
    }

    #[test]
    fn test_parse_message_and_error() {
        assert_eq!(
            RawEvent::from_value(&json!({"type": "message", "text": "hi"})),
            RawEvent::Message {
                text: "hi".to_string()
            }
        );
        assert_eq!(
            RawEvent::from_value(&json!({"type": "error", "error": "bad", "toolName": "web_search"})),
            RawEvent::Error {
                message: "bad".to_string(),
                tool_name: Some("web_search".to_string()),
            }
        );
        assert_eq!(
            RawEvent::from_value(&json!({"type": "step-finish"})),
            RawEvent::Other {
                kind: "step-finish".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unresolved_invocation_reports_closed_permit() {
        let (invocation, rx) = ToolInvocation::new("c1", "web_search", json!({}));
        drop(invocation);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_only_first_resolution_counts() {
        let (mut invocation, rx) = ToolInvocation::new("c1", "web_search", json!({}));
        invocation.resolve(ToolVerdict::skip("first"));
        invocation.resolve(ToolVerdict::skip("second"));
        assert!(invocation.is_resolved());
        assert_eq!(rx.await.unwrap(), ToolVerdict::skip("first"));
    }
}
