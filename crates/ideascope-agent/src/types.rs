//! Type definitions for Claude Code control protocol messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level message from Claude Code CLI stdout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeMessage {
    /// System initialization message.
    System {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        tools: Vec<String>,
    },

    /// Assistant response message.
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// User message (carries tool results).
    User {
        message: UserMessage,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Execution result.
    Result {
        #[serde(default, alias = "isError")]
        is_error: Option<bool>,
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default, alias = "sessionId")]
        session_id: Option<String>,
    },

    /// Control request from CLI (needs response).
    ControlRequest {
        request_id: String,
        request: ControlRequest,
    },

    /// Unknown message type (fallback).
    #[serde(untagged)]
    Unknown(Value),
}

impl ClaudeMessage {
    /// Extract session ID from any message type.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::System { session_id, .. }
            | Self::Assistant { session_id, .. }
            | Self::User { session_id, .. }
            | Self::Result { session_id, .. } => session_id.as_deref(),
            Self::ControlRequest { .. } | Self::Unknown(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::Assistant { .. } => "assistant",
            Self::User { .. } => "user",
            Self::Result { .. } => "result",
            Self::ControlRequest { .. } => "control_request",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Assistant message content.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

/// User message content.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

/// Content item in a message.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Text content.
    Text { text: String },

    /// Thinking/reasoning content.
    Thinking { thinking: String },

    /// Tool use request.
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },

    /// Tool result.
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },

    #[serde(other)]
    Unknown,
}

/// Flatten tool result content (a string or a list of text blocks).
pub fn tool_result_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Control request from CLI to SDK.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Permission check for tool use.
    CanUseTool {
        tool_name: String,
        input: Value,
        #[serde(default)]
        tool_use_id: Option<String>,
    },

    /// Hook callback.
    HookCallback {
        callback_id: String,
        input: Value,
        #[serde(default)]
        tool_use_id: Option<String>,
    },
}

/// Permission result for tool use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "camelCase")]
pub enum PermissionResult {
    /// Allow the tool use.
    Allow {
        #[serde(rename = "updatedInput")]
        updated_input: Value,
    },

    /// Deny the tool use.
    Deny {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        interrupt: Option<bool>,
    },
}

/// Control request from SDK to CLI.
#[derive(Debug, Clone, Serialize)]
pub struct SdkControlRequest {
    #[serde(rename = "type")]
    pub message_type: String,
    pub request_id: String,
    pub request: SdkControlRequestType,
}

impl SdkControlRequest {
    pub fn new(request: SdkControlRequestType) -> Self {
        Self {
            message_type: "control_request".to_string(),
            request_id: uuid::Uuid::new_v4().to_string(),
            request,
        }
    }
}

/// Types of SDK control requests.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum SdkControlRequestType {
    /// Initialize the control protocol.
    Initialize {
        #[serde(skip_serializing_if = "Option::is_none")]
        hooks: Option<Value>,
    },
}

/// A user turn written to stdin in stream-json input mode.
#[derive(Debug, Clone, Serialize)]
pub struct UserInput {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub message: UserInputMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserInputMessage {
    pub role: &'static str,
    pub content: String,
}

impl UserInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            message_type: "user",
            message: UserInputMessage {
                role: "user",
                content: content.into(),
            },
        }
    }
}

/// Control response from SDK to CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    #[serde(rename = "type")]
    pub message_type: String,
    pub response: ControlResponseType,
}

impl ControlResponse {
    pub fn new(response: ControlResponseType) -> Self {
        Self {
            message_type: "control_response".to_string(),
            response,
        }
    }
}

/// Types of control responses.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlResponseType {
    /// Successful response.
    Success {
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<Value>,
    },

    /// Error response.
    Error {
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
