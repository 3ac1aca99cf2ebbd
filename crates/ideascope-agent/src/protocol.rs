//! Control protocol handling for Claude Code communication.
//!
//! This module implements the bidirectional JSON protocol for communicating
//! with the Claude Code CLI over stdin/stdout, and translates its output into
//! [`AgentEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace, warn};

use crate::error::EngineError;
use crate::event::{AgentEvent, ToolInvocation, ToolVerdict};
use crate::types::{
    tool_result_text, ClaudeMessage, ContentItem, ControlRequest, ControlResponse,
    ControlResponseType, PermissionResult, SdkControlRequest, SdkControlRequestType, UserInput,
};

type EventTx = mpsc::Sender<Result<AgentEvent, EngineError>>;

/// Facts learned from the CLI while a run streams.
#[derive(Debug, Default)]
pub struct SessionInfo {
    /// Claude session id of the most recent run.
    pub session_id: Option<String>,
    /// Tools announced in the init message.
    pub tools: Vec<String>,
}

/// Protocol peer for bidirectional communication with Claude Code.
pub struct ProtocolPeer {
    stdin: Mutex<ChildStdin>,
}

impl ProtocolPeer {
    pub fn new(stdin: ChildStdin) -> Self {
        Self {
            stdin: Mutex::new(stdin),
        }
    }

    /// Initialize the control protocol.
    ///
    /// This should be called once after spawning before sending any other messages.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        let request = SdkControlRequest::new(SdkControlRequestType::Initialize { hooks: None });
        self.send_json(&request).await?;
        debug!("Control protocol initialized");
        Ok(())
    }

    /// Send the task prompt as the first user turn.
    pub async fn send_prompt(&self, prompt: &str) -> Result<(), EngineError> {
        self.send_json(&UserInput::new(prompt)).await
    }

    /// Send a JSON message to Claude's stdin.
    async fn send_json<T: serde::Serialize>(&self, message: &T) -> Result<(), EngineError> {
        let json = serde_json::to_string(message)?;
        trace!("Sending to stdin: {}", json);

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read stdout until the result message, forwarding events to `tx`.
    ///
    /// Returns [`EngineError::ChannelClosed`] as soon as the consumer drops the
    /// stream, so the caller can tear the process down.
    pub async fn pump(
        &self,
        stdout: ChildStdout,
        tx: &EventTx,
        session: &Arc<Mutex<SessionInfo>>,
    ) -> Result<(), EngineError> {
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        // tool_use id -> tool name, to attribute tool errors
        let mut tool_names: HashMap<String, String> = HashMap::new();

        loop {
            line.clear();
            let read = tokio::select! {
                read = reader.read_line(&mut line) => read,
                _ = tx.closed() => return Err(EngineError::ChannelClosed),
            };
            if read? == 0 {
                info!("Claude stdout closed (EOF)");
                return Ok(());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let message = match serde_json::from_str::<ClaudeMessage>(trimmed) {
                Ok(message) => message,
                Err(e) => {
                    let preview: String = trimmed.chars().take(200).collect();
                    warn!(error = %e, preview = %preview, "Failed to parse Claude message");
                    continue;
                }
            };
            trace!(message_type = message.kind(), "Parsed Claude message");

            match message {
                ClaudeMessage::System {
                    session_id, tools, ..
                } => {
                    let mut info = session.lock().await;
                    if let Some(sid) = session_id {
                        info!(session_id = %sid, "Captured Claude session ID");
                        info.session_id = Some(sid);
                    }
                    if !tools.is_empty() {
                        info.tools = tools;
                    }
                }
                ClaudeMessage::Assistant { message, .. } => {
                    for item in message.content {
                        match item {
                            ContentItem::Text { text } => {
                                send(tx, AgentEvent::Message { text }).await?;
                            }
                            ContentItem::ToolUse { id, name, .. } => {
                                tool_names.insert(id, name);
                            }
                            _ => {}
                        }
                    }
                }
                ClaudeMessage::User { message, .. } => {
                    for item in message.content {
                        if let ContentItem::ToolResult {
                            tool_use_id,
                            content,
                            is_error: Some(true),
                        } = item
                        {
                            let event = AgentEvent::Error {
                                message: tool_result_text(&content),
                                tool_name: tool_names.get(&tool_use_id).cloned(),
                            };
                            send(tx, event).await?;
                        }
                    }
                }
                ClaudeMessage::Result {
                    is_error,
                    subtype,
                    result,
                    session_id,
                } => {
                    if let Some(sid) = session_id {
                        session.lock().await.session_id = Some(sid);
                    }
                    if is_error.unwrap_or(false) {
                        let message = result
                            .as_ref()
                            .map(tool_result_text)
                            .or(subtype)
                            .unwrap_or_else(|| "execution failed".to_string());
                        send(
                            tx,
                            AgentEvent::Error {
                                message,
                                tool_name: None,
                            },
                        )
                        .await?;
                    }
                    info!(is_error = ?is_error, "Execution result received");
                    return Ok(());
                }
                ClaudeMessage::ControlRequest {
                    request_id,
                    request,
                } => {
                    self.handle_control_request(request_id, request, tx).await?;
                }
                ClaudeMessage::Unknown(value) => {
                    if value.get("type").and_then(|t| t.as_str()) != Some("control_response") {
                        debug!(message = %value, "Ignoring unknown Claude message");
                    }
                }
            }
        }
    }

    /// Answer a control request. Tool permission requests are surfaced to the
    /// consumer as tool_use events and answered with its verdict.
    async fn handle_control_request(
        &self,
        request_id: String,
        request: ControlRequest,
        tx: &EventTx,
    ) -> Result<(), EngineError> {
        let response = match request {
            ControlRequest::CanUseTool {
                tool_name,
                input,
                tool_use_id,
            } => {
                let call_id = tool_use_id.unwrap_or_else(|| request_id.clone());
                let (invocation, verdict_rx) = ToolInvocation::new(call_id, tool_name, input);
                send(tx, AgentEvent::ToolUse(invocation)).await?;

                let verdict = tokio::select! {
                    verdict = verdict_rx => verdict.unwrap_or_else(|_| ToolVerdict::skip("tool call was not permitted")),
                    _ = tx.closed() => return Err(EngineError::ChannelClosed),
                };
                let permission = match verdict {
                    ToolVerdict::Execute { args } => PermissionResult::Allow {
                        updated_input: args,
                    },
                    ToolVerdict::Skip { reason } => PermissionResult::Deny {
                        message: reason,
                        interrupt: None,
                    },
                };
                ControlResponse::new(ControlResponseType::Success {
                    request_id,
                    response: Some(serde_json::to_value(permission)?),
                })
            }
            ControlRequest::HookCallback { callback_id, .. } => {
                trace!(callback = %callback_id, "Allowing hook callback");
                ControlResponse::new(ControlResponseType::Success {
                    request_id,
                    response: Some(json!({
                        "hookSpecificOutput": { "permissionDecision": "allow" }
                    })),
                })
            }
        };

        self.send_json(&response).await
    }
}

async fn send(tx: &EventTx, event: AgentEvent) -> Result<(), EngineError> {
    tx.send(Ok(event))
        .await
        .map_err(|_| EngineError::ChannelClosed)
}
