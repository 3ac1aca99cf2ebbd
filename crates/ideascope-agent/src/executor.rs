//! Claude Code engine for running analysis tasks via subprocess.
//!
//! Each run spawns the CLI in stream-json mode with the stdio permission
//! prompt, so every tool call is surfaced as a `tool_use` event and waits for
//! the consumer's verdict. Checkpoints capture the Claude session id and are
//! restored with `--resume`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use ideascope_core::{Checkpoint, CheckpointId};

use crate::engine::{event_channel, CheckpointBackend, EventStream, RunRequest, RunSlot, TaskEngine};
use crate::error::EngineError;
use crate::protocol::{ProtocolPeer, SessionInfo};

/// A checkpoint and the Claude session it resumes.
#[derive(Debug, Clone)]
struct SessionSnapshot {
    checkpoint: Checkpoint,
    claude_session: String,
}

/// Engine backed by the Claude Code CLI.
///
/// # Example
///
/// ```rust,no_run
/// use ideascope_agent::{ClaudeEngine, RunRequest, TaskEngine};
/// use ideascope_core::{RunId, SessionId};
///
/// async fn run() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = ClaudeEngine::new("claude").with_model("claude-sonnet-4-20250514");
///     let _events = engine
///         .start_run(RunRequest {
///             run_id: RunId::generate(),
///             session_id: SessionId::new("s1"),
///             prompt: "Assess this idea".to_string(),
///             model: None,
///             max_iterations: 20,
///         })
///         .await?;
///     Ok(())
/// }
/// ```
pub struct ClaudeEngine {
    /// Path to the Claude CLI executable.
    claude_path: String,

    /// Working directory for the process.
    working_dir: PathBuf,

    /// Model used when the request does not name one.
    default_model: Option<String>,

    /// System prompt (optional).
    system_prompt: Option<String>,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,

    slot: RunSlot,
    session: Arc<Mutex<SessionInfo>>,
    /// Claude session to resume on the next run, set by `restore`.
    resume_from: Mutex<Option<String>>,
    snapshots: RwLock<HashMap<CheckpointId, SessionSnapshot>>,
}

impl ClaudeEngine {
    /// Create a new engine with the given path to the Claude CLI.
    ///
    /// The path can be just "claude" to use PATH lookup, or a full path.
    pub fn new(claude_path: impl Into<String>) -> Self {
        Self {
            claude_path: claude_path.into(),
            working_dir: PathBuf::from("."),
            default_model: None,
            system_prompt: None,
            env_vars: Vec::new(),
            slot: RunSlot::new(),
            session: Arc::new(Mutex::new(SessionInfo::default())),
            resume_from: Mutex::new(None),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Set a system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    fn build_command(&self, request: &RunRequest, resume: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.claude_path);

        cmd.arg("--output-format=stream-json")
            .arg("--input-format=stream-json")
            .arg("--verbose")
            .arg("--permission-prompt-tool")
            .arg("stdio")
            .arg("--max-turns")
            .arg(request.max_iterations.to_string());

        if let Some(model) = request.model.as_ref().or(self.default_model.as_ref()) {
            cmd.arg("--model").arg(model);
        }

        if let Some(system) = &self.system_prompt {
            cmd.arg("--append-system-prompt").arg(system);
        }

        if let Some(sid) = resume {
            cmd.arg("--resume").arg(sid);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&self.working_dir)
            .kill_on_drop(true);

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        cmd
    }
}

impl Default for ClaudeEngine {
    fn default() -> Self {
        Self::new("claude")
    }
}

#[async_trait]
impl TaskEngine for ClaudeEngine {
    async fn start_run(&self, request: RunRequest) -> Result<EventStream, EngineError> {
        let guard = self.slot.try_acquire()?;
        let resume = self.resume_from.lock().await.take();

        info!(
            run_id = %request.run_id,
            session_id = %request.session_id,
            resume = ?resume,
            prompt_len = request.prompt.len(),
            "Spawning Claude process"
        );

        let mut cmd = self.build_command(&request, resume.as_deref());
        debug!("Full command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| {
            error!(error = %e, "Failed to spawn Claude process");
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::ClaudeNotFound(self.claude_path.clone())
            } else {
                EngineError::SpawnError(e)
            }
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::ProtocolError("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::ProtocolError("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::ProtocolError("Failed to get stderr".to_string()))?;

        // Spawn stderr reader for logging
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            warn!(stderr = %trimmed, "Claude stderr");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Error reading Claude stderr");
                        break;
                    }
                }
            }
        });

        let (tx, stream) = event_channel(guard);
        let session = Arc::clone(&self.session);
        let prompt = request.prompt;
        let run_id = request.run_id;

        tokio::spawn(async move {
            let peer = ProtocolPeer::new(stdin);
            let pumped = async {
                peer.initialize().await?;
                peer.send_prompt(&prompt).await?;
                peer.pump(stdout, &tx, &session).await
            }
            .await;

            match pumped {
                Ok(()) => {
                    // Closing stdin ends the CLI's input loop.
                    drop(peer);
                    match child.wait().await {
                        Ok(status) if !status.success() => {
                            let code = status.code().unwrap_or(-1);
                            let _ = tx
                                .send(Err(EngineError::ProcessError(format!(
                                    "Claude exited with code {code}"
                                ))))
                                .await;
                        }
                        Ok(_) => info!(run_id = %run_id, "Claude process exited"),
                        Err(e) => warn!(error = %e, "Failed to wait for Claude process"),
                    }
                }
                Err(EngineError::ChannelClosed) => {
                    info!(run_id = %run_id, "Event stream dropped, stopping Claude process");
                }
                Err(e) => {
                    error!(run_id = %run_id, error = %e, "Claude execution failed");
                    let _ = tx.send(Err(e)).await;
                }
            }
            // child is killed on drop if still running
        });

        Ok(stream)
    }

    async fn list_tools(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.session.lock().await.tools.clone())
    }
}

#[async_trait]
impl CheckpointBackend for ClaudeEngine {
    async fn create(&self, name: &str) -> Result<Checkpoint, EngineError> {
        let claude_session = self
            .session
            .lock()
            .await
            .session_id
            .clone()
            .ok_or_else(|| EngineError::Checkpoint("no Claude session to snapshot".to_string()))?;

        let checkpoint = Checkpoint::new(name);
        info!(
            checkpoint_id = %checkpoint.id,
            name = %name,
            claude_session = %claude_session,
            "Checkpoint created"
        );
        self.snapshots.write().await.insert(
            checkpoint.id.clone(),
            SessionSnapshot {
                checkpoint: checkpoint.clone(),
                claude_session,
            },
        );
        Ok(checkpoint)
    }

    async fn list(&self) -> Result<Vec<Checkpoint>, EngineError> {
        let mut checkpoints: Vec<Checkpoint> = self
            .snapshots
            .read()
            .await
            .values()
            .map(|s| s.checkpoint.clone())
            .collect();
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(checkpoints)
    }

    async fn restore(&self, id: &CheckpointId) -> Result<(), EngineError> {
        let claude_session = self
            .snapshots
            .read()
            .await
            .get(id)
            .map(|s| s.claude_session.clone())
            .ok_or_else(|| EngineError::CheckpointNotFound(id.to_string()))?;
        *self.resume_from.lock().await = Some(claude_session);
        Ok(())
    }

    async fn delete(&self, id: &CheckpointId) -> Result<bool, EngineError> {
        Ok(self.snapshots.write().await.remove(id).is_some())
    }
}
