//! ideascope analysis server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ideascope_agent::ClaudeEngine;
use ideascope_core::QuickLimits;
use ideascope_server::config::parse_env_pair;
use ideascope_server::{http, spawn_retention_sweep, AppState, CallCounting, Config};

/// Idea analysis server backed by the Claude Code CLI.
#[derive(Parser, Debug)]
#[command(name = "ideascope-server", about = "Idea analysis server")]
struct Args {
    /// HTTP server address
    #[arg(long, env = "IDEASCOPE_BIND_ADDR", default_value = "127.0.0.1:8080")]
    bind_addr: String,

    /// Path to the claude binary
    #[arg(long, env = "IDEASCOPE_CLAUDE_PATH", default_value = "claude")]
    claude_path: String,

    /// Working directory for engine runs
    #[arg(long, env = "IDEASCOPE_WORKING_DIR")]
    working_dir: Option<PathBuf>,

    /// Model used when a request does not name one
    #[arg(long, env = "IDEASCOPE_MODEL")]
    model: Option<String>,

    /// Text appended to the engine's system prompt
    #[arg(long, env = "IDEASCOPE_SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    /// Extra environment variable for the engine process, as KEY=VALUE (repeatable)
    #[arg(long = "engine-env", value_parser = parse_env_pair)]
    engine_env: Vec<(String, String)>,

    /// Tool-call budget for quick mode
    #[arg(long, env = "IDEASCOPE_QUICK_MAX_TOOL_CALLS", default_value = "5")]
    quick_max_tool_calls: u32,

    /// Iteration budget for quick mode
    #[arg(long, env = "IDEASCOPE_QUICK_MAX_ITERATIONS", default_value = "20")]
    quick_max_iterations: u32,

    /// Wall-clock budget for quick mode, in seconds
    #[arg(long, env = "IDEASCOPE_QUICK_TIMEOUT_SECS", default_value = "120")]
    quick_timeout_secs: u64,

    /// How long undecided approvals are kept, in seconds
    #[arg(long, env = "IDEASCOPE_APPROVAL_RETENTION_SECS", default_value = "3600")]
    approval_retention_secs: u64,

    /// Continuation rounds per request when auto-continue is on
    #[arg(long, env = "IDEASCOPE_MAX_AUTO_CONTINUES", default_value = "3")]
    max_auto_continues: u32,

    /// Which tool calls count against the budget: every-call or executed-only
    #[arg(long, env = "IDEASCOPE_CALL_COUNTING", default_value = "every-call")]
    call_counting: CallCounting,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind_addr,
            claude_path: args.claude_path,
            working_dir: args.working_dir,
            default_model: args.model,
            system_prompt: args.system_prompt,
            engine_env: args.engine_env,
            quick: QuickLimits {
                max_tool_calls: args.quick_max_tool_calls,
                max_iterations: args.quick_max_iterations,
                timeout: Duration::from_secs(args.quick_timeout_secs),
            },
            approval_retention: Duration::from_secs(args.approval_retention_secs),
            max_auto_continues: args.max_auto_continues,
            call_counting: args.call_counting,
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ideascope_server=info,ideascope_agent=info,tower_http=info")),
        )
        .with_target(true)
        .init();

    let config = Config::from(Args::parse());

    let mut engine = ClaudeEngine::new(config.claude_path.clone());
    if let Some(dir) = &config.working_dir {
        engine = engine.with_working_dir(dir.clone());
    }
    if let Some(model) = &config.default_model {
        engine = engine.with_model(model.clone());
    }
    if let Some(prompt) = &config.system_prompt {
        engine = engine.with_system_prompt(prompt.clone());
    }
    for (key, value) in &config.engine_env {
        engine = engine.with_env(key.clone(), value.clone());
    }

    let state = AppState::new(config.clone(), Arc::new(engine));
    let sweep = spawn_retention_sweep(
        Arc::clone(&state.approvals),
        config.retention_sweep_interval,
    );

    let router = http::create_router(state);
    let listener = TcpListener::bind(&config.bind_addr).await?;

    info!(
        addr = %config.bind_addr,
        claude_path = %config.claude_path,
        call_counting = %config.call_counting,
        "ideascope server listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweep.abort();
    info!("ideascope server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
