//! Per-run tool-call inspection: argument correction, budget enforcement,
//! and classification of gated tools.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};
use tracing::{debug, warn};

/// Tool-name prefixes subject to human approval (the web search and scrape
/// family). Matching ignores case, `_` and `-`, so `WebSearch` is gated too.
pub const GATED_TOOL_PREFIXES: &[&str] = &["web_search", "web_fetch", "web_scrape", "scrape"];

/// Fragments of parameter-shape errors raised by gated tools.
const GATED_ERROR_SIGNATURES: &[&str] = &[
    "invalid_type",
    "expected object",
    "invalid arguments",
    "invalid_union",
    "sources",
];

fn squash(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn is_gated_tool(name: &str) -> bool {
    let name = squash(name);
    GATED_TOOL_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(&squash(prefix)))
}

/// Whether a tool error message looks like one of the known parameter-shape
/// failures of a gated tool.
pub fn is_gated_error(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    GATED_ERROR_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

fn is_web_search(name: &str) -> bool {
    squash(name).starts_with("websearch")
}

/// Rewrite deprecated argument shapes.
///
/// The web search tool takes `sources` as `[{"type": "web"}, ...]`; older
/// prompts pass `["web", ...]`. String elements are wrapped, anything else is
/// left alone, so applying this twice equals applying it once.
pub fn correct_tool_args(tool: &str, mut args: Value) -> Value {
    if !is_web_search(tool) {
        return args;
    }
    if let Some(Value::Array(sources)) = args.get_mut("sources") {
        for source in sources.iter_mut() {
            if let Value::String(kind) = source {
                *source = json!({ "type": kind.as_str() });
            }
        }
    }
    args
}

/// Which tool calls count against a run's budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallCounting {
    /// Every tool_use event, including calls skipped by a rejection.
    #[default]
    EveryCall,
    /// Only calls that are actually executed.
    ExecutedOnly,
}

impl CallCounting {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EveryCall => "every-call",
            Self::ExecutedOnly => "executed-only",
        }
    }
}

impl fmt::Display for CallCounting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallCounting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "every-call" | "every_call" | "all" => Ok(Self::EveryCall),
            "executed-only" | "executed_only" | "executed" => Ok(Self::ExecutedOnly),
            other => Err(format!("unknown call counting policy: {other}")),
        }
    }
}

/// What to do with a tool call after budget checks.
#[derive(Debug, Clone, PartialEq)]
pub enum Interception {
    /// Do not run the call.
    Skip { reason: String },
    /// The budget allows the call. Gated calls still need the approval gate.
    Proceed { args: Value, gated: bool },
}

/// Tool-call bookkeeping for one run.
#[derive(Debug)]
pub struct ToolCallInterceptor {
    budget: u32,
    counting: CallCounting,
    calls: u32,
    exceeded: bool,
}

impl ToolCallInterceptor {
    pub fn new(budget: u32, counting: CallCounting) -> Self {
        Self {
            budget,
            counting,
            calls: 0,
            exceeded: false,
        }
    }

    /// Inspect one tool_use event.
    ///
    /// A zero budget skips every call without marking the run interrupted.
    /// Going past a positive budget warns once, marks the budget exceeded, and
    /// skips this and every later call.
    pub fn intercept(&mut self, tool: &str, args: Value) -> Interception {
        let args = correct_tool_args(tool, args);

        let attempt = match self.counting {
            CallCounting::EveryCall => {
                self.calls += 1;
                self.calls
            }
            CallCounting::ExecutedOnly => self.calls + 1,
        };

        if self.budget == 0 {
            debug!(tool = %tool, "Tools disabled for this run, skipping call");
            return Interception::Skip {
                reason: "tool calls are disabled for this run".to_string(),
            };
        }

        if attempt > self.budget {
            if !self.exceeded {
                warn!(
                    tool = %tool,
                    budget = self.budget,
                    "Tool-call budget exceeded, skipping remaining calls"
                );
                self.exceeded = true;
            }
            return Interception::Skip {
                reason: format!("tool-call budget of {} exhausted", self.budget),
            };
        }

        Interception::Proceed {
            args,
            gated: is_gated_tool(tool),
        }
    }

    /// Record that an intercepted call was allowed to execute.
    pub fn record_executed(&mut self) {
        if self.counting == CallCounting::ExecutedOnly {
            self.calls += 1;
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }

    /// True once a call went past a positive budget.
    pub fn budget_exceeded(&self) -> bool {
        self.exceeded
    }
}
