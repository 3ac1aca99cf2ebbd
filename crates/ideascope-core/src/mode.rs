//! Analysis modes and the resource budgets they imply.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Tool-call budget used for deep runs. Effectively unlimited.
pub const DEEP_MAX_TOOL_CALLS: u32 = 999;
/// Iteration budget used for deep runs.
pub const DEEP_MAX_ITERATIONS: u32 = 50;
/// Wall-clock budget used for deep runs.
pub const DEEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Resource profile of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Tight budgets, configurable.
    #[default]
    Quick,
    /// Loose budgets.
    Deep,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "deep" => Ok(Self::Deep),
            other => Err(CoreError::UnknownMode(other.to_string())),
        }
    }
}

/// Configurable limits for quick mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickLimits {
    pub max_tool_calls: u32,
    pub max_iterations: u32,
    pub timeout: Duration,
}

impl Default for QuickLimits {
    fn default() -> Self {
        Self {
            max_tool_calls: 5,
            max_iterations: 20,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Per-run resource budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunBudget {
    /// Maximum number of tool calls. Zero means no tools may run.
    pub max_tool_calls: u32,
    /// Maximum number of model iterations, enforced by the engine.
    pub max_iterations: u32,
    /// Cooperative wall-clock timeout, checked between events.
    pub timeout: Duration,
}

impl RunBudget {
    /// Resolve the budget for a mode.
    ///
    /// When `allow_web_tools` is false the tool-call budget is forced to zero
    /// regardless of mode.
    pub fn for_mode(mode: AnalysisMode, quick: &QuickLimits, allow_web_tools: bool) -> Self {
        let mut budget = match mode {
            AnalysisMode::Quick => Self {
                max_tool_calls: quick.max_tool_calls,
                max_iterations: quick.max_iterations,
                timeout: quick.timeout,
            },
            AnalysisMode::Deep => Self {
                max_tool_calls: DEEP_MAX_TOOL_CALLS,
                max_iterations: DEEP_MAX_ITERATIONS,
                timeout: DEEP_TIMEOUT,
            },
        };
        if !allow_web_tools {
            budget.max_tool_calls = 0;
        }
        budget
    }

    /// Returns true if no tool may execute under this budget.
    pub fn tools_disabled(&self) -> bool {
        self.max_tool_calls == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_budget_uses_limits() {
        let limits = QuickLimits {
            max_tool_calls: 3,
            max_iterations: 7,
            timeout: Duration::from_secs(30),
        };
        let budget = RunBudget::for_mode(AnalysisMode::Quick, &limits, true);
        assert_eq!(budget.max_tool_calls, 3);
        assert_eq!(budget.max_iterations, 7);
        assert_eq!(budget.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_deep_budget() {
        let budget = RunBudget::for_mode(AnalysisMode::Deep, &QuickLimits::default(), true);
        assert_eq!(budget.max_tool_calls, 999);
        assert_eq!(budget.max_iterations, 50);
        assert_eq!(budget.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_web_tools_disabled_forces_zero_budget() {
        let budget = RunBudget::for_mode(AnalysisMode::Deep, &QuickLimits::default(), false);
        assert_eq!(budget.max_tool_calls, 0);
        assert!(budget.tools_disabled());
        assert_eq!(budget.timeout, DEEP_TIMEOUT);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Deep".parse::<AnalysisMode>().unwrap(), AnalysisMode::Deep);
        assert!("thorough".parse::<AnalysisMode>().is_err());
        assert_eq!(
            serde_json::to_string(&AnalysisMode::Quick).unwrap(),
            r#""quick""#
        );
    }
}
