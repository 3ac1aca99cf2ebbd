//! Stored analysis reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnalysisMode, ReportId, RunResult, SessionId};

/// Length of the idea excerpt shown in report listings.
const EXCERPT_CHARS: usize = 120;

/// The caller-facing knobs a report was produced with, kept so the same
/// analysis can be re-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    pub mode: AnalysisMode,
    pub language: String,
    pub persona: String,
    pub model: Option<String>,
    pub allow_web_tools: bool,
    pub auto_continue: bool,
    pub approval_required: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Quick,
            language: "en".to_string(),
            persona: "analyst".to_string(),
            model: None,
            allow_web_tools: true,
            auto_continue: false,
            approval_required: true,
        }
    }
}

/// A completed or partial analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub idea: String,
    pub session_id: SessionId,
    pub options: AnalysisOptions,
    pub result: RunResult,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn new(
        idea: impl Into<String>,
        session_id: SessionId,
        options: AnalysisOptions,
        result: RunResult,
    ) -> Self {
        Self {
            id: ReportId::generate(),
            idea: idea.into(),
            session_id,
            options,
            result,
            created_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            id: self.id.clone(),
            idea_excerpt: excerpt(&self.idea),
            mode: self.options.mode,
            persona: self.options.persona.clone(),
            interrupted: self.result.interrupted,
            progress: self.result.progress,
            created_at: self.created_at,
        }
    }
}

/// Listing view of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: ReportId,
    pub idea_excerpt: String,
    pub mode: AnalysisMode,
    pub persona: String,
    pub interrupted: bool,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
}

fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
