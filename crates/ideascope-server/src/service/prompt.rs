//! Prompt assembly for analysis runs.

use std::fmt::Write;

use ideascope_core::{AnalysisMode, AnalysisOptions};

use super::analysis::SourceDocument;

/// Characters kept from each attached source.
const MAX_SOURCE_CHARS: usize = 20_000;

/// Build the engine prompt for an idea.
///
/// `resuming` adds a preamble asking the model to continue from the restored
/// state instead of starting over.
pub fn build_prompt(
    idea: &str,
    options: &AnalysisOptions,
    sources: &[SourceDocument],
    resuming: bool,
) -> String {
    let mut prompt = String::new();

    if resuming {
        prompt.push_str(
            "Continue the analysis from where the previous run stopped. \
             Do not repeat sections that are already written.\n\n",
        );
    }

    let depth = match options.mode {
        AnalysisMode::Quick => "Keep the analysis brief and focus on the key points.",
        AnalysisMode::Deep => "Research thoroughly and cover each section in depth.",
    };
    let _ = writeln!(
        prompt,
        "You are a {persona}. Analyze the following idea and write a structured report \
         in language '{language}'. {depth}",
        persona = options.persona,
        language = options.language,
    );
    if !options.allow_web_tools {
        prompt.push_str("Web tools are unavailable; rely on your own knowledge.\n");
    }

    let _ = write!(prompt, "\n<idea>\n{}\n</idea>\n", idea.trim());

    for source in sources {
        let content: String = source.content.chars().take(MAX_SOURCE_CHARS).collect();
        let _ = write!(
            prompt,
            "\n<source name=\"{}\">\n{}\n</source>\n",
            source.name, content
        );
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_idea_and_options() {
        let options = AnalysisOptions {
            persona: "investor".to_string(),
            language: "pt".to_string(),
            ..AnalysisOptions::default()
        };
        let prompt = build_prompt("  A bike-sharing app  ", &options, &[], false);
        assert!(prompt.contains("You are a investor"));
        assert!(prompt.contains("'pt'"));
        assert!(prompt.contains("<idea>\nA bike-sharing app\n</idea>"));
        assert!(!prompt.starts_with("Continue"));
    }

    #[test]
    fn test_prompt_with_sources_and_resume() {
        let sources = vec![SourceDocument {
            name: "notes.md".to_string(),
            content: "x".repeat(MAX_SOURCE_CHARS + 10),
        }];
        let options = AnalysisOptions {
            allow_web_tools: false,
            ..AnalysisOptions::default()
        };
        let prompt = build_prompt("idea", &options, &sources, true);
        assert!(prompt.starts_with("Continue the analysis"));
        assert!(prompt.contains("Web tools are unavailable"));
        assert!(prompt.contains("<source name=\"notes.md\">"));
        assert!(!prompt.contains(&"x".repeat(MAX_SOURCE_CHARS + 1)));
    }
}
