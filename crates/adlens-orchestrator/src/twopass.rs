//! Draft-then-critique protocol for high-stakes outputs.
//!
//! The draft pass runs a creative model at moderate temperature; the
//! critique pass runs a reasoning model at near-zero temperature over the
//! serialized draft. The merge policy is fixed: the draft's data is always
//! the final answer, and the critique only annotates it. A failed or
//! unparseable critique therefore degrades the annotation, never the data.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use adlens_core::{CompletionOptions, ResponseFormat, TaskIntent};

use crate::classifier::parse_json_object;

/// Sampling temperature for the draft pass.
pub const DRAFT_TEMPERATURE: f32 = 0.3;

/// Sampling temperature for the critique pass.
pub const CRITIQUE_TEMPERATURE: f32 = 0.1;

/// Completion token limit for the critique pass.
const CRITIQUE_MAX_TOKENS: u32 = 1_024;

/// Character budget for the original prompt echoed into the critique.
const CRITIQUE_PROMPT_ECHO_CHARS: usize = 1_500;

/// Which pass of the protocol a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoPassPhase {
    /// First pass: produce the candidate output.
    Draft,
    /// Second pass: evaluate the candidate output.
    Critique,
}

impl Display for TwoPassPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Critique => write!(f, "critique"),
        }
    }
}

/// Structured verdict returned by the critique pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueJudgment {
    /// Whether the draft holds up under scrutiny.
    pub validation_passed: bool,
    /// Rigor score in `[0, 1]`.
    pub rigor_score: f64,
    /// Gaps the critique found in the draft.
    pub gaps: Vec<String>,
    /// Concrete improvement suggestions.
    pub suggestions: Vec<String>,
}

/// Lenient wire schema for the critique verdict.
#[derive(Debug, Deserialize)]
struct RawJudgment {
    validation_passed: Option<bool>,
    rigor_score: Option<f64>,
    gaps: Option<Vec<String>>,
    suggestions: Option<Vec<String>>,
}

/// Parses a critique verdict from model output, tolerating surrounding
/// prose. `None` when no JSON object can be salvaged.
#[must_use]
pub fn parse_judgment(text: &str) -> Option<CritiqueJudgment> {
    let raw = parse_json_object::<RawJudgment>(text)?;
    Some(CritiqueJudgment {
        validation_passed: raw.validation_passed.unwrap_or(false),
        rigor_score: raw.rigor_score.unwrap_or(0.0).clamp(0.0, 1.0),
        gaps: raw.gaps.unwrap_or_default(),
        suggestions: raw.suggestions.unwrap_or_default(),
    })
}

/// Call options for the draft pass.
#[must_use]
pub fn draft_options(max_tokens: u32, response_format: ResponseFormat) -> CompletionOptions {
    CompletionOptions::default()
        .with_temperature(DRAFT_TEMPERATURE)
        .with_max_tokens(max_tokens)
        .with_response_format(response_format)
}

/// Call options for the critique pass. Always JSON.
#[must_use]
pub fn critique_options() -> CompletionOptions {
    CompletionOptions::default()
        .with_temperature(CRITIQUE_TEMPERATURE)
        .with_max_tokens(CRITIQUE_MAX_TOKENS)
        .with_response_format(ResponseFormat::Json)
}

/// System prompt for the draft pass, framed per intent.
#[must_use]
pub fn draft_system_prompt(intent: TaskIntent) -> String {
    let framing = match intent {
        TaskIntent::Ideation => "You are a senior marketing strategist generating bold, concrete campaign ideas.",
        TaskIntent::Analysis => "You are a marketing analyst producing a thorough first-pass analysis.",
        TaskIntent::Summarization => "You are an analyst drafting a faithful, complete summary.",
        TaskIntent::Reasoning => "You are an analyst reasoning step by step toward a defensible conclusion.",
        TaskIntent::Classification => "You are an analyst assigning inputs to categories with justification.",
        TaskIntent::Critique => "You are an analyst drafting a candid evaluation.",
    };
    format!("{framing} This is a first draft; favor completeness over polish.")
}

/// Prompts for the critique pass: the serialized draft plus a truncated
/// echo of the original request for context.
#[must_use]
pub fn critique_prompts(draft_text: &str, original_prompt: &str) -> (String, String) {
    let system = "You are a rigorous reviewer. Evaluate the draft below against the \
                  original request. Answer with one JSON object: \
                  {\"validation_passed\": boolean, \"rigor_score\": number 0-1, \
                  \"gaps\": [strings], \"suggestions\": [strings]}. No prose."
        .to_owned();

    let echo: String = original_prompt
        .chars()
        .take(CRITIQUE_PROMPT_ECHO_CHARS)
        .collect();
    let user = format!("Original request:\n{echo}\n\nDraft to evaluate:\n{draft_text}");

    (system, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_judgment_full_schema() {
        let text = r#"{"validation_passed": true, "rigor_score": 0.82,
                       "gaps": ["no budget breakdown"], "suggestions": ["add timeline"]}"#;
        let judgment = parse_judgment(text).expect("parseable");
        assert!(judgment.validation_passed);
        assert!((judgment.rigor_score - 0.82).abs() < f64::EPSILON);
        assert_eq!(judgment.gaps, vec!["no budget breakdown"]);
        assert_eq!(judgment.suggestions, vec!["add timeline"]);
    }

    #[test]
    fn test_parse_judgment_defaults_and_clamps() {
        let judgment = parse_judgment(r#"{"rigor_score": 3.5}"#).expect("parseable");
        assert!(!judgment.validation_passed);
        assert!((judgment.rigor_score - 1.0).abs() < f64::EPSILON);
        assert!(judgment.gaps.is_empty());
    }

    #[test]
    fn test_parse_judgment_tolerates_prose() {
        let wrapped = "Verdict follows.\n```json\n{\"validation_passed\": false, \
                       \"rigor_score\": 0.4, \"gaps\": [], \"suggestions\": []}\n```";
        let judgment = parse_judgment(wrapped).expect("salvageable");
        assert!(!judgment.validation_passed);
    }

    #[test]
    fn test_parse_judgment_rejects_non_json() {
        assert!(parse_judgment("the draft looks fine to me").is_none());
    }

    #[test]
    fn test_pass_temperatures() {
        let draft = draft_options(2_048, ResponseFormat::Text);
        let critique = critique_options();
        assert!(draft.temperature > critique.temperature);
        assert!((critique.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(critique.response_format, ResponseFormat::Json);
    }

    #[test]
    fn test_critique_prompt_truncates_original() {
        let long_prompt = "q".repeat(10_000);
        let (_, user) = critique_prompts("draft body", &long_prompt);
        assert!(user.len() < 4_000);
        assert!(user.contains("draft body"));
    }
}
