use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Enumerated category of a request's purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskIntent {
    /// Open-ended analysis of creative or market data.
    Analysis,
    /// Condensing source material into a shorter form.
    Summarization,
    /// Generating new creative or strategic ideas.
    Ideation,
    /// Assigning an input to one of a fixed set of categories.
    Classification,
    /// Multi-step logical reasoning over structured inputs.
    Reasoning,
    /// Evaluating and scoring another output.
    Critique,
}

impl TaskIntent {
    /// All intents in a fixed order.
    #[must_use]
    pub const fn all() -> [Self; 6] {
        [
            Self::Analysis,
            Self::Summarization,
            Self::Ideation,
            Self::Classification,
            Self::Reasoning,
            Self::Critique,
        ]
    }

    /// Parses an intent from its lowercase wire name, if recognized.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "analysis" => Some(Self::Analysis),
            "summarization" => Some(Self::Summarization),
            "ideation" => Some(Self::Ideation),
            "classification" => Some(Self::Classification),
            "reasoning" => Some(Self::Reasoning),
            "critique" => Some(Self::Critique),
            _ => None,
        }
    }

    /// Lowercase wire name for this intent.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Summarization => "summarization",
            Self::Ideation => "ideation",
            Self::Classification => "classification",
            Self::Reasoning => "reasoning",
            Self::Critique => "critique",
        }
    }
}

impl Display for TaskIntent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Estimated difficulty of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Trivial or short inputs.
    Low,
    /// Typical requests.
    Medium,
    /// Long, multi-part, or strategy-level requests.
    High,
}

impl Complexity {
    /// Parses a complexity from its lowercase wire name, if recognized.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl Display for Complexity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Caller preference used to break ties between equally-affine models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Prefer the fastest eligible model.
    Speed,
    /// Prefer the most capable eligible model.
    #[default]
    Quality,
    /// Prefer the cheapest eligible model.
    Cost,
}

/// Coarse grouping of models sharing one daily budget pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostClass {
    /// Cheap workhorse models.
    Low,
    /// Mid-range models.
    Medium,
    /// Premium frontier models.
    High,
}

impl CostClass {
    /// All cost classes, cheapest first.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Low, Self::Medium, Self::High]
    }
}

impl Display for CostClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Token accounting for one upstream call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt portion of the request.
    pub prompt_tokens: u64,
    /// Tokens produced in the completion.
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Total tokens across prompt and completion.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Requested shape of the upstream response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Free-form text.
    #[default]
    Text,
    /// A single JSON object.
    Json,
}

/// Sampling and output options for one upstream call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature controlling response randomness.
    pub temperature: f32,
    /// Maximum number of tokens allowed in the completion.
    pub max_tokens: u32,
    /// Requested response shape.
    pub response_format: ResponseFormat,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            response_format: ResponseFormat::Text,
        }
    }
}

impl CompletionOptions {
    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the completion token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the requested response format.
    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }
}

/// A single completion request destined for an upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Provider-facing model identifier string.
    pub model: String,
    /// System prompt framing the call.
    pub system_prompt: String,
    /// User prompt carrying the request content.
    pub user_prompt: String,
    /// Sampling and output options.
    pub options: CompletionOptions,
}

impl CompletionRequest {
    /// Creates a request with default options.
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            options: CompletionOptions::default(),
        }
    }

    /// Replaces the call options.
    #[must_use]
    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Rough token estimate for the combined prompt (chars / 4 heuristic).
    #[must_use]
    pub fn token_estimate(&self) -> u64 {
        ((self.system_prompt.len() + self.user_prompt.len()) / 4) as u64
    }
}

/// The upstream provider's answer to one completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text content.
    pub text: String,
    /// Token accounting reported by the provider.
    pub usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_parse_round_trip() {
        for intent in TaskIntent::all() {
            assert_eq!(TaskIntent::parse(intent.as_str()), Some(intent));
        }
        assert_eq!(TaskIntent::parse("SUMMARIZATION"), Some(TaskIntent::Summarization));
        assert_eq!(TaskIntent::parse("banana"), None);
    }

    #[test]
    fn test_complexity_ordering() {
        assert!(Complexity::Low < Complexity::Medium);
        assert!(Complexity::Medium < Complexity::High);
        assert_eq!(Complexity::parse("HIGH"), Some(Complexity::High));
        assert_eq!(Complexity::parse("unknown"), None);
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 120,
            completion_tokens: 80,
        };
        assert_eq!(usage.total(), 200);
    }

    #[test]
    fn test_request_token_estimate() {
        let request = CompletionRequest::new("model-x", "a".repeat(200), "b".repeat(200));
        assert_eq!(request.token_estimate(), 100);
    }

    #[test]
    fn test_options_builder() {
        let options = CompletionOptions::default()
            .with_temperature(0.1)
            .with_max_tokens(512)
            .with_response_format(ResponseFormat::Json);
        assert!((options.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(options.max_tokens, 512);
        assert_eq!(options.response_format, ResponseFormat::Json);
    }
}
