use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// One scoring request against an LLM judge.
#[derive(Clone, Copy, Debug)]
pub struct ScoreRequest<'a> {
    pub provider: &'a str,
    pub model: &'a str,
    pub api_key: &'a str,
    pub prompt: &'a str,
}

/// The structured verdict of the judge.
#[derive(Clone, Debug, Deserialize)]
pub struct ScoreOutput {
    /// Numeric score, typically in `0.0..=1.0` as instructed by the prompt.
    pub score: f64,
    /// Free-text justification, stored as the score comment.
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// An error from the scoring provider.
#[derive(Debug, Error)]
pub enum ScorerError {
    /// The provider is not supported.
    #[error("unsupported provider \"{0}\"")]
    UnsupportedProvider(String),

    /// The HTTP request failed.
    #[error("request to provider failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an error status.
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider's answer did not contain a parseable verdict.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Calls an LLM provider to produce a score.
///
/// A trait seam so the executor can be tested without network access.
#[async_trait]
pub trait LlmScorer: Send + Sync {
    async fn score(&self, request: ScoreRequest<'_>) -> Result<ScoreOutput, ScorerError>;
}

/// Scores through an OpenAI-compatible chat completions API.
pub struct HttpScorer {
    client: reqwest::Client,
}

impl HttpScorer {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self { client }
    }

    fn endpoint(provider: &str) -> Result<&'static str, ScorerError> {
        match provider {
            "openai" => Ok("https://api.openai.com/v1/chat/completions"),
            other => Err(ScorerError::UnsupportedProvider(other.to_owned())),
        }
    }
}

impl Default for HttpScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl LlmScorer for HttpScorer {
    async fn score(&self, request: ScoreRequest<'_>) -> Result<ScoreOutput, ScorerError> {
        let endpoint = Self::endpoint(request.provider)?;

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(request.api_key)
            .json(&json!({
                "model": request.model,
                "messages": [
                    {
                        "role": "system",
                        "content": "You are an evaluation judge. Answer with a JSON object \
                                    {\"score\": <number>, \"reasoning\": <string>} and nothing else.",
                    },
                    { "role": "user", "content": request.prompt },
                ],
                "response_format": { "type": "json_object" },
                "temperature": 0,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScorerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|error| ScorerError::MalformedResponse(error.to_string()))?;

        let content = body
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| ScorerError::MalformedResponse("no choices returned".to_owned()))?;

        serde_json::from_str(content)
            .map_err(|error| ScorerError::MalformedResponse(error.to_string()))
    }
}
