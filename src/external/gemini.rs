use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::GatewayError;
use crate::external::market_gateway::AiCompletion;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Tried in order; 429 and 503 move on to the next model.
pub const MODEL_PRIORITY: [&str; 3] = ["gemini-2.5-flash-lite", "gemini-2.5-flash", "gemini-2.0-flash-001"];

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .reduce(|mut acc, t| {
                acc.push_str(&t);
                acc
            })
    }
}

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, api_key })
    }

    async fn call_model(&self, model: &str, prompt: &str) -> Result<String, GatewayError> {
        let url = format!("{}/{}:generateContent", BASE_URL, model);
        let body = GenerateRequest {
            contents: vec![Content { parts: vec![Part { text: prompt }] }],
        };

        let resp = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let parsed = resp.json::<GenerateResponse>().await?;
        Ok(parsed
            .text()
            .unwrap_or_else(|| "Sorry, I could not generate a response.".to_string()))
    }
}

fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    let lower = body.to_lowercase();
    match status {
        StatusCode::TOO_MANY_REQUESTS if lower.contains("quota") => GatewayError::QuotaExceeded,
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited,
        StatusCode::SERVICE_UNAVAILABLE => GatewayError::Overloaded,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
        StatusCode::BAD_REQUEST if lower.contains("api_key") || lower.contains("api key") => {
            GatewayError::Unauthorized
        }
        StatusCode::NOT_FOUND => GatewayError::NotFound("model".to_string()),
        other => GatewayError::BadResponse(format!("gemini returned {}", other)),
    }
}

fn should_try_next(err: &GatewayError) -> bool {
    matches!(
        err,
        GatewayError::RateLimited | GatewayError::QuotaExceeded | GatewayError::Overloaded
    )
}

#[async_trait]
impl AiCompletion for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
        let mut last_error = GatewayError::Overloaded;

        for model in MODEL_PRIORITY {
            info!("🤖 Trying model: {}", model);
            match self.call_model(model, prompt).await {
                Ok(text) => {
                    info!("✅ Success with model: {}", model);
                    return Ok(text);
                }
                Err(e) if should_try_next(&e) => {
                    warn!("⚠️ Model {} failed: {}. Trying next model", model, e);
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }
}
