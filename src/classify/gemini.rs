//! Gemini `generateContent` client.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Message, Verdict};

use super::{ClassifyError, Classifier, build_prompt, parse_reply};

/// Classifier backed by a Gemini model.
pub struct GeminiClassifier {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClassifier {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    fn generate(&self, prompt: &str) -> Result<String, ClassifyError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.2,
            },
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .map_err(|e| ClassifyError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body: GenerateResponse = response
            .json()
            .map_err(|e| ClassifyError::Malformed(format!("invalid response body: {e}")))?;
        reply_text(body)
    }
}

impl Classifier for GeminiClassifier {
    fn classify(&mut self, message: &Message) -> Result<Verdict, ClassifyError> {
        debug!(message_id = %message.id, model = %self.model, "classifying message");
        let reply = self.generate(&build_prompt(message))?;
        parse_reply(&reply)
    }
}

/// Every HTTP failure is retried on a later cycle; the status is kept for the log.
fn status_error(status: StatusCode, body: &str) -> ClassifyError {
    let detail = body.chars().take(200).collect::<String>();
    if status == StatusCode::TOO_MANY_REQUESTS {
        ClassifyError::Transient(format!("quota exceeded ({status})"))
    } else {
        ClassifyError::Transient(format!("API error ({status}): {detail}"))
    }
}

/// First text part of the first candidate.
fn reply_text(response: GenerateResponse) -> Result<String, ClassifyError> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ClassifyError::Malformed("empty response".into()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ReplyContent>,
}

#[derive(Debug, Deserialize)]
struct ReplyContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}
