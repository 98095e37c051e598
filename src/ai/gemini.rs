//! Gemini API client.
//!
//! Thin typed HTTP client over the `generateContent` endpoint. When the
//! primary model is reported unavailable, the configured fallback models
//! are tried in order before giving up.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::TextGenerator;
use crate::config::GeminiConfig;
use crate::error::{Error, Result};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

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
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Gemini text-generation client.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    fallback_models: Vec<String>,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        info!(model = %config.model, "Gemini client initialized");
        Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            fallback_models: config.fallback_models.clone(),
        }
    }

    /// One request against one model. `Ok(None)` means the model itself
    /// was unavailable and a fallback should be tried.
    async fn generate_with_model(&self, model: &str, prompt: &str) -> Result<Option<String>> {
        let url = format!("{GEMINI_API_BASE}/{model}:generateContent");
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // The API reports retired models as a 400 with NOT_FOUND status.
            if body.contains("NOT_FOUND") || body.contains("not found") {
                return Ok(None);
            }
            return Err(Error::Transport(format!(
                "Gemini API error ({status}): {body}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("Gemini response parse failed: {e}")))?;

        let text: String = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::Transport("Empty response from Gemini".into()));
        }

        debug!(model = %model, chars = text.len(), "Gemini response received");
        Ok(Some(text))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Some(text) = self.generate_with_model(&self.model, prompt).await? {
            return Ok(text);
        }

        for model in &self.fallback_models {
            warn!(primary = %self.model, fallback = %model, "Primary model unavailable, trying fallback");
            if let Some(text) = self.generate_with_model(model, prompt).await? {
                info!(model = %model, "Fallback model succeeded");
                return Ok(text);
            }
        }

        Err(Error::Transport(format!(
            "No available Gemini model (tried {} and {} fallback(s))",
            self.model,
            self.fallback_models.len()
        )))
    }
}
