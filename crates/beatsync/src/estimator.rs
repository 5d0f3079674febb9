//! BPM/beat estimator capability
//!
//! The resolver only needs `estimate(prompt) -> text`. The shipped
//! implementation talks to any OpenAI-compatible `/chat/completions`
//! endpoint; tests substitute a scripted estimator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompt::SYSTEM_PROMPT;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimatorError {
    #[error("Rate limited")]
    RateLimited,

    #[error("Service unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Usage limit reached, add credits")]
    QuotaExhausted,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Response parse error: {0}")]
    Response(String),
}

impl EstimatorError {
    /// Worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EstimatorError::RateLimited
                | EstimatorError::Unavailable { .. }
                | EstimatorError::Request(_)
        )
    }

    /// Map a non-success HTTP status to an estimator error.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            429 => EstimatorError::RateLimited,
            402 => EstimatorError::QuotaExhausted,
            401 | 403 => EstimatorError::Auth(body),
            code if status.is_server_error() => EstimatorError::Unavailable {
                status: code,
                message: body,
            },
            code => EstimatorError::Response(format!("unexpected status {}: {}", code, body)),
        }
    }
}

#[async_trait]
pub trait BeatEstimator: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Send one prompt and return the raw completion text.
    async fn estimate(&self, prompt: &str) -> Result<String, EstimatorError>;
}

/// Estimator endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "BEATSYNC_API_KEY".to_string(),
            temperature: 0.2,
            request_timeout_secs: 30,
        }
    }
}

/// OpenAI-compatible chat completions client
pub struct ChatCompletionsEstimator {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsEstimator {
    pub fn new(config: &EstimatorConfig, api_key: Option<String>) -> Result<Self, EstimatorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| EstimatorError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Build from config, reading the API key from the configured env var.
    pub fn from_config(config: &EstimatorConfig) -> Result<Self, EstimatorError> {
        let api_key = std::env::var(&config.api_key_env).ok();

        if api_key.is_some() {
            tracing::info!("Estimator initialized for {}", config.endpoint);
        } else {
            tracing::warn!(
                "Estimator created without API key - {} env var not found",
                config.api_key_env
            );
        }

        Self::new(config, api_key)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl BeatEstimator for ChatCompletionsEstimator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn estimate(&self, prompt: &str) -> Result<String, EstimatorError> {
        let auth_header = self
            .api_key
            .as_ref()
            .map(|k| format!("Bearer {}", k))
            .ok_or_else(|| EstimatorError::Auth("No estimator API key configured".to_string()))?;

        let payload = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ]
        });

        tracing::debug!("[Estimator] Sending request: model={}", self.model);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", auth_header)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EstimatorError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EstimatorError::from_status(status, body));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EstimatorError::Response(e.to_string()))?;

        completion_text(&json)
    }
}

/// Pull `choices[0].message.content` out of a completion response.
fn completion_text(json: &serde_json::Value) -> Result<String, EstimatorError> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|content| content.trim().to_string())
        .ok_or_else(|| EstimatorError::Response("completion has no message content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let map = |code: u16| {
            EstimatorError::from_status(StatusCode::from_u16(code).unwrap(), "body".to_string())
        };

        assert_eq!(map(429), EstimatorError::RateLimited);
        assert_eq!(map(402), EstimatorError::QuotaExhausted);
        assert!(matches!(map(401), EstimatorError::Auth(_)));
        assert!(matches!(map(403), EstimatorError::Auth(_)));
        assert!(matches!(map(503), EstimatorError::Unavailable { status: 503, .. }));
        assert!(matches!(map(400), EstimatorError::Response(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(EstimatorError::RateLimited.is_transient());
        assert!(EstimatorError::Request("connection reset".to_string()).is_transient());
        assert!(EstimatorError::Unavailable {
            status: 502,
            message: String::new()
        }
        .is_transient());

        assert!(!EstimatorError::QuotaExhausted.is_transient());
        assert!(!EstimatorError::Auth("bad key".to_string()).is_transient());
        assert!(!EstimatorError::Response("garbage".to_string()).is_transient());
    }

    #[test]
    fn test_completion_text() {
        let json = serde_json::json!({
            "choices": [{ "message": { "content": "  {\"bpm\": 120}\n" } }]
        });
        assert_eq!(completion_text(&json).unwrap(), "{\"bpm\": 120}");

        let empty = serde_json::json!({ "choices": [] });
        assert!(matches!(completion_text(&empty), Err(EstimatorError::Response(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_error() {
        let estimator = ChatCompletionsEstimator::new(&EstimatorConfig::default(), None).unwrap();
        assert!(!estimator.is_configured());
        assert!(matches!(
            estimator.estimate("prompt").await,
            Err(EstimatorError::Auth(_))
        ));
    }
}
