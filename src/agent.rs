use crate::config::Config;
use crate::error::{Result, VideoForgeError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum retries for API calls.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// Client for the structured-output AI agent service (OpenAI-compatible
/// chat completions). Every consumer has a deterministic fallback, so a
/// failing agent is never fatal to the pipeline.
pub struct AgentClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    enabled: bool,
}

impl AgentClient {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            enabled: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.ai_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client: http,
            base_url: config.ai_base_url.clone(),
            api_key: config.ai_api_key.clone(),
            model: config.ai_model.clone(),
            enabled: config.ai_enabled,
        }
    }

    /// True when the agent can be called at all (enabled and key present).
    pub fn is_available(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }

    /// Run one prompt pair and parse the model's JSON reply into `T`.
    pub async fn run_json<T: DeserializeOwned>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<T> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| VideoForgeError::Config("AI API key not set".to_string()))?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    debug!("Agent API response status: {}", status);

                    if status.is_success() {
                        let body = resp.text().await?;
                        let parsed: ChatResponse = serde_json::from_str(&body)?;
                        let content = parsed
                            .choices
                            .first()
                            .map(|c| c.message.content.as_str())
                            .ok_or_else(|| {
                                VideoForgeError::Api("Agent returned no choices".to_string())
                            })?;
                        return Ok(serde_json::from_str(content)?);
                    }

                    let error_body = resp.text().await.unwrap_or_default();

                    // Don't retry on client errors
                    if status.as_u16() >= 400 && status.as_u16() < 500 {
                        return Err(VideoForgeError::Api(format!(
                            "Agent API error ({}): {}",
                            status, error_body
                        )));
                    }

                    warn!("Agent API server error ({}): {}", status, error_body);
                    last_error = Some(VideoForgeError::Api(format!(
                        "Agent API server error: {}",
                        status
                    )));
                }
                Err(e) => {
                    warn!("Agent API request failed: {}", e);
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| VideoForgeError::Api("Unknown error".to_string())))
    }
}

// Request/response wire types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}
