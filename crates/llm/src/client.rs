use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{LlmError, LlmResult};
use crate::generator::{Generator, OutputSchema};
use crate::json::extract_json;
use crate::types::*;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(60_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Bounds each HTTP attempt, including reading the body.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ChatClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Client for OpenAI-compatible chat completion APIs.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    config: ChatClientConfig,
}

impl ChatClient {
    /// Fails only when the HTTP client cannot be constructed.
    pub fn new(config: ChatClientConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn with_retry<T, F, Fut>(&self, operation: F, operation_name: &str) -> LlmResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = LlmResult<T>>,
    {
        let policy = self.config.retry;
        let mut retries = 0;
        let mut backoff = policy.initial_backoff;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(LlmError::RateLimited { retry_after }) => {
                    if retries >= policy.max_retries {
                        error!(
                            "{} failed after {} retries due to rate limiting",
                            operation_name, retries
                        );
                        return Err(LlmError::RateLimited { retry_after });
                    }

                    let wait = retry_after
                        .map(Duration::from_secs)
                        .unwrap_or(backoff)
                        .min(policy.max_backoff);

                    warn!(
                        "{} rate limited, retrying in {}ms (attempt {}/{})",
                        operation_name,
                        wait.as_millis(),
                        retries + 1,
                        policy.max_retries
                    );

                    tokio::time::sleep(wait).await;
                    retries += 1;
                    backoff = (backoff * 2).min(policy.max_backoff);
                }
                Err(LlmError::Api {
                    ref message,
                    status_code: Some(code),
                }) if code >= 500 => {
                    if retries >= policy.max_retries {
                        error!(
                            "{} failed after {} retries due to server error: {}",
                            operation_name, retries, message
                        );
                        return Err(LlmError::Api {
                            message: message.clone(),
                            status_code: Some(code),
                        });
                    }

                    warn!(
                        "{} server error ({}), retrying in {}ms (attempt {}/{})",
                        operation_name,
                        code,
                        backoff.as_millis(),
                        retries + 1,
                        policy.max_retries
                    );

                    tokio::time::sleep(backoff).await;
                    retries += 1;
                    backoff = (backoff * 2).min(policy.max_backoff);
                }
                Err(e) => {
                    if retries > 0 {
                        info!("{} failed after {} retries: {}", operation_name, retries, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        response_format: Option<ResponseFormat>,
    ) -> LlmResult<String> {
        self.with_retry(
            || async {
                self.chat_completion_inner(messages.clone(), response_format.clone())
                    .await
            },
            "chat_completion",
        )
        .await
    }

    async fn chat_completion_inner(
        &self,
        messages: Vec<ChatMessage>,
        response_format: Option<ResponseFormat>,
    ) -> LlmResult<String> {
        debug!(
            "Creating chat completion with {} messages, model {}",
            messages.len(),
            self.config.model
        );

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                warn!("Rate limited by chat API");
                return Err(LlmError::RateLimited { retry_after });
            }

            let message = match serde_json::from_str::<ApiErrorBody>(&error_text) {
                Ok(body) => {
                    error!(
                        "Chat API error: {} (type: {:?})",
                        body.error.message, body.error.error_type
                    );
                    body.error.message
                }
                Err(_) => error_text,
            };

            return Err(LlmError::Api {
                message,
                status_code: Some(status.as_u16()),
            });
        }

        let chat_response: ChatCompletionResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Api {
                message: "No completion returned".to_string(),
                status_code: None,
            })
    }
}

#[async_trait]
impl Generator for ChatClient {
    async fn generate(&self, system: &str, user: &str) -> LlmResult<String> {
        self.chat_completion(vec![ChatMessage::system(system), ChatMessage::user(user)], None)
            .await
    }

    async fn generate_json(
        &self,
        system: &str,
        user: &str,
        schema: &OutputSchema,
    ) -> LlmResult<Value> {
        let format = ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat {
                name: schema.name.clone(),
                schema: schema.schema.clone(),
                strict: false,
            },
        };

        let content = self
            .chat_completion(
                vec![ChatMessage::system(system), ChatMessage::user(user)],
                Some(format),
            )
            .await?;

        serde_json::from_str(extract_json(&content))
            .map_err(|e| LlmError::InvalidOutput(format!("reply is not valid JSON: {}", e)))
    }

    fn name(&self) -> &'static str {
        "chat"
    }
}
