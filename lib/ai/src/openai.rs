//! OpenAI-compatible chat completions client.

use crate::backend::{
    ChatMessage, ChatRole, Completion, CompletionProvider, ProviderConfig, ProviderKind,
    TokenUsage, trim_context, validate_history,
};
use crate::error::CompletionError;
use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Completion provider for any endpoint speaking the OpenAI chat
/// completions protocol.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    endpoint: String,
    config: ProviderConfig,
}

impl OpenAiCompatibleProvider {
    /// Creates a provider from its configuration.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::InvalidConfig` if the base URL is empty or
    /// the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, CompletionError> {
        if config.base_url.trim().is_empty() {
            return Err(CompletionError::InvalidConfig {
                reason: "base_url must not be empty".to_string(),
            });
        }
        if config.model.trim().is_empty() {
            return Err(CompletionError::InvalidConfig {
                reason: "model must not be empty".to_string(),
            });
        }
        // Zero would send only the preamble, which no provider accepts.
        if config.max_context_messages == Some(0) {
            return Err(CompletionError::InvalidConfig {
                reason: "max_context_messages must be at least 1".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CompletionError::InvalidConfig {
                reason: e.to_string(),
            })?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    /// Returns the full URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request<'a>(&'a self, history: &'a [ChatMessage]) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.config.model,
            messages: trim_context(history, self.config.max_context_messages),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    async fn send(&self, body: &ChatCompletionRequest<'_>) -> Result<Completion, CompletionError> {
        let mut request = self.client.post(&self.endpoint).json(body);

        if let Some(api_key) = self.config.api_key.as_deref()
            && !api_key.is_empty()
        {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, endpoint = %self.endpoint, "Completion request failed to send");
            if e.is_timeout() {
                CompletionError::Timeout
            } else if e.is_connect() {
                CompletionError::ProviderUnavailable {
                    provider: self.config.kind.to_string(),
                    reason: e.to_string(),
                }
            } else {
                CompletionError::RequestFailed {
                    status: None,
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body = response.text().await.unwrap_or_default();
            warn!(
                endpoint = %self.endpoint,
                status = %status,
                body = %body,
                "Completion endpoint returned error"
            );
            return Err(map_http_error(self.config.kind, status, body, retry_after));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::Timeout
            } else {
                CompletionError::MalformedResponse {
                    reason: e.to_string(),
                }
            }
        })?;

        extract_completion(parsed, &self.config.model)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    async fn complete(&self, history: &[ChatMessage]) -> Result<Completion, CompletionError> {
        validate_history(history)?;

        let body = self.build_request(history);
        let started = Instant::now();
        let completion = self.send(&body).await?;

        debug!(
            model = %completion.model,
            sent_messages = body.messages.len(),
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Completion received"
        );

        Ok(completion)
    }

    fn provider(&self) -> ProviderKind {
        self.config.kind
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    role: Option<ChatRole>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn extract_completion(
    response: ChatCompletionResponse,
    requested_model: &str,
) -> Result<Completion, CompletionError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(CompletionError::MalformedResponse {
            reason: "response contained no choices".to_string(),
        });
    };

    if let Some(role) = choice.message.role
        && role != ChatRole::Assistant
    {
        return Err(CompletionError::MalformedResponse {
            reason: format!("unexpected reply role {role:?}"),
        });
    }

    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(CompletionError::EmptyContent);
    }

    let usage = response
        .usage
        .map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(Completion {
        content,
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        usage,
    })
}

fn parse_retry_after(value: Option<&HeaderValue>) -> Option<u64> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn map_http_error(
    provider: ProviderKind,
    status: StatusCode,
    body: String,
    retry_after: Option<u64>,
) -> CompletionError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited {
            retry_after_secs: retry_after,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => CompletionError::Timeout,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            CompletionError::ProviderUnavailable {
                provider: provider.to_string(),
                reason: format!("HTTP {}: {}", status.as_u16(), body),
            }
        }
        _ => CompletionError::RequestFailed {
            status: Some(status.as_u16()),
            reason: body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value as JsonValue, json};

    fn history() -> Vec<ChatMessage> {
        vec![ChatMessage::system("You are terse."), ChatMessage::user("Hi")]
    }

    /// Serves `router` on an ephemeral local port and returns its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}/v1")
    }

    fn provider_for(base_url: String) -> OpenAiCompatibleProvider {
        let mut config = ProviderConfig::ollama(base_url, "test-model");
        config.api_key = Some("sk-test".to_string());
        OpenAiCompatibleProvider::new(config).expect("provider")
    }

    #[test]
    fn new_rejects_empty_base_url() {
        let config = ProviderConfig::ollama("  ", "llama3");
        let err = OpenAiCompatibleProvider::new(config).unwrap_err();
        assert_eq!(err.reason_code(), "invalid_config");
    }

    #[test]
    fn zero_context_limit_is_rejected() {
        let config = ProviderConfig::ollama("http://localhost:11434/v1", "llama3")
            .with_max_context_messages(0);

        let err = OpenAiCompatibleProvider::new(config).unwrap_err();

        assert_eq!(err.reason_code(), "invalid_config");
        assert!(err.to_string().contains("max_context_messages"));
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let provider = OpenAiCompatibleProvider::new(ProviderConfig::ollama(
            "http://localhost:11434/v1/",
            "llama3",
        ))
        .expect("provider");
        assert_eq!(provider.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn request_body_omits_unset_options_and_trims_context() {
        let config = ProviderConfig::ollama("http://localhost:11434/v1", "llama3")
            .with_max_context_messages(1);
        let provider = OpenAiCompatibleProvider::new(config).expect("provider");
        let history = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("old"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("new"),
        ];

        let body = serde_json::to_value(provider.build_request(&history)).expect("serialize");

        assert_eq!(
            body,
            json!({
                "model": "llama3",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "new"},
                ],
            })
        );
    }

    #[test]
    fn extract_completion_reads_first_choice() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "model": "gpt-4o-mini-2024",
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 2}
        }))
        .expect("deserialize");

        let completion = extract_completion(response, "gpt-4o-mini").expect("completion");

        assert_eq!(completion.content, "Hello!");
        assert_eq!(completion.model, "gpt-4o-mini-2024");
        assert_eq!(completion.usage.total(), 11);
    }

    #[test]
    fn extract_completion_rejects_blank_content() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "   "}}]
        }))
        .expect("deserialize");

        let err = extract_completion(response, "m").unwrap_err();
        assert_eq!(err, CompletionError::EmptyContent);
    }

    #[test]
    fn extract_completion_rejects_missing_choices() {
        let response: ChatCompletionResponse =
            serde_json::from_value(json!({"choices": []})).expect("deserialize");

        let err = extract_completion(response, "m").unwrap_err();
        assert_eq!(err.reason_code(), "malformed_response");
    }

    #[test]
    fn map_http_error_classifies_statuses() {
        assert_eq!(
            map_http_error(ProviderKind::OpenAi, StatusCode::TOO_MANY_REQUESTS, String::new(), Some(3)),
            CompletionError::RateLimited {
                retry_after_secs: Some(3)
            }
        );
        assert_eq!(
            map_http_error(ProviderKind::OpenAi, StatusCode::GATEWAY_TIMEOUT, String::new(), None),
            CompletionError::Timeout
        );
        assert_eq!(
            map_http_error(ProviderKind::Ollama, StatusCode::SERVICE_UNAVAILABLE, "down".into(), None),
            CompletionError::ProviderUnavailable {
                provider: ProviderKind::Ollama.to_string(),
                reason: "HTTP 503: down".to_string(),
            }
        );
        assert_eq!(
            map_http_error(ProviderKind::OpenAi, StatusCode::UNAUTHORIZED, "bad key".into(), None),
            CompletionError::RequestFailed {
                status: Some(401),
                reason: "bad key".to_string()
            }
        );
    }

    #[tokio::test]
    async fn complete_round_trips_through_http() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<JsonValue>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer sk-test");
                let last = body["messages"]
                    .as_array()
                    .and_then(|m| m.last())
                    .and_then(|m| m["content"].as_str())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "model": body["model"],
                    "choices": [{"message": {
                        "role": "assistant",
                        "content": format!("echo {last} authorized={authorized}"),
                    }}],
                }))
            }),
        );
        let provider = provider_for(serve(router).await);

        let completion = provider.complete(&history()).await.expect("completion");

        assert_eq!(completion.content, "echo Hi authorized=true");
        assert_eq!(completion.model, "test-model");
    }

    #[tokio::test]
    async fn complete_maps_rate_limit_response() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    axum::http::StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", "7")],
                    "slow down",
                )
            }),
        );
        let provider = provider_for(serve(router).await);

        let err = provider.complete(&history()).await.unwrap_err();

        assert_eq!(
            err,
            CompletionError::RateLimited {
                retry_after_secs: Some(7)
            }
        );
    }

    /// Returns a base URL on a local port nothing listens on.
    async fn closed_port_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn complete_rejects_invalid_history_without_calling_out() {
        let provider = provider_for(closed_port_url().await);

        let err = provider
            .complete(&[ChatMessage::user("no preamble")])
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), "invalid_history");
    }

    #[tokio::test]
    async fn complete_reports_unreachable_provider() {
        let provider = provider_for(closed_port_url().await);

        let err = provider.complete(&history()).await.unwrap_err();

        assert_eq!(err.reason_code(), "provider_unavailable");
    }
}
