//! Chat-completion client for the document model.
//!
//! Calls never surface errors to the pipeline: a failed call with every
//! configured credential yields `None`, and the caller degrades to manual
//! review.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rentguard_core::ModelSettings;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::fetcher::InlineImage;
use crate::prompts::Prompt;

/// Longest slice of an upstream body written to the logs.
const LOGGED_BODY_CHARS: usize = 500;

pub(crate) fn truncate_for_log(body: &str) -> &str {
    crate::prompts::truncate_chars(body, LOGGED_BODY_CHARS)
}

/// Try each credential in order and return the first success.
///
/// Failures are logged with the attempt number only; credentials never reach
/// the logs. Returns `None` once every credential has failed.
pub async fn with_credential_fallback<T, E, F, Fut>(credentials: &[String], mut call: F) -> Option<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    for (index, credential) in credentials.iter().enumerate() {
        match call(credential.clone()).await {
            Ok(value) => {
                if index > 0 {
                    tracing::info!(attempt = index + 1, "Fallback credential succeeded");
                }
                return Some(value);
            }
            Err(e) => {
                tracing::warn!(
                    attempt = index + 1,
                    remaining = credentials.len() - index - 1,
                    error = %e,
                    "Model call failed"
                );
            }
        }
    }
    None
}

/// Text completion with optional inline image.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Whether any credential is configured.
    fn is_configured(&self) -> bool;

    async fn complete(&self, prompt: &Prompt, image: Option<&InlineImage>) -> Option<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completion client.
pub struct ModelClient {
    http_client: reqwest::Client,
    settings: ModelSettings,
}

impl ModelClient {
    pub fn new(settings: ModelSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create HTTP client for model calls")?;

        Ok(Self {
            http_client,
            settings,
        })
    }

    fn build_request<'a>(&'a self, prompt: &Prompt, image: Option<&InlineImage>) -> ChatRequest<'a> {
        let mut parts = vec![ContentPart::Text {
            text: prompt.user.clone(),
        }];
        if let Some(image) = image {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_uri(),
                },
            });
        }

        ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(prompt.system.clone()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(parts),
                },
            ],
            max_completion_tokens: self.settings.max_completion_tokens,
            temperature: (!self.settings.omit_temperature).then_some(self.settings.temperature),
        }
    }

    async fn send(&self, api_key: &str, request: &ChatRequest<'_>) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.settings.base_url))
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .context("Failed to send request to model endpoint")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read model response body")?;

        tracing::debug!(
            status = status.as_u16(),
            body = %truncate_for_log(&body),
            "Model endpoint responded"
        );

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "Model request failed: {} - {}",
                status,
                truncate_for_log(&body)
            ));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).context("Failed to parse model response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Model response has no message content"))
    }
}

#[async_trait]
impl CompletionModel for ModelClient {
    fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    #[tracing::instrument(skip_all, fields(model = %self.settings.model, with_image = image.is_some()))]
    async fn complete(&self, prompt: &Prompt, image: Option<&InlineImage>) -> Option<String> {
        let request = self.build_request(prompt, image);
        let start = std::time::Instant::now();

        let reply = with_credential_fallback(&self.settings.credentials(), |key| {
            let request = &request;
            async move { self.send(&key, request).await }
        })
        .await;

        match &reply {
            Some(text) => tracing::info!(
                duration_ms = start.elapsed().as_millis() as u64,
                reply_len = text.len(),
                "Model call succeeded"
            ),
            None => tracing::error!(
                duration_ms = start.elapsed().as_millis() as u64,
                "Model unavailable with every configured credential"
            ),
        }

        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings(base_url: String, fallback: Option<&str>) -> ModelSettings {
        ModelSettings {
            api_key: Some("primary-key".to_string()),
            fallback_api_key: fallback.map(String::from),
            base_url,
            model: "gpt-4o".to_string(),
            max_completion_tokens: 2000,
            omit_temperature: false,
            temperature: 0.1,
            timeout_secs: 5,
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            system: "system".to_string(),
            user: "user".to_string(),
        }
    }

    fn completion(content: &str) -> String {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
            .to_string()
    }

    #[tokio::test]
    async fn test_fallback_returns_first_success_in_order() {
        let calls = AtomicUsize::new(0);
        let credentials = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let result = with_credential_fallback(&credentials, |key| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if key == "b" {
                    Ok(key)
                } else {
                    Err("rejected")
                }
            }
        })
        .await;

        assert_eq!(result.as_deref(), Some("b"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_none_when_all_fail() {
        let credentials = vec!["a".to_string(), "b".to_string()];
        let result: Option<()> =
            with_credential_fallback(&credentials, |_| async { Err("down") }).await;
        assert!(result.is_none());

        let result: Option<()> = with_credential_fallback(&[], |_| async { Ok::<(), &str>(()) }).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_complete_falls_back_to_secondary_key() {
        let mut server = mockito::Server::new_async().await;
        let primary = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer primary-key")
            .with_status(429)
            .with_body("rate limited")
            .expect(1)
            .create_async()
            .await;
        let fallback = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer fallback-key")
            .with_status(200)
            .with_body(completion("{\"recommendation\":\"APPROVE\"}"))
            .expect(1)
            .create_async()
            .await;

        let client = ModelClient::new(settings(server.url(), Some("fallback-key"))).unwrap();
        let reply = client.complete(&prompt(), None).await;

        assert_eq!(reply.as_deref(), Some("{\"recommendation\":\"APPROVE\"}"));
        primary.assert_async().await;
        fallback.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_returns_none_when_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _down = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let client = ModelClient::new(settings(server.url(), Some("fallback-key"))).unwrap();
        assert!(client.complete(&prompt(), None).await.is_none());
    }

    #[tokio::test]
    async fn test_request_carries_image_as_data_uri() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o",
                "max_completion_tokens": 2000,
                "messages": [
                    { "role": "system", "content": "system" },
                    { "role": "user", "content": [
                        { "type": "text", "text": "user" },
                        { "type": "image_url", "image_url": { "url": "data:image/png;base64,AQID" } }
                    ]}
                ]
            })))
            .with_status(200)
            .with_body(completion("ok"))
            .create_async()
            .await;

        let client = ModelClient::new(settings(server.url(), None)).unwrap();
        let image = InlineImage::from_bytes("image/png", &[1, 2, 3]);
        assert_eq!(client.complete(&prompt(), Some(&image)).await.as_deref(), Some("ok"));
        mock.assert_async().await;
    }

    #[test]
    fn test_temperature_omitted_for_reasoning_models() {
        let mut config = settings("http://model.test".to_string(), None);
        let client = ModelClient::new(config.clone()).unwrap();
        let body = serde_json::to_value(client.build_request(&prompt(), None)).unwrap();
        assert!((body["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(body["messages"][1]["content"][0]["type"], json!("text"));

        config.omit_temperature = true;
        let client = ModelClient::new(config).unwrap();
        let body = serde_json::to_value(client.build_request(&prompt(), None)).unwrap();
        assert!(body.get("temperature").is_none());
    }
}
