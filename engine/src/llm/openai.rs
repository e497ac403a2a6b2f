use super::{LLMError, LLMProvider, Message, ResponseFormat};
use crate::config::LLMConfig;
use crate::secrets::{scrub, SecretCache, LLM_API_KEY};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// OpenAI-compatible chat completions client (OpenRouter, OpenAI, local gateways)
pub struct OpenAICompatProvider {
    config: LLMConfig,
    secret_cache: Arc<SecretCache>,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(config: LLMConfig, secret_cache: Arc<SecretCache>) -> Result<Self, LLMError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LLMError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            secret_cache,
            client,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn check_health(&self) -> bool {
        self.secret_cache.get_secret(LLM_API_KEY).is_ok()
    }

    async fn complete(
        &self,
        messages: &[Message],
        format: ResponseFormat,
    ) -> super::Result<Option<String>> {
        let api_key = self
            .secret_cache
            .get_secret(LLM_API_KEY)
            .map_err(|e| LLMError::AuthenticationFailed(e.to_string()))?;

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let api_messages: Vec<_> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let mut payload = json!({
            "model": self.config.model,
            "messages": api_messages,
        });
        if format == ResponseFormat::JsonObject {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", api_key.auth_header("Bearer"))
            .header("Content-Type", "application/json");
        if let Some(app_url) = &self.config.app_url {
            request = request.header("HTTP-Referer", app_url);
        }
        if let Some(app_title) = &self.config.app_title {
            request = request.header("X-Title", app_title);
        }

        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            json_mode = format == ResponseFormat::JsonObject,
            "Requesting chat completion"
        );

        let response = request.json(&payload).send().await.map_err(|e| {
            if e.is_timeout() {
                LLMError::Timeout
            } else {
                LLMError::NetworkError(scrub(&e.to_string()))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = scrub(&response.text().await.unwrap_or_default());

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(LLMError::AuthenticationFailed(text));
            } else if status.as_u16() == 429 {
                return Err(LLMError::RateLimitExceeded);
            } else {
                return Err(LLMError::InvalidRequest(format!("{}: {}", status, text)));
            }
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(str::to_string);

        if content.is_none() {
            tracing::warn!("Chat completion returned no content");
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::secrets::SecretManager;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: String) -> OpenAICompatProvider {
        let mut config = Config::default_config().llm;
        config.base_url = base_url;
        config.app_url = Some("https://mindwell.example".to_string());
        config.app_title = Some("Mindwell".to_string());
        let cache = SecretCache::with_values(
            Arc::new(SecretManager::new("mindwell-test")),
            &[(LLM_API_KEY, "sk-or-test")],
        );
        OpenAICompatProvider::new(config, Arc::new(cache)).unwrap()
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-or-test"))
            .and(header("HTTP-Referer", "https://mindwell.example"))
            .and(header("X-Title", "Mindwell"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello there"}}]
            })))
            .mount(&server)
            .await;

        let reply = provider(server.uri())
            .complete(&[Message::user("hi")], ResponseFormat::Text)
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("Hello there"));
    }

    #[tokio::test]
    async fn test_json_mode_sets_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"response_format": {"type": "json_object"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"tasks\": []}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = provider(server.uri())
            .complete(&[Message::user("tasks")], ResponseFormat::JsonObject)
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("{\"tasks\": []}"));
    }

    #[tokio::test]
    async fn test_missing_content_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let reply = provider(server.uri())
            .complete(&[Message::user("hi")], ResponseFormat::Text)
            .await
            .unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(server.uri())
            .complete(&[Message::user("hi")], ResponseFormat::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::RateLimitExceeded));
    }
}
