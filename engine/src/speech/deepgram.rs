use super::SpeechProvider;
use crate::config::SpeechConfig;
use crate::secrets::{scrub, SecretCache, SPEECH_API_KEY};
use async_trait::async_trait;
use sdk::errors::EngineError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Deepgram `listen` / `speak` client
pub struct DeepgramProvider {
    config: SpeechConfig,
    secret_cache: Arc<SecretCache>,
    client: reqwest::Client,
}

impl DeepgramProvider {
    pub fn new(config: SpeechConfig, secret_cache: Arc<SecretCache>) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            secret_cache,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl SpeechProvider for DeepgramProvider {
    fn name(&self) -> &str {
        "deepgram"
    }

    async fn check_health(&self) -> bool {
        self.secret_cache.get_secret(SPEECH_API_KEY).is_ok()
    }

    async fn transcribe(&self, audio: &[u8], content_type: &str) -> Result<String, EngineError> {
        let api_key = self.secret_cache.get_secret(SPEECH_API_KEY)?;

        let response = self
            .client
            .post(self.endpoint("listen"))
            .query(&[("model", self.config.stt_model.as_str()), ("smart_format", "true")])
            .header("Authorization", api_key.auth_header("Token"))
            .header("Content-Type", content_type)
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| EngineError::Transcription(scrub(&e.to_string())))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = scrub(&response.text().await.unwrap_or_default());
            tracing::warn!(%status, "Transcription request failed");
            return Err(EngineError::Transcription(format!("{}: {}", status, text)));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::Transcription(format!("Malformed response: {}", e)))?;

        let transcript = data
            .pointer("/results/channels/0/alternatives/0/transcript")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();

        tracing::debug!(chars = transcript.len(), "Transcribed audio");
        Ok(transcript)
    }

    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>, EngineError> {
        let api_key = self.secret_cache.get_secret(SPEECH_API_KEY)?;
        let model = voice.unwrap_or(&self.config.tts_model);

        let response = self
            .client
            .post(self.endpoint("speak"))
            .query(&[("model", model)])
            .header("Authorization", api_key.auth_header("Token"))
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| EngineError::Synthesis(scrub(&e.to_string())))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = scrub(&response.text().await.unwrap_or_default());
            tracing::warn!(%status, model, "Synthesis request failed");
            return Err(EngineError::Synthesis(format!("{}: {}", status, body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::Synthesis(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::secrets::SecretManager;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: String) -> DeepgramProvider {
        let mut config = Config::default_config().speech;
        config.base_url = base_url;
        let cache = SecretCache::with_values(
            Arc::new(SecretManager::new("mindwell-test")),
            &[(SPEECH_API_KEY, "dg-test")],
        );
        DeepgramProvider::new(config, Arc::new(cache)).unwrap()
    }

    #[tokio::test]
    async fn test_transcribe_reads_first_alternative() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/listen"))
            .and(query_param("model", "nova-2"))
            .and(query_param("smart_format", "true"))
            .and(header("Authorization", "Token dg-test"))
            .and(header("Content-Type", "audio/webm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": {"channels": [{"alternatives": [{"transcript": "I feel stuck"}]}]}
            })))
            .mount(&server)
            .await;

        let text = provider(server.uri())
            .transcribe(b"audio", "audio/webm")
            .await
            .unwrap();
        assert_eq!(text, "I feel stuck");
    }

    #[tokio::test]
    async fn test_transcribe_missing_path_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/listen"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": {}})))
            .mount(&server)
            .await;

        let text = provider(server.uri())
            .transcribe(b"audio", "audio/webm")
            .await
            .unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_synthesize_uses_voice_override() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/speak"))
            .and(query_param("model", "aura-luna-en"))
            .and(body_json(json!({"text": "Hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let audio = provider(server.uri())
            .synthesize("Hello", Some("aura-luna-en"))
            .await
            .unwrap();
        assert_eq!(audio, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_synthesize_failure_is_synthesis_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/speak"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = provider(server.uri())
            .synthesize("Hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Synthesis(_)));
    }
}
