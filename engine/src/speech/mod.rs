//! Speech provider seam
//!
//! One trait covers both directions: recorded audio to text, and reply text
//! to audio. The Deepgram client is the production implementation.

use async_trait::async_trait;
use sdk::errors::EngineError;

pub mod deepgram;

pub use deepgram::DeepgramProvider;

/// Speech-to-text and text-to-speech
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe recorded audio. An empty string means nothing was heard.
    async fn transcribe(&self, audio: &[u8], content_type: &str) -> Result<String, EngineError>;

    /// Synthesize speech, optionally with a voice other than the configured one
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>, EngineError>;

    async fn check_health(&self) -> bool {
        true
    }
}
