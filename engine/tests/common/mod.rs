//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use mindwell_engine::app::App;
use mindwell_engine::auth::Identity;
use mindwell_engine::config::Config;
use mindwell_engine::db::Database;
use mindwell_engine::llm::{self, LLMError, LLMProvider, Message, ResponseFormat};
use mindwell_engine::speech::SpeechProvider;
use sdk::errors::EngineError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// One scripted LLM reply
#[derive(Debug, Clone)]
pub enum Reply {
    Content(String),
    Empty,
    Fail,
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Content(s.to_string())
    }
}

/// LLM that answers from a script and records every request
#[derive(Default)]
pub struct FakeLLM {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<(Vec<Message>, ResponseFormat)>>,
}

impl FakeLLM {
    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<(Vec<Message>, ResponseFormat)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LLMProvider for FakeLLM {
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(
        &self,
        messages: &[Message],
        format: ResponseFormat,
    ) -> llm::Result<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), format));

        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Content(text)) => Ok(Some(text)),
            Some(Reply::Empty) | None => Ok(None),
            Some(Reply::Fail) => Err(LLMError::NetworkError("connection reset".to_string())),
        }
    }
}

/// Speech provider with a fixed transcript; synthesis echoes the text as bytes
pub struct FakeSpeech {
    transcript: Mutex<String>,
    fail_synthesis: bool,
    synthesized: Mutex<Vec<(String, Option<String>)>>,
    transcribed: Mutex<usize>,
}

impl FakeSpeech {
    pub fn hearing(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            transcript: Mutex::new(transcript.to_string()),
            fail_synthesis: false,
            synthesized: Mutex::new(Vec::new()),
            transcribed: Mutex::new(0),
        })
    }

    pub fn failing_synthesis() -> Arc<Self> {
        Arc::new(Self {
            transcript: Mutex::new(String::new()),
            fail_synthesis: true,
            synthesized: Mutex::new(Vec::new()),
            transcribed: Mutex::new(0),
        })
    }

    pub fn synthesized(&self) -> Vec<(String, Option<String>)> {
        self.synthesized.lock().unwrap().clone()
    }

    pub fn transcribe_calls(&self) -> usize {
        *self.transcribed.lock().unwrap()
    }
}

#[async_trait]
impl SpeechProvider for FakeSpeech {
    fn name(&self) -> &str {
        "fake-speech"
    }

    async fn transcribe(&self, _audio: &[u8], _content_type: &str) -> Result<String, EngineError> {
        *self.transcribed.lock().unwrap() += 1;
        Ok(self.transcript.lock().unwrap().clone())
    }

    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>, EngineError> {
        if self.fail_synthesis {
            return Err(EngineError::Synthesis("503 Service Unavailable".to_string()));
        }
        self.synthesized
            .lock()
            .unwrap()
            .push((text.to_string(), voice.map(str::to_string)));
        Ok(format!("audio:{}", text).into_bytes())
    }
}

/// An [`App`] over a throwaway database
pub struct TestApp {
    pub app: Arc<App>,
    pub llm: Arc<FakeLLM>,
    pub speech: Arc<FakeSpeech>,
    _dir: TempDir,
}

pub async fn test_app(llm: Arc<FakeLLM>, speech: Arc<FakeSpeech>) -> TestApp {
    test_app_with(llm, speech, |_| {}).await
}

pub async fn test_app_with(
    llm: Arc<FakeLLM>,
    speech: Arc<FakeSpeech>,
    configure: impl FnOnce(&mut Config),
) -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default_config();
    config.core.data_dir = dir.path().to_path_buf();
    configure(&mut config);

    let db = Arc::new(Database::new(&config.db_path()).await.unwrap());
    let app = Arc::new(App::with_providers(config, db, llm.clone(), speech.clone()));

    TestApp {
        app,
        llm,
        speech,
        _dir: dir,
    }
}

/// Reserve a slot and upload `bytes` through the app, returning the storage id
pub async fn upload(app: &App, identity: &Identity, content_type: &str, bytes: &[u8]) -> String {
    let url = app.generate_upload_url(identity).await.unwrap();
    let token = url.rsplit('/').next().unwrap();
    app.upload(token, content_type, bytes).await.unwrap()
}

/// The `EngineError` carried by an `anyhow::Error`
pub fn engine_error(err: &anyhow::Error) -> &EngineError {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<EngineError>())
        .expect("error chain carries an EngineError")
}

pub fn alice() -> Identity {
    Identity::new("auth0|alice", "alice@example.com").with_name("Alice")
}

pub fn bob() -> Identity {
    Identity::new("auth0|bob", "bob@example.com")
}

pub const SUMMARY: &str = "Alice talked about exam stress and perfectionism.";

pub const TASKS_JSON: &str = r#"{"tasks": [
    {"type": "mindfulness_exercise", "title": "Box breathing", "description": "4-4-4-4 for five minutes"},
    {"type": "journal_prompt", "title": "Name the fear", "description": "What would failing mean?"}
]}"#;

pub const PROFILE_JSON: &str = r#"{
    "longTermProfileSummary": "High achiever driven by fear of failure.",
    "keyInsights": [
        {"belief": "I must be perfect", "trigger": "Exams"},
        {"belief": "Rest is laziness", "trigger": "Free evenings"}
    ]
}"#;
