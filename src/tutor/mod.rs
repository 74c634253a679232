//! AI tutor - "Captain Kube"
//!
//! Answers free-text questions about Kubernetes through an OpenAI-compatible
//! chat endpoint. The tutor:
//! - Frames every answer in the shipping-port analogy
//! - Folds in the concept the learner is currently reading
//! - Turns every failure into a friendly, displayable message
//!
//! The tutor never touches cluster state.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::{ChatCompletionRequest, ClientError, Message, OpenAiClient, OpenAiClientTrait};

/// Context used when the learner has no concept open
pub const DEFAULT_CONTEXT: &str = "General Kubernetes questions";

/// Shown when the endpoint answers with nothing
const EMPTY_ANSWER_MESSAGE: &str = "I'm having trouble checking the ship's log right now. Try again!";

/// Shown when no API key is configured
const MISSING_KEY_MESSAGE: &str =
    "API Key is missing. Please set the tutor API key to enable the AI Tutor.";

/// Shown when the endpoint rejects us for rate limits or quota
const QUOTA_MESSAGE: &str =
    "Too much radio traffic! The Port Authority is rationing calls. Give it a moment and ask again.";

/// Shown when the endpoint cannot be reached or fails
const RADIO_DOWN_MESSAGE: &str =
    "The radio is down! I can't reach the Port Authority (API Error). Please check your connection.";

const SYSTEM_PROMPT: &str = "\
You are \"Captain Kube\", a friendly, expert Kubernetes instructor who explains concepts to beginners using a Shipping Port analogy.

Core Analogy Rules:
- Cluster = The Shipping Port
- Node = A Cargo Ship
- Pod = A Shipping Container
- Application/Code = The Cargo inside
- Service = The Dispatcher/Phone Book

Keep answers short (under 3 sentences) and encouraging. Always relate back to the analogy first, then explain the technical detail.";

/// Tutor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorConfig {
    /// OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "KUBEQUEST_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    30
}

impl TutorConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Error, Debug, Clone)]
pub enum TutorError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("tutor request failed: {0}")]
    Client(#[from] ClientError),

    #[error("tutor returned an empty answer")]
    EmptyAnswer,
}

impl TutorError {
    /// Message suitable for showing to the learner
    pub fn user_message(&self) -> &'static str {
        match self {
            TutorError::MissingApiKey => MISSING_KEY_MESSAGE,
            TutorError::EmptyQuestion => "Ask me anything about the port, sailor!",
            TutorError::Client(e) if e.is_quota() => QUOTA_MESSAGE,
            TutorError::Client(_) => RADIO_DOWN_MESSAGE,
            TutorError::EmptyAnswer => EMPTY_ANSWER_MESSAGE,
        }
    }
}

pub struct Tutor {
    client: Option<Arc<dyn OpenAiClientTrait>>,
    temperature: f32,
}

impl Tutor {
    pub fn new(client: Arc<dyn OpenAiClientTrait>, temperature: f32) -> Self {
        Self {
            client: Some(client),
            temperature,
        }
    }

    /// A tutor with no endpoint; every question fails with `MissingApiKey`
    pub fn disabled() -> Self {
        Self {
            client: None,
            temperature: default_temperature(),
        }
    }

    /// Build from config, reading the API key from the environment
    pub fn from_config(config: &TutorConfig) -> Result<Self, TutorError> {
        let Some(api_key) = config.api_key() else {
            warn!(
                "{} is not set, the tutor is disabled",
                config.api_key_env
            );
            return Ok(Self::disabled());
        };

        let client = OpenAiClient::new(config.base_url.clone(), Some(api_key), config.model.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))?;

        Ok(Self::new(Arc::new(client), config.temperature))
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Ask a question, optionally framed by the concept being studied
    pub async fn ask(&self, question: &str, context: Option<&str>) -> Result<String, TutorError> {
        let client = self.client.as_ref().ok_or(TutorError::MissingApiKey)?;

        let question = question.trim();
        if question.is_empty() {
            return Err(TutorError::EmptyQuestion);
        }

        let request = build_request(client.model(), question, context, self.temperature);
        debug!("Asking tutor ({} chars)", question.len());

        let response = client.chat_completion(&request).await.inspect_err(|e| {
            warn!("Tutor request failed: {}", e);
        })?;

        response
            .first_content()
            .map(str::trim)
            .filter(|answer| !answer.is_empty())
            .map(str::to_string)
            .ok_or(TutorError::EmptyAnswer)
    }
}

/// Assemble the chat request (pure)
pub fn build_request(
    model: &str,
    question: &str,
    context: Option<&str>,
    temperature: f32,
) -> ChatCompletionRequest {
    let context = context
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CONTEXT);

    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(format!("Context: {}\n\nUser Question: {}", context, question)),
        ],
        max_tokens: None,
        temperature: Some(temperature),
    }
}
