//! Ollama HTTP API contract, generation options and the model-service
//! error taxonomy.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Generation options
// ──────────────────────────────────────────────

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    /// Maximum tokens in the generated response.
    #[serde(rename = "num_predict", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl GenerationOptions {
    /// Raw visual extraction: low temperature, room for a long keyword list.
    pub fn raw_extraction() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: Some(3072),
            top_p: Some(0.9),
            top_k: Some(40),
        }
    }

    /// Normalization: slightly warmer for lexical variety in descriptions.
    pub fn normalization() -> Self {
        Self {
            temperature: 0.4,
            max_output_tokens: Some(2048),
            top_p: Some(0.9),
            top_k: None,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::raw_extraction()
    }
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: &'a GenerationOptions,
    /// `"json"` constrains decoding to valid JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
}

/// A single chat message. Images are base64-encoded.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseMessage {
    #[serde(default)]
    pub content: String,
}

/// Raw response from `GET /api/tags`.
#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagModel>,
}

/// Newer Ollama versions report `model`, older ones only `name`.
#[derive(Debug, Deserialize)]
pub(crate) struct TagModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
}

impl TagModel {
    pub fn into_name(self) -> String {
        if self.model.is_empty() {
            self.name
        } else {
            self.model
        }
    }
}

/// Request body for `POST /api/pull`.
#[derive(Debug, Serialize)]
pub(crate) struct PullRequest<'a> {
    pub name: &'a str,
    pub stream: bool,
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors raised by a model-service client.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Ollama is not reachable at {0}")]
    NotReachable(String),

    #[error("Ollama returned an error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Model '{0}' is not installed")]
    ModelNotFound(String),

    #[error("Invalid model name: '{0}'")]
    InvalidModelName(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Could not decode Ollama response: {0}")]
    ResponseParsing(String),
}

// ──────────────────────────────────────────────
// Model name helpers
// ──────────────────────────────────────────────

static MODEL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$")
        .expect("static regex")
});

/// Validate a model name against the Ollama `[namespace/]model[:tag]` convention.
pub fn validate_model_name(name: &str) -> Result<(), ModelError> {
    if MODEL_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ModelError::InvalidModelName(name.to_string()))
    }
}

/// Partial model match: `llama3.2-vision` matches `llama3.2-vision:11b`,
/// and `llama3.2-vision:11b` matches an installed `llama3.2-vision:latest`.
pub fn model_matches(wanted: &str, installed: &str) -> bool {
    let base = wanted.split(':').next().unwrap_or(wanted);
    installed.contains(wanted) || installed.starts_with(base)
}
