use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine as _;

use super::ollama_types::*;

/// Vision-language model service abstraction (allows mocking).
///
/// Implementations must fail explicitly when the backend is unreachable;
/// callers never retry inside a pass.
pub trait VisionModel {
    /// Generate text from a prompt and an optional image.
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        image: Option<&[u8]>,
        options: &GenerationOptions,
        force_json: bool,
    ) -> Result<String, ModelError>;

    fn list_models(&self) -> Result<Vec<String>, ModelError>;

    fn pull_model(&self, model: &str) -> Result<(), ModelError>;

    /// Capability check run once before any batch starts.
    fn ensure_model(&self, model: &str, pull_if_missing: bool) -> Result<(), ModelError> {
        validate_model_name(model)?;
        let installed = self.list_models()?;
        if installed.iter().any(|m| model_matches(model, m)) {
            return Ok(());
        }
        if !pull_if_missing {
            return Err(ModelError::ModelNotFound(model.to_string()));
        }
        tracing::warn!(model, "Model not installed, pulling (this can take a while)");
        self.pull_model(model)?;
        tracing::info!(model, "Model pulled");
        Ok(())
    }
}

// ──────────────────────────────────────────────
// OllamaClient
// ──────────────────────────────────────────────

/// Ollama HTTP client for local vision inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ModelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_connect() {
            ModelError::NotReachable(self.base_url.clone())
        } else if e.is_timeout() {
            ModelError::Timeout(self.timeout_secs)
        } else {
            ModelError::Network(e.to_string())
        }
    }

    fn check_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ModelError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default();
        Err(ModelError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}

impl VisionModel for OllamaClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        image: Option<&[u8]>,
        options: &GenerationOptions,
        force_json: bool,
    ) -> Result<String, ModelError> {
        let url = format!("{}/api/chat", self.base_url);
        let images = image.map(|bytes| vec![base64::engine::general_purpose::STANDARD.encode(bytes)]);
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
                images,
            }],
            stream: false,
            options,
            format: force_json.then_some("json"),
        };

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response)?;

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| ModelError::ResponseParsing(e.to_string()))?;

        tracing::debug!(
            model,
            with_image = image.is_some(),
            elapsed_ms = %start.elapsed().as_millis(),
            response_len = parsed.message.content.len(),
            "Ollama chat completed"
        );

        Ok(parsed.message.content)
    }

    fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response)?;

        let parsed: TagsResponse = response
            .json()
            .map_err(|e| ModelError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(TagModel::into_name).collect())
    }

    fn pull_model(&self, model: &str) -> Result<(), ModelError> {
        validate_model_name(model)?;
        let url = format!("{}/api/pull", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&PullRequest {
                name: model,
                stream: false,
            })
            .send()
            .map_err(|e| self.map_send_error(e))?;
        Self::check_status(response)?;
        Ok(())
    }
}

// ──────────────────────────────────────────────
// MockVisionModel
// ──────────────────────────────────────────────

/// A call observed by `MockVisionModel`.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub with_image: bool,
    pub options: GenerationOptions,
    pub force_json: bool,
}

/// Scripted model for testing: returns queued responses in order and
/// records every call.
pub struct MockVisionModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<RecordedCall>>,
    available_models: Vec<String>,
}

impl MockVisionModel {
    pub fn new(responses: Vec<Result<String, ModelError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
            available_models: vec!["llama3.2-vision:11b".to_string()],
        }
    }

    /// Returns the same response for every call.
    pub fn always(response: &str) -> Self {
        let mut mock = Self::new(Vec::new());
        mock.fallback = Some(response.to_string());
        mock
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl VisionModel for MockVisionModel {
    fn generate(
        &self,
        _model: &str,
        prompt: &str,
        image: Option<&[u8]>,
        options: &GenerationOptions,
        force_json: bool,
    ) -> Result<String, ModelError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                with_image: image.is_some(),
                options: options.clone(),
                force_json,
            });
        }

        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(ModelError::Network("no scripted response left".into())),
        }
    }

    fn list_models(&self) -> Result<Vec<String>, ModelError> {
        Ok(self.available_models.clone())
    }

    fn pull_model(&self, model: &str) -> Result<(), ModelError> {
        Err(ModelError::ModelNotFound(model.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_scripted_responses_in_order() {
        let mock = MockVisionModel::new(vec![
            Ok("first".into()),
            Err(ModelError::NotReachable("localhost".into())),
        ]);
        let opts = GenerationOptions::raw_extraction();
        assert_eq!(mock.generate("m", "p", None, &opts, true).unwrap(), "first");
        assert!(matches!(
            mock.generate("m", "p", None, &opts, true),
            Err(ModelError::NotReachable(_))
        ));
        assert!(mock.generate("m", "p", None, &opts, true).is_err());
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn mock_records_image_and_options() {
        let mock = MockVisionModel::always("{}");
        let opts = GenerationOptions::normalization();
        mock.generate("m", "describe", Some(b"jpeg"), &opts, true).unwrap();
        let calls = mock.calls();
        assert!(calls[0].with_image);
        assert!(calls[0].force_json);
        assert_eq!(calls[0].options, opts);
    }

    #[test]
    fn ensure_model_accepts_partial_match() {
        let mock = MockVisionModel::always("").with_models(vec!["llama3.2-vision:11b".into()]);
        assert!(mock.ensure_model("llama3.2-vision", false).is_ok());
    }

    #[test]
    fn ensure_model_reports_missing_without_pull() {
        let mock = MockVisionModel::always("").with_models(vec!["qwen2-vl:7b".into()]);
        assert!(matches!(
            mock.ensure_model("llava:13b", false),
            Err(ModelError::ModelNotFound(_))
        ));
    }

    #[test]
    fn ensure_model_rejects_invalid_name() {
        let mock = MockVisionModel::always("");
        assert!(matches!(
            mock.ensure_model("bad name", true),
            Err(ModelError::InvalidModelName(_))
        ));
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 60).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn unreachable_ollama_fails_explicitly() {
        // Port 9 (discard) is not an Ollama server; connection is refused.
        let client = OllamaClient::new("http://127.0.0.1:9", 2).unwrap();
        let result = client.list_models();
        assert!(result.is_err());
    }
}
