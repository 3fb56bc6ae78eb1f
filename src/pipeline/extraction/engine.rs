//! Two-pass extraction engine.
//!
//! ```text
//! START -> RAW_EXTRACTION -> RAW_RECOVERED -> NORMALIZATION
//!       -> NORMALIZED_RECOVERED -> ASSEMBLED -> DONE
//! ```
//!
//! Any step may end in FAILED. Pass 1 failures surface as
//! `ExtractionFailed`, pass 2 failures as `NormalizationFailed`. The engine
//! never retries: the batch driver decides what a failed image means.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use super::assembly::{assemble_record, RecordIdentity};
use super::prompt::PromptBuilder;
use super::recovery::recover_object;
use super::PipelineError;
use crate::models::{MetadataRecord, SourceTag};
use crate::pipeline::ollama::VisionModel;
use crate::pipeline::ollama_types::GenerationOptions;

/// Engine states, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Start,
    RawExtraction,
    RawRecovered,
    Normalization,
    NormalizedRecovered,
    Assembled,
    Done,
    Failed,
}

pub struct ExtractionEngine {
    model: Arc<dyn VisionModel>,
    model_name: String,
    prompts: PromptBuilder,
    raw_options: GenerationOptions,
    normalization_options: GenerationOptions,
}

impl ExtractionEngine {
    pub fn new(model: Arc<dyn VisionModel>, model_name: &str, prompts: PromptBuilder) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            prompts,
            raw_options: GenerationOptions::raw_extraction(),
            normalization_options: GenerationOptions::normalization(),
        }
    }

    /// Construct after verifying the model is installed (pulling it if
    /// `pull_if_missing`). An unreachable service is `ServiceUnavailable`.
    pub fn with_capability_check(
        model: Arc<dyn VisionModel>,
        model_name: &str,
        prompts: PromptBuilder,
        pull_if_missing: bool,
    ) -> Result<Self, PipelineError> {
        model.ensure_model(model_name, pull_if_missing)?;
        tracing::info!(
            model = model_name,
            prompt_version = %prompts.version(),
            "Vision model ready"
        );
        Ok(Self::new(model, model_name, prompts))
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Read an image from disk and process it. The path doubles as file id.
    pub fn process_path(&self, path: &Path, source: SourceTag) -> Result<MetadataRecord, PipelineError> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.process_image(&bytes, &path.to_string_lossy(), source, &filename)
    }

    /// Run both passes over one image and assemble the record.
    pub fn process_image(
        &self,
        image: &[u8],
        file_id: &str,
        source: SourceTag,
        filename: &str,
    ) -> Result<MetadataRecord, PipelineError> {
        let _span = tracing::info_span!(
            "extract_image",
            file_id = %file_id,
            model = %self.model_name,
            image_size = image.len(),
        )
        .entered();
        let start = std::time::Instant::now();
        let mut state = ExtractionState::Start;

        let result = self.run_passes(image, file_id, source, filename, &mut state);

        match &result {
            Ok(record) => {
                transition(&mut state, ExtractionState::Done);
                tracing::info!(
                    habitat = %record.habitat_guess,
                    species = record.species_candidates.len(),
                    keywords = record.keywords.len(),
                    elapsed_ms = %start.elapsed().as_millis(),
                    "Image processed"
                );
            }
            Err(e) => {
                let failed_at = state;
                transition(&mut state, ExtractionState::Failed);
                tracing::warn!(?failed_at, error = %e, "Image extraction failed");
            }
        }

        result
    }

    fn run_passes(
        &self,
        image: &[u8],
        file_id: &str,
        source: SourceTag,
        filename: &str,
        state: &mut ExtractionState,
    ) -> Result<MetadataRecord, PipelineError> {
        transition(state, ExtractionState::RawExtraction);
        let raw = self
            .raw_pass(image)
            .map_err(|e| PipelineError::ExtractionFailed(Box::new(e)))?;
        transition(state, ExtractionState::RawRecovered);

        transition(state, ExtractionState::Normalization);
        let normalized = self
            .normalization_pass(&raw)
            .map_err(|e| PipelineError::NormalizationFailed(Box::new(e)))?;
        transition(state, ExtractionState::NormalizedRecovered);

        let record = assemble_record(
            &raw,
            &normalized,
            RecordIdentity {
                file_id,
                source,
                filename,
            },
        );
        transition(state, ExtractionState::Assembled);
        Ok(record)
    }

    /// Pass 1: image + vocabulary prompt, JSON mode.
    fn raw_pass(&self, image: &[u8]) -> Result<serde_json::Map<String, Value>, PipelineError> {
        let prompt = self.prompts.raw_extraction_prompt();
        let text = self
            .model
            .generate(&self.model_name, &prompt, Some(image), &self.raw_options, true)?;
        recover_object(&text)
    }

    /// Pass 2: text-only refinement of the raw result.
    fn normalization_pass(
        &self,
        raw: &serde_json::Map<String, Value>,
    ) -> Result<serde_json::Map<String, Value>, PipelineError> {
        let prompt = self
            .prompts
            .normalization_prompt(&Value::Object(raw.clone()));
        let text = self.model.generate(
            &self.model_name,
            &prompt,
            None,
            &self.normalization_options,
            true,
        )?;
        recover_object(&text)
    }
}

fn transition(state: &mut ExtractionState, next: ExtractionState) {
    tracing::debug!(from = ?*state, to = ?next, "Extraction state change");
    *state = next;
}
