pub mod ollama_types;
pub mod ollama;
pub mod extraction;
pub mod batch; // Resumable batch driver shared by every ingestion source

pub use extraction::{ExtractionEngine, PipelineError};
pub use ollama::{MockVisionModel, OllamaClient, VisionModel};
pub use ollama_types::{GenerationOptions, ModelError};
