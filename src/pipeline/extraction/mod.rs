pub mod recovery;
pub mod prompt;
pub mod assembly;
pub mod confidence;
pub mod engine;

pub use recovery::*;
pub use prompt::*;
pub use confidence::*;
pub use engine::*;

use thiserror::Error;

use crate::pipeline::ollama_types::ModelError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Vision model service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Model service error: {0}")]
    Model(ModelError),

    #[error("Could not recover structured data from model output: {0}")]
    MalformedResponse(String),

    #[error("Raw extraction failed: {0}")]
    ExtractionFailed(Box<PipelineError>),

    #[error("Normalization failed: {0}")]
    NormalizationFailed(Box<PipelineError>),

    #[error("Could not read image: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the model service itself is down, as opposed to one bad response.
    pub fn is_service_unavailable(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) => true,
            Self::ExtractionFailed(inner) | Self::NormalizationFailed(inner) => {
                inner.is_service_unavailable()
            }
            _ => false,
        }
    }
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NotReachable(_) | ModelError::Timeout(_) => {
                PipelineError::ServiceUnavailable(err.to_string())
            }
            other => PipelineError::Model(other),
        }
    }
}
