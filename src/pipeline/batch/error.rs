//! Batch-level error types.
//!
//! Every variant is recoverable at the item level: the driver records it in
//! the report and moves on to the next item.

use thiserror::Error;

use crate::pipeline::extraction::PipelineError;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Sink write failed: {0}")]
    SinkWriteFailed(String),

    #[error("Could not fetch image '{id}': {reason}")]
    SourceFetch { id: String, reason: String },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Completion cache error: {0}")]
    Cache(String),
}

impl BatchError {
    pub fn fetch(id: &str, reason: impl std::fmt::Display) -> Self {
        Self::SourceFetch {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}
