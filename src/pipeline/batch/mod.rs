//! Resumable batch processing.
//!
//! Modules:
//! - `types`: SourceItem, BatchOptions, BatchReport, BatchEvent
//! - `traits`: ImageSource and MetadataSink seams
//! - `cache`: per-source completion cache
//! - `manifest`: append-only JSONL log of committed records
//! - `runner`: the driver loop
//! - `error`: BatchError

pub mod cache;
pub mod error;
pub mod manifest;
pub mod runner;
pub mod traits;
pub mod types;

pub use cache::{cache_path_for, CompletionCache};
pub use error::BatchError;
pub use manifest::{ManifestEntry, ManifestId, ManifestWriter};
pub use runner::BatchDriver;
pub use traits::{ImageSource, MetadataSink};
pub use types::*;
