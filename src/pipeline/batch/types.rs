//! Types shared by the batch driver, its sources and its sinks.

use serde::{Deserialize, Serialize};

use crate::models::{MetadataRecord, SourceTag};

// ═══════════════════════════════════════════
// Input
// ═══════════════════════════════════════════

/// One image to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    /// File path for local sources, remote file id for cloud storage.
    pub id: String,
    pub filename: String,
    pub source: SourceTag,
}

impl SourceItem {
    pub fn new(id: impl Into<String>, filename: impl Into<String>, source: SourceTag) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Skip identifiers already in the completion cache.
    pub skip_processed: bool,
    /// Extract but write nothing: no sink, no manifest, no cache flush.
    pub dry_run: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            skip_processed: true,
            dry_run: false,
        }
    }
}

// ═══════════════════════════════════════════
// Output
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Items for which extraction was started (skips excluded).
    pub attempted: u32,
    pub succeeded: u32,
    pub skipped: u32,
    pub failures: Vec<ItemFailure>,
    /// Successful records in processing order.
    pub records: Vec<MetadataRecord>,
    pub duration_ms: u64,
    /// Set when the completion cache could not be flushed at the end.
    pub cache_error: Option<String>,
}

impl BatchReport {
    pub fn failed(&self) -> u32 {
        self.failures.len() as u32
    }
}

// ═══════════════════════════════════════════
// Progress events
// ═══════════════════════════════════════════

/// Event emitted during a batch for progress display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchEvent {
    Started {
        total: u32,
    },
    Progress {
        completed: u32,
        total: u32,
        current: String,
    },
    ItemFailed {
        id: String,
        error: String,
    },
    Completed {
        succeeded: u32,
        failed: u32,
        skipped: u32,
        duration_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_skip_processed() {
        let opts = BatchOptions::default();
        assert!(opts.skip_processed);
        assert!(!opts.dry_run);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = BatchEvent::Progress {
            completed: 3,
            total: 7,
            current: "IMG_0003.CR3".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Progress\""));
        assert!(json.contains("\"completed\":3"));
    }

    #[test]
    fn report_counts_failures() {
        let report = BatchReport {
            failures: vec![ItemFailure {
                id: "a".into(),
                error: "boom".into(),
            }],
            ..Default::default()
        };
        assert_eq!(report.failed(), 1);
    }
}
