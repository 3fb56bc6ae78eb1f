//! Append-only JSON Lines manifest of every committed record.
//!
//! One object per line, written as soon as an item succeeds:
//!
//! ```json
//! {"file_path": "/fotos/a.CR3", "metadata": {...}, "project": "lightroom", "timestamp": "..."}
//! {"file_id": "1AbC", "file_name": "a.jpg", "metadata": {...}, "project": "drive", "timestamp": "..."}
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::error::BatchError;
use crate::models::{MetadataRecord, SourceTag};

/// How an entry identifies its image: a local path or a remote file id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestId {
    Local {
        file_path: String,
    },
    Remote {
        file_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
}

impl ManifestId {
    pub fn id(&self) -> &str {
        match self {
            Self::Local { file_path } => file_path,
            Self::Remote { file_id, .. } => file_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub key: ManifestId,
    pub metadata: MetadataRecord,
    pub project: SourceTag,
    pub timestamp: String,
}

impl ManifestEntry {
    pub fn for_record(record: &MetadataRecord) -> Self {
        let key = if record.source.is_remote() {
            ManifestId::Remote {
                file_id: record.file_id.clone(),
                file_name: Some(record.original_filename.clone()),
            }
        } else {
            ManifestId::Local {
                file_path: record.file_id.clone(),
            }
        };
        Self {
            key,
            metadata: record.clone(),
            project: record.source,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }
}

/// Appends entries to a manifest file, creating it on first write.
#[derive(Debug, Clone)]
pub struct ManifestWriter {
    path: PathBuf,
}

impl ManifestWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &MetadataRecord) -> Result<(), BatchError> {
        self.append_entry(&ManifestEntry::for_record(record))
    }

    pub fn append_entry(&self, entry: &ManifestEntry) -> Result<(), BatchError> {
        let mut line =
            serde_json::to_string(entry).map_err(|e| BatchError::Manifest(e.to_string()))?;
        line.push('\n');

        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| BatchError::Manifest(e.to_string()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BatchError::Manifest(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .map_err(|e| BatchError::Manifest(e.to_string()))?;
        Ok(())
    }
}
