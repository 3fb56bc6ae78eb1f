//! Completion cache: the set of identifiers already processed for a source.
//!
//! Loaded once before a batch, mutated in memory, flushed once at batch end.
//! On-disk format:
//!
//! ```json
//! {"processed_files": ["..."], "last_updated": "2026-03-01T12:00:00+00:00"}
//! ```

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::BatchError;
use crate::config;
use crate::models::{parse_timestamp, SourceTag};

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    processed_files: Vec<String>,
    #[serde(default)]
    last_updated: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletionCache {
    path: PathBuf,
    processed: BTreeSet<String>,
    last_updated: Option<DateTime<Utc>>,
}

impl CompletionCache {
    /// Empty cache bound to `path`, nothing read from disk.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            processed: BTreeSet::new(),
            last_updated: None,
        }
    }

    /// Load the cache at `path`. A missing or unreadable file yields an empty
    /// cache; a corrupt one is logged and treated as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut cache = Self::empty(path.clone());

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return cache,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not read completion cache");
                return cache;
            }
        };

        match serde_json::from_str::<CacheFile>(&content) {
            Ok(file) => {
                cache.processed = file.processed_files.into_iter().collect();
                cache.last_updated = file
                    .last_updated
                    .as_deref()
                    .and_then(parse_timestamp);
                tracing::debug!(
                    path = %path.display(),
                    entries = cache.processed.len(),
                    "Completion cache loaded"
                );
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt completion cache, starting empty");
            }
        }
        cache
    }

    /// Cache file for `source` located next to the manifest.
    pub fn for_source(manifest_path: &Path, source: SourceTag) -> Self {
        Self::load(cache_path_for(manifest_path, source))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.processed.contains(id)
    }

    pub fn insert(&mut self, id: &str) -> bool {
        self.processed.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Write the cache to disk atomically and stamp `last_updated`.
    pub fn save(&mut self) -> Result<(), BatchError> {
        let now = Utc::now();
        let file = CacheFile {
            processed_files: self.processed.iter().cloned().collect(),
            last_updated: Some(now.to_rfc3339()),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| BatchError::Cache(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| BatchError::Cache(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| BatchError::Cache(e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| BatchError::Cache(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| BatchError::Cache(e.to_string()))?;

        self.last_updated = Some(now);
        tracing::debug!(path = %self.path.display(), entries = self.processed.len(), "Completion cache saved");
        Ok(())
    }
}

/// `processed_files.json` for local sources, `drive_processed_files.json`
/// for cloud storage, both in the manifest's directory.
pub fn cache_path_for(manifest_path: &Path, source: SourceTag) -> PathBuf {
    let name = if source.is_remote() {
        config::DRIVE_CACHE_FILENAME
    } else {
        config::LOCAL_CACHE_FILENAME
    };
    match manifest_path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompletionCache::load(dir.path().join("processed_files.json"));
        assert!(cache.is_empty());
        assert!(cache.last_updated().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.json");
        let mut cache = CompletionCache::load(&path);
        cache.insert("/fotos/a.CR3");
        cache.insert("/fotos/b.CR3");
        cache.save().unwrap();

        let reloaded = CompletionCache::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("/fotos/a.CR3"));
        assert!(reloaded.last_updated().is_some());
    }

    #[test]
    fn written_file_uses_expected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.json");
        let mut cache = CompletionCache::empty(&path);
        cache.insert("x");
        cache.save().unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["processed_files"], serde_json::json!(["x"]));
        assert!(value["last_updated"].is_string());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(CompletionCache::load(&path).is_empty());
    }

    #[test]
    fn legacy_timestamp_without_offset_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_files.json");
        std::fs::write(
            &path,
            r#"{"processed_files": ["a"], "last_updated": "2025-11-03T14:22:05.123456"}"#,
        )
        .unwrap();
        let cache = CompletionCache::load(&path);
        assert!(cache.contains("a"));
        assert!(cache.last_updated().is_some());
    }

    #[test]
    fn cache_file_is_chosen_per_source() {
        let manifest = Path::new("/data/acquaplan_manifest.jsonl");
        assert_eq!(
            cache_path_for(manifest, SourceTag::FirstPartyArchive),
            PathBuf::from("/data/processed_files.json")
        );
        assert_eq!(
            cache_path_for(manifest, SourceTag::CloudStorage),
            PathBuf::from("/data/drive_processed_files.json")
        );
    }
}
