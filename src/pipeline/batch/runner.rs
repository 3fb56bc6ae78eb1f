//! BatchDriver: resumable, failure-isolating loop over source items.
//!
//! Source -> Extraction engine -> Sink -> Manifest -> Completion cache.
//! Runs sequentially (one model call at a time). A failing item never stops
//! the batch; it is logged, reported and left out of the cache.

use std::time::Instant;

use super::cache::CompletionCache;
use super::error::BatchError;
use super::manifest::ManifestWriter;
use super::traits::{ImageSource, MetadataSink};
use super::types::*;
use crate::models::MetadataRecord;
use crate::pipeline::extraction::ExtractionEngine;

/// One batch driver shared by every ingestion source.
pub struct BatchDriver<'a> {
    engine: &'a ExtractionEngine,
    source: &'a dyn ImageSource,
    sink: &'a dyn MetadataSink,
    manifest: &'a ManifestWriter,
    options: BatchOptions,
}

impl<'a> BatchDriver<'a> {
    pub fn new(
        engine: &'a ExtractionEngine,
        source: &'a dyn ImageSource,
        sink: &'a dyn MetadataSink,
        manifest: &'a ManifestWriter,
        options: BatchOptions,
    ) -> Self {
        Self {
            engine,
            source,
            sink,
            manifest,
            options,
        }
    }

    /// Process `items` in order against `cache`.
    ///
    /// The cache is flushed once after the loop (never in dry-run). The
    /// report is always returned: per-item failures are in `failures`, a
    /// failed flush in `cache_error`.
    pub fn run(
        &self,
        items: &[SourceItem],
        cache: &mut CompletionCache,
        progress_fn: Option<&dyn Fn(BatchEvent)>,
    ) -> BatchReport {
        let start = Instant::now();
        let total = items.len() as u32;
        let _span = tracing::info_span!(
            "batch_run",
            total,
            sink = self.sink.name(),
            dry_run = self.options.dry_run,
        )
        .entered();

        tracing::info!(
            total,
            cached = cache.len(),
            cache_updated = ?cache.last_updated(),
            "Batch started"
        );
        if let Some(progress) = progress_fn {
            progress(BatchEvent::Started { total });
        }

        let mut report = BatchReport::default();

        for (i, item) in items.iter().enumerate() {
            if self.options.skip_processed && cache.contains(&item.id) {
                tracing::debug!(id = %item.id, "Already processed, skipping");
                report.skipped += 1;
                continue;
            }

            if let Some(progress) = progress_fn {
                progress(BatchEvent::Progress {
                    completed: i as u32,
                    total,
                    current: item.filename.clone(),
                });
            }

            report.attempted += 1;
            match self.process_item(item, cache) {
                Ok(record) => {
                    report.succeeded += 1;
                    report.records.push(record);
                }
                Err(e) => {
                    tracing::warn!(id = %item.id, error = %e, "Item failed, continuing");
                    if let Some(progress) = progress_fn {
                        progress(BatchEvent::ItemFailed {
                            id: item.id.clone(),
                            error: e.to_string(),
                        });
                    }
                    report.failures.push(ItemFailure {
                        id: item.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if self.options.dry_run {
            tracing::info!("Dry run: completion cache not written");
        } else if let Err(e) = cache.save() {
            tracing::warn!(
                path = %cache.path().display(),
                error = %e,
                "Completion cache not saved; processed items will be redone next run"
            );
            report.cache_error = Some(e.to_string());
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed(),
            duration_ms = report.duration_ms,
            "Batch completed"
        );
        if let Some(progress) = progress_fn {
            progress(BatchEvent::Completed {
                succeeded: report.succeeded,
                failed: report.failed(),
                skipped: report.skipped,
                duration_ms: report.duration_ms,
            });
        }

        report
    }

    fn process_item(
        &self,
        item: &SourceItem,
        cache: &mut CompletionCache,
    ) -> Result<MetadataRecord, BatchError> {
        let bytes = self.source.fetch(item)?;
        let record = self
            .engine
            .process_image(&bytes, &item.id, item.source, &item.filename)?;

        if self.options.dry_run {
            tracing::info!(id = %item.id, "Dry run: nothing written");
            return Ok(record);
        }

        self.sink.commit(&record).map_err(|e| match e {
            BatchError::SinkWriteFailed(_) => e,
            other => BatchError::SinkWriteFailed(other.to_string()),
        })?;
        self.manifest.append(&record)?;
        cache.insert(&item.id);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use super::*;
    use crate::models::SourceTag;
    use crate::pipeline::extraction::engine::fixtures::*;
    use crate::pipeline::extraction::PromptBuilder;
    use crate::pipeline::ollama::MockVisionModel;
    use crate::pipeline::ollama_types::ModelError;

    /// Serves fixed bytes for every id, or fails for ids in `missing`.
    struct StaticSource {
        missing: HashSet<String>,
    }

    impl StaticSource {
        fn new() -> Self {
            Self {
                missing: HashSet::new(),
            }
        }
    }

    impl ImageSource for StaticSource {
        fn fetch(&self, item: &SourceItem) -> Result<Vec<u8>, BatchError> {
            if self.missing.contains(&item.id) {
                Err(BatchError::fetch(&item.id, "not found"))
            } else {
                Ok(format!("bytes of {}", item.id).into_bytes())
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        committed: RefCell<Vec<String>>,
        fail_for: HashMap<String, String>,
    }

    impl MetadataSink for RecordingSink {
        fn commit(&self, record: &MetadataRecord) -> Result<(), BatchError> {
            if let Some(reason) = self.fail_for.get(&record.file_id) {
                return Err(BatchError::SinkWriteFailed(reason.clone()));
            }
            self.committed.borrow_mut().push(record.file_id.clone());
            Ok(())
        }
    }

    fn items(ids: &[&str]) -> Vec<SourceItem> {
        ids.iter()
            .map(|id| SourceItem::new(*id, format!("{id}.jpg"), SourceTag::FirstPartyArchive))
            .collect()
    }

    fn scripted_ok(count: usize) -> Vec<Result<String, ModelError>> {
        (0..count)
            .flat_map(|_| [Ok(raw_response_img001()), Ok(normalized_response_img001())])
            .collect()
    }

    fn engine_with(mock: &Arc<MockVisionModel>) -> ExtractionEngine {
        ExtractionEngine::new(mock.clone(), "llama3.2-vision:11b", PromptBuilder::default())
    }

    #[test]
    fn second_run_skips_cached_items() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        let cache_path = dir.path().join("processed_files.json");
        let source = StaticSource::new();
        let sink = RecordingSink::default();
        let list = items(&["a", "b"]);

        let mock = Arc::new(MockVisionModel::new(scripted_ok(2)));
        let engine = engine_with(&mock);
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, BatchOptions::default());
        let mut cache = CompletionCache::load(&cache_path);
        let first = driver.run(&list, &mut cache, None);
        assert_eq!(first.succeeded, 2);
        assert_eq!(mock.call_count(), 4);

        let mock2 = Arc::new(MockVisionModel::always("{}"));
        let engine2 = engine_with(&mock2);
        let driver2 =
            BatchDriver::new(&engine2, &source, &sink, &manifest, BatchOptions::default());
        let mut cache2 = CompletionCache::load(&cache_path);
        let second = driver2.run(&list, &mut cache2, None);
        assert_eq!(second.attempted, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(mock2.call_count(), 0);
    }

    #[test]
    fn skip_disabled_reprocesses_cached_items() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        let source = StaticSource::new();
        let sink = RecordingSink::default();
        let mut cache = CompletionCache::empty(dir.path().join("processed_files.json"));
        cache.insert("a");

        let mock = Arc::new(MockVisionModel::new(scripted_ok(1)));
        let engine = engine_with(&mock);
        let options = BatchOptions {
            skip_processed: false,
            dry_run: false,
        };
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, options);
        let report = driver.run(&items(&["a"]), &mut cache, None);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn service_outage_on_one_item_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        let source = StaticSource::new();
        let sink = RecordingSink::default();
        let mut cache = CompletionCache::empty(dir.path().join("processed_files.json"));

        let mock = Arc::new(MockVisionModel::new(vec![
            Ok(raw_response_img001()),
            Ok(normalized_response_img001()),
            Err(ModelError::NotReachable("http://localhost:11434".into())),
            Ok(raw_response_img001()),
            Ok(normalized_response_img001()),
        ]));
        let engine = engine_with(&mock);
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, BatchOptions::default());
        let report = driver.run(&items(&["1", "2", "3"]), &mut cache, None);

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "2");
        assert_eq!(*sink.committed.borrow(), vec!["1", "3"]);
        assert!(!cache.contains("2"));
    }

    #[test]
    fn img001_end_to_end_through_driver() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        let source = StaticSource::new();
        let sink = RecordingSink::default();
        let mut cache = CompletionCache::empty(dir.path().join("processed_files.json"));

        let mock = Arc::new(MockVisionModel::new(scripted_ok(1)));
        let engine = engine_with(&mock);
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, BatchOptions::default());
        let report = driver.run(&items(&["img001"]), &mut cache, None);

        let record = &report.records[0];
        assert_eq!(record.file_id, "img001");
        assert_eq!(record.habitat_guess, "manguezal");
        assert!((record.habitat_confidence - 0.9).abs() < 1e-6);
        assert_eq!(record.species_candidates.len(), 1);
        assert_eq!(record.species_candidates[0].common_name, "caranguejo-uçá");
        assert_eq!(record.title, "Manguezal com caranguejo-uçá");
        assert!(record.keywords.iter().any(|k| k == "bioma:manguezal"));
        assert!(cache.contains("img001"));
    }

    #[test]
    fn manifest_has_one_line_per_success_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        let source = StaticSource::new();
        let sink = RecordingSink::default();
        let mut cache = CompletionCache::empty(dir.path().join("processed_files.json"));

        let mock = Arc::new(MockVisionModel::new(scripted_ok(2)));
        let engine = engine_with(&mock);
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, BatchOptions::default());
        driver.run(&items(&["first", "second"]), &mut cache, None);

        let content = std::fs::read_to_string(manifest.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["file_path"], "first");
        assert_eq!(lines[1]["file_path"], "second");
    }

    #[test]
    fn sink_failure_leaves_item_uncached() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        let source = StaticSource::new();
        let sink = RecordingSink {
            fail_for: HashMap::from([("b".to_string(), "read-only volume".to_string())]),
            ..Default::default()
        };
        let cache_path = dir.path().join("processed_files.json");
        let mut cache = CompletionCache::empty(&cache_path);

        let mock = Arc::new(MockVisionModel::new(scripted_ok(2)));
        let engine = engine_with(&mock);
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, BatchOptions::default());
        let report = driver.run(&items(&["a", "b"]), &mut cache, None);

        assert_eq!(report.succeeded, 1);
        assert!(report.failures[0].error.contains("read-only volume"));
        let reloaded = CompletionCache::load(&cache_path);
        assert!(reloaded.contains("a"));
        assert!(!reloaded.contains("b"));
        let lines = std::fs::read_to_string(manifest.path()).unwrap();
        assert_eq!(lines.lines().count(), 1);
    }

    #[test]
    fn fetch_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        let source = StaticSource {
            missing: HashSet::from(["gone".to_string()]),
        };
        let sink = RecordingSink::default();
        let mut cache = CompletionCache::empty(dir.path().join("processed_files.json"));

        let mock = Arc::new(MockVisionModel::new(scripted_ok(1)));
        let engine = engine_with(&mock);
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, BatchOptions::default());
        let report = driver.run(&items(&["gone", "here"]), &mut cache, None);

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(mock.call_count(), 2);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        let cache_path = dir.path().join("processed_files.json");
        let source = StaticSource::new();
        let sink = RecordingSink::default();
        let mut cache = CompletionCache::load(&cache_path);

        let mock = Arc::new(MockVisionModel::new(scripted_ok(1)));
        let engine = engine_with(&mock);
        let options = BatchOptions {
            skip_processed: true,
            dry_run: true,
        };
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, options);
        let report = driver.run(&items(&["a"]), &mut cache, None);

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.records.len(), 1);
        assert!(sink.committed.borrow().is_empty());
        assert!(!manifest.path().exists());
        assert!(!cache_path.exists());
    }

    #[test]
    fn progress_events_are_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        let source = StaticSource::new();
        let sink = RecordingSink::default();
        let mut cache = CompletionCache::empty(dir.path().join("processed_files.json"));

        let mock = Arc::new(MockVisionModel::new(vec![
            Ok(raw_response_img001()),
            Ok(normalized_response_img001()),
            Ok("nada".into()),
        ]));
        let engine = engine_with(&mock);
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, BatchOptions::default());

        let events = RefCell::new(Vec::new());
        let record_event = |e: BatchEvent| events.borrow_mut().push(e);
        driver.run(&items(&["ok", "bad"]), &mut cache, Some(&record_event));

        let events = events.into_inner();
        assert!(matches!(events[0], BatchEvent::Started { total: 2 }));
        assert!(events
            .iter()
            .any(|e| matches!(e, BatchEvent::ItemFailed { id, .. } if id == "bad")));
        assert!(matches!(
            events.last(),
            Some(BatchEvent::Completed {
                succeeded: 1,
                failed: 1,
                ..
            })
        ));
    }

    #[test]
    fn unwritable_cache_keeps_report() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        // cache directory is a regular file, so the flush cannot succeed
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let mut cache = CompletionCache::empty(blocker.join("processed_files.json"));
        let source = StaticSource::new();
        let sink = RecordingSink::default();

        let mock = Arc::new(MockVisionModel::new(scripted_ok(1)));
        let engine = engine_with(&mock);
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, BatchOptions::default());
        let report = driver.run(&items(&["a"]), &mut cache, None);

        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert!(report.cache_error.is_some());
        assert_eq!(*sink.committed.borrow(), vec!["a".to_string()]);
        let manifest_lines = std::fs::read_to_string(manifest.path()).unwrap();
        assert_eq!(manifest_lines.lines().count(), 1);
    }

    #[test]
    fn successful_flush_has_no_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestWriter::new(dir.path().join("manifest.jsonl"));
        let mut cache = CompletionCache::empty(dir.path().join("processed_files.json"));
        let source = StaticSource::new();
        let sink = RecordingSink::default();

        let mock = Arc::new(MockVisionModel::new(scripted_ok(1)));
        let engine = engine_with(&mock);
        let driver = BatchDriver::new(&engine, &source, &sink, &manifest, BatchOptions::default());
        let report = driver.run(&items(&["a"]), &mut cache, None);

        assert!(report.cache_error.is_none());
        assert!(cache.path().exists());
    }
}
