//! Manifest tools: load the JSONL log, summarize it, filter it and export CSV.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::adapters::describe::format_for_xmp;
use crate::models::SourceTag;
use crate::pipeline::batch::ManifestEntry;
use crate::pipeline::extraction::ConfidenceThresholds;

/// Species below this confidence are left out of the stats ranking.
const STATS_SPECIES_MIN_CONFIDENCE: f32 = 0.7;
const TOP_HABITATS: usize = 10;
const TOP_SPECIES: usize = 10;
const TOP_KEYWORDS: usize = 30;
const ANALYSIS_KEYWORDS: usize = 10;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Manifest not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Summary of a manifest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManifestStats {
    pub total_entries: usize,
    pub by_project: BTreeMap<String, usize>,
    /// Most common habitats, most frequent first.
    pub habitats: Vec<(String, usize)>,
    /// Most identified species with confidence above 0.7.
    pub top_species: Vec<(String, usize)>,
    pub archaeology_entries: usize,
    pub top_keywords: Vec<(String, usize)>,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    /// Entries beyond the first for an id. Expected after a resumed crash,
    /// since the cache is only flushed at batch end.
    pub duplicate_entries: usize,
}

/// A loaded manifest.
#[derive(Debug, Clone, Default)]
pub struct ManifestLog {
    entries: Vec<ManifestEntry>,
    skipped_lines: usize,
}

impl ManifestLog {
    /// Read every line of the manifest. Blank lines are ignored; lines that
    /// do not parse are logged and counted in `skipped_lines`.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        if !path.exists() {
            return Err(ReportError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;

        let mut log = Self::default();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ManifestEntry>(line) {
                Ok(entry) => log.entries.push(entry),
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "Skipping unreadable manifest line");
                    log.skipped_lines += 1;
                }
            }
        }
        tracing::debug!(
            path = %path.display(),
            entries = log.entries.len(),
            skipped = log.skipped_lines,
            "Manifest loaded"
        );
        Ok(log)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    pub fn stats(&self) -> ManifestStats {
        let mut by_project = BTreeMap::new();
        let mut habitats = HashMap::new();
        let mut species = HashMap::new();
        let mut keywords = HashMap::new();
        let mut ids: HashMap<&str, usize> = HashMap::new();
        let mut archaeology_entries = 0;

        for entry in &self.entries {
            let meta = &entry.metadata;
            *by_project.entry(entry.project.as_str().to_string()).or_insert(0) += 1;
            *ids.entry(entry.id()).or_insert(0) += 1;

            if !meta.habitat_guess.is_empty() {
                *habitats.entry(meta.habitat_guess.as_str()).or_insert(0) += 1;
            }
            for sp in &meta.species_candidates {
                if sp.confidence > STATS_SPECIES_MIN_CONFIDENCE {
                    let name = if sp.scientific_name.is_empty() {
                        sp.common_name.as_str()
                    } else {
                        sp.scientific_name.as_str()
                    };
                    *species.entry(name).or_insert(0) += 1;
                }
            }
            if !meta.archaeology_flags.is_empty() {
                archaeology_entries += 1;
            }
            for kw in &meta.keywords {
                *keywords.entry(kw.as_str()).or_insert(0) += 1;
            }
        }

        ManifestStats {
            total_entries: self.entries.len(),
            by_project,
            habitats: most_common(habitats, TOP_HABITATS),
            top_species: most_common(species, TOP_SPECIES),
            archaeology_entries,
            top_keywords: most_common(keywords, TOP_KEYWORDS),
            first_timestamp: self.entries.iter().map(|e| e.timestamp.clone()).min(),
            last_timestamp: self.entries.iter().map(|e| e.timestamp.clone()).max(),
            duplicate_entries: ids.values().map(|n| n - 1).sum(),
        }
    }

    // ──────────────────────────────────────────────
    // Filters
    // ──────────────────────────────────────────────

    pub fn filter_by_habitat(&self, habitat: &str) -> Vec<&ManifestEntry> {
        self.entries
            .iter()
            .filter(|e| e.metadata.habitat_guess == habitat)
            .collect()
    }

    /// Entries with a species whose common or scientific name contains
    /// `name` (case-insensitive) at `min_confidence` or above.
    pub fn filter_by_species(&self, name: &str, min_confidence: f32) -> Vec<&ManifestEntry> {
        let needle = name.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                e.metadata.species_candidates.iter().any(|sp| {
                    sp.confidence >= min_confidence
                        && (sp.common_name.to_lowercase().contains(&needle)
                            || sp.scientific_name.to_lowercase().contains(&needle))
                })
            })
            .collect()
    }

    pub fn with_archaeology(&self) -> Vec<&ManifestEntry> {
        self.entries
            .iter()
            .filter(|e| !e.metadata.archaeology_flags.is_empty())
            .collect()
    }

    // ──────────────────────────────────────────────
    // Exports
    // ──────────────────────────────────────────────

    /// CSV for `exiftool -csv=<file> <dir>`. Returns the number of rows.
    pub fn export_exiftool_csv(
        &self,
        output: &Path,
        project: Option<SourceTag>,
        thresholds: &ConfidenceThresholds,
    ) -> Result<usize, ReportError> {
        let mut writer = csv::Writer::from_path(output)?;
        writer.write_record([
            "SourceFile",
            "XMP-dc:Title",
            "XMP-dc:Description",
            "IPTC:Caption-Abstract",
            "XMP-dc:Subject",
            "IPTC:Keywords",
        ])?;

        let mut rows = 0;
        for entry in self
            .entries
            .iter()
            .filter(|e| project.map_or(true, |p| e.project == p))
        {
            let meta = &entry.metadata;
            let keywords = meta.keywords.join(";");
            let description = format_for_xmp(meta, thresholds);
            let row: [&str; 6] = [
                entry.id(),
                &meta.title,
                &description,
                &meta.description_short,
                &keywords,
                &keywords,
            ];
            writer.write_record(row)?;
            rows += 1;
        }
        writer.flush()?;
        Ok(rows)
    }

    /// Flat one-row-per-image CSV for spreadsheets. Returns the number of rows.
    pub fn export_analysis_csv(&self, output: &Path) -> Result<usize, ReportError> {
        let mut writer = csv::Writer::from_path(output)?;
        writer.write_record([
            "file_id",
            "filename",
            "project",
            "timestamp",
            "title",
            "description_short",
            "habitat",
            "habitat_confidence",
            "species_count",
            "top_species",
            "archaeology_flags",
            "keywords_count",
            "top_keywords",
        ])?;

        for entry in &self.entries {
            let meta = &entry.metadata;
            let top_species = meta
                .species_candidates
                .first()
                .map(|sp| format!("{} ({:.0}%)", sp.common_name, sp.confidence * 100.0))
                .unwrap_or_default();
            let flags = meta
                .archaeology_flags
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let top_keywords = meta
                .keywords
                .iter()
                .take(ANALYSIS_KEYWORDS)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");

            let habitat_confidence = meta.habitat_confidence.to_string();
            let species_count = meta.species_candidates.len().to_string();
            let keywords_count = meta.keywords.len().to_string();
            let row: [&str; 13] = [
                entry.id(),
                &meta.original_filename,
                entry.project.as_str(),
                &entry.timestamp,
                &meta.title,
                &meta.description_short,
                &meta.habitat_guess,
                &habitat_confidence,
                &species_count,
                &top_species,
                &flags,
                &keywords_count,
                &top_keywords,
            ];
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(self.entries.len())
    }
}

/// Write entries as a new JSONL manifest.
pub fn export_filtered(entries: &[&ManifestEntry], output: &Path) -> Result<usize, ReportError> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(output)?);
    for entry in entries {
        serde_json::to_writer(&mut file, entry)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;
    Ok(entries.len())
}

/// Top `n` by count; ties broken alphabetically.
fn most_common(counts: HashMap<&str, usize>, n: usize) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}
