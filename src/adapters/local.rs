//! Local RAW folders (the first-party archive) and the XMP sidecar sink.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::adapters::describe::format_for_xmp;
use crate::models::{MetadataRecord, SourceTag};
use crate::pipeline::batch::{BatchError, ImageSource, MetadataSink, SourceItem};
use crate::pipeline::extraction::ConfidenceThresholds;

/// Camera RAW extensions picked up by a folder scan (matched case-insensitively).
pub const RAW_EXTENSIONS: &[&str] = &["CR3", "CR2", "NEF", "ARW", "DNG", "RAF"];

/// Arguments passed to every exiftool write.
const EXIFTOOL_COMMON_ARGS: &[&str] = &["-overwrite_original", "-charset", "utf8", "-codedcharacterset=utf8"];

// ──────────────────────────────────────────────
// Folder scan
// ──────────────────────────────────────────────

/// List files in `folder` (not recursive) whose extension is in `extensions`,
/// sorted by path. The full path is the item id.
pub fn scan_folder(
    folder: &Path,
    extensions: &[&str],
    source: SourceTag,
) -> Result<Vec<SourceItem>, BatchError> {
    let entries = std::fs::read_dir(folder)
        .map_err(|e| BatchError::fetch(&folder.to_string_lossy(), e))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_extension(path, extensions))
        .collect();
    paths.sort();

    tracing::info!(folder = %folder.display(), found = paths.len(), "Folder scanned");

    Ok(paths.iter().map(|p| item_for_path(p, source)).collect())
}

pub fn item_for_path(path: &Path, source: SourceTag) -> SourceItem {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    SourceItem::new(path.to_string_lossy(), filename, source)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

// ──────────────────────────────────────────────
// LocalFileSource
// ──────────────────────────────────────────────

/// Reads the image bytes from the path stored in the item id.
pub struct LocalFileSource;

impl ImageSource for LocalFileSource {
    fn fetch(&self, item: &SourceItem) -> Result<Vec<u8>, BatchError> {
        std::fs::read(&item.id).map_err(|e| BatchError::fetch(&item.id, e))
    }
}

// ──────────────────────────────────────────────
// XmpSidecarSink
// ──────────────────────────────────────────────

/// Writes title, descriptions, keywords and habitat into XMP/IPTC via exiftool.
pub struct XmpSidecarSink {
    exiftool: PathBuf,
    thresholds: ConfidenceThresholds,
}

impl XmpSidecarSink {
    pub fn new(exiftool: impl Into<PathBuf>, thresholds: ConfidenceThresholds) -> Self {
        Self {
            exiftool: exiftool.into(),
            thresholds,
        }
    }
}

impl MetadataSink for XmpSidecarSink {
    fn commit(&self, record: &MetadataRecord) -> Result<(), BatchError> {
        let target = Path::new(&record.file_id);
        let args = build_exiftool_args(record, target, &self.thresholds);

        let output = Command::new(&self.exiftool)
            .args(&args)
            .output()
            .map_err(|e| {
                BatchError::SinkWriteFailed(format!("could not run {}: {e}", self.exiftool.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BatchError::SinkWriteFailed(format!(
                "exiftool exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let sidecar = sidecar_path(target);
        if sidecar.exists() {
            tracing::debug!(sidecar = %sidecar.display(), "XMP sidecar written");
        } else {
            tracing::debug!(file = %target.display(), "No sidecar found, metadata embedded in file");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "xmp-sidecar"
    }
}

/// `IMG_0001.CR3` -> `IMG_0001.CR3.xmp`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".xmp");
    PathBuf::from(name)
}

/// Full exiftool argument list (without the program name) for one record.
pub fn build_exiftool_args(
    record: &MetadataRecord,
    target: &Path,
    thresholds: &ConfidenceThresholds,
) -> Vec<String> {
    let mut args: Vec<String> = EXIFTOOL_COMMON_ARGS.iter().map(|a| a.to_string()).collect();

    args.push(format!("-XMP-dc:Title={}", record.title));
    args.push(format!("-XMP-dc:Description={}", format_for_xmp(record, thresholds)));
    args.push(format!("-IPTC:Caption-Abstract={}", record.description_short));
    args.push(format!("-IPTC:Headline={}", record.title));

    for kw in &record.keywords {
        args.push(format!("-XMP-dc:Subject+={kw}"));
        args.push(format!("-IPTC:Keywords+={kw}"));
    }

    args.push(format!("-XMP-acquaplan:Habitat={}", record.habitat_guess));
    args.push(format!("-XMP-acquaplan:HabitatConfidence={}", record.habitat_confidence));
    args.push(format!(
        "-XMP-acquaplan:ProcessingTimestamp={}",
        record.processing_timestamp.to_rfc3339()
    ));

    args.push(target.to_string_lossy().into_owned());
    args
}

/// `exiftool -ver`, used by `acquaplan verify`.
pub fn exiftool_version(exiftool: &Path) -> Result<String, std::io::Error> {
    let output = Command::new(exiftool).arg("-ver").output()?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(std::io::Error::other(format!("exiftool exited with {}", output.status)))
    }
}
