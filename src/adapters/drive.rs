//! Google Drive v3: folder listing, downloads and description updates.
//!
//! Authentication is out of scope here; the client is handed a ready OAuth
//! bearer token.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::describe::format_for_drive;
use crate::models::{MetadataRecord, SourceTag};
use crate::pipeline::batch::{BatchError, ImageSource, MetadataSink, SourceItem};
use crate::pipeline::extraction::ConfidenceThresholds;

pub const DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";

/// Image MIME types listed from a folder.
const IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/tiff"];

const LIST_FIELDS: &str = "nextPageToken, files(id, name, description, mimeType, createdTime)";

/// Files whose description is already at least this long are left alone.
pub const DEFAULT_MIN_DESCRIPTION_LEN: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Drive API returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Drive request failed: {0}")]
    Network(String),

    #[error("Could not decode Drive response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub created_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

// ──────────────────────────────────────────────
// DriveClient
// ──────────────────────────────────────────────

pub struct DriveClient {
    base_url: String,
    token: String,
    page_size: u32,
    client: reqwest::blocking::Client,
}

impl DriveClient {
    pub fn new(token: &str, page_size: u32) -> Result<Self, DriveError> {
        Self::with_base_url(DRIVE_API_URL, token, page_size)
    }

    pub fn with_base_url(base_url: &str, token: &str, page_size: u32) -> Result<Self, DriveError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| DriveError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            page_size: page_size.max(1),
            client,
        })
    }

    /// Every JPEG/PNG/TIFF directly inside `folder_id`, following pagination.
    pub fn list_image_files(&self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        let url = format!("{}/files", self.base_url);
        let query = image_query(folder_id);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("q", query.clone()),
                ("fields", LIST_FIELDS.to_string()),
                ("pageSize", self.page_size.to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&params)
                .send()
                .map_err(|e| DriveError::Network(e.to_string()))?;
            let page: FileList = check_status(response)?
                .json()
                .map_err(|e| DriveError::Parse(e.to_string()))?;

            tracing::debug!(folder_id, page_files = page.files.len(), "Drive page listed");
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::info!(folder_id, found = files.len(), "Drive folder listed");
        Ok(files)
    }

    pub fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveError> {
        let url = format!("{}/files/{}", self.base_url, file_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .map_err(|e| DriveError::Network(e.to_string()))?;
        let bytes = check_status(response)?
            .bytes()
            .map_err(|e| DriveError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    pub fn update_description(&self, file_id: &str, description: &str) -> Result<(), DriveError> {
        let url = format!("{}/files/{}", self.base_url, file_id);
        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "description": description }))
            .send()
            .map_err(|e| DriveError::Network(e.to_string()))?;
        check_status(response)?;
        tracing::debug!(file_id, "Drive description updated");
        Ok(())
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_default();
    Err(DriveError::Http {
        status: status.as_u16(),
        message,
    })
}

/// Drive search query for image files directly inside a folder.
pub fn image_query(folder_id: &str) -> String {
    let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
    let mimes = IMAGE_MIME_TYPES
        .iter()
        .map(|m| format!("mimeType contains '{m}'"))
        .collect::<Vec<_>>()
        .join(" or ");
    format!("'{escaped}' in parents and ({mimes})")
}

/// Items worth processing: files without a rich description already.
/// Cache skipping is left to the batch driver.
pub fn select_for_processing(files: &[DriveFile], min_description_len: usize) -> Vec<SourceItem> {
    files
        .iter()
        .filter(|f| {
            let rich = f
                .description
                .as_deref()
                .is_some_and(|d| d.chars().count() >= min_description_len);
            if rich {
                tracing::debug!(file = %f.name, "Already has a rich description, skipping");
            }
            !rich
        })
        .map(|f| SourceItem::new(f.id.clone(), f.name.clone(), SourceTag::CloudStorage))
        .collect()
}

// ──────────────────────────────────────────────
// Batch adapters
// ──────────────────────────────────────────────

pub struct DriveSource<'a> {
    client: &'a DriveClient,
}

impl<'a> DriveSource<'a> {
    pub fn new(client: &'a DriveClient) -> Self {
        Self { client }
    }
}

impl ImageSource for DriveSource<'_> {
    fn fetch(&self, item: &SourceItem) -> Result<Vec<u8>, BatchError> {
        self.client
            .download(&item.id)
            .map_err(|e| BatchError::fetch(&item.id, e))
    }
}

/// Writes the formatted description back to the Drive file.
pub struct DriveDescriptionSink<'a> {
    client: &'a DriveClient,
    thresholds: ConfidenceThresholds,
}

impl<'a> DriveDescriptionSink<'a> {
    pub fn new(client: &'a DriveClient, thresholds: ConfidenceThresholds) -> Self {
        Self { client, thresholds }
    }
}

impl MetadataSink for DriveDescriptionSink<'_> {
    fn commit(&self, record: &MetadataRecord) -> Result<(), BatchError> {
        let description = format_for_drive(record, &self.thresholds);
        self.client
            .update_description(&record.file_id, &description)
            .map_err(|e| BatchError::SinkWriteFailed(e.to_string()))
    }

    fn name(&self) -> &str {
        "drive-description"
    }
}
