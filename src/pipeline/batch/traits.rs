//! Seams between the batch driver and the outside world.
//!
//! - ImageSource: where image bytes come from (local folder, Drive)
//! - MetadataSink: where a finished record is durably written (XMP sidecar,
//!   Drive description)

use super::error::BatchError;
use super::types::SourceItem;
use crate::models::MetadataRecord;

/// Provides the bytes of an image for one item.
pub trait ImageSource {
    fn fetch(&self, item: &SourceItem) -> Result<Vec<u8>, BatchError>;
}

/// Durably records a finished `MetadataRecord`.
///
/// A failed commit is reported as `SinkWriteFailed`; the driver then leaves
/// the item out of the completion cache so it is retried on the next run.
pub trait MetadataSink {
    fn commit(&self, record: &MetadataRecord) -> Result<(), BatchError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "sink"
    }
}

