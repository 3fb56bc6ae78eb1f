//! Ingestion sources and metadata sinks plugged into the batch driver.

pub mod describe;
pub mod drive;
pub mod lightroom;
pub mod local;

pub use describe::{format_for_drive, format_for_xmp};
pub use drive::{DriveClient, DriveDescriptionSink, DriveError, DriveFile, DriveSource};
pub use lightroom::CatalogError;
pub use local::{LocalFileSource, XmpSidecarSink, RAW_EXTENSIONS};
