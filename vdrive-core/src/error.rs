//! Host-side error types.
//!
//! These cover failures the host sees while setting the drive up (mounting an
//! image, loading configuration). Errors the emulated DOS reports to the C64
//! live in [`crate::status`] and never leave the drive as a Rust error.

use thiserror::Error;

use crate::image::ImageType;

/// Errors that can occur outside the emulated DOS.
#[derive(Error, Debug)]
pub enum VdriveError {
    #[error("Unrecognized disk image ({0} bytes)")]
    UnknownFormat(u64),

    #[error("Truncated disk image header")]
    TruncatedHeader,

    #[error("Truncated error info block")]
    TruncatedErrorInfo,

    #[error("Invalid X64 track count: {0}")]
    InvalidTrackCount(u8),

    #[error("Unreadable BAM at track {0} sector {1}")]
    UnreadableBam(u8, u8),

    #[error("Cannot create blank {0:?} images")]
    UnsupportedImage(ImageType),

    #[error("Disk name too long: {0}")]
    NameTooLong(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for host-side operations.
pub type VdriveResult<T> = Result<T, VdriveError>;
