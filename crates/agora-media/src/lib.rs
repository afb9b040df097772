//! Uploaded files: what kind they are, whether they fit, how they are
//! shrunk, and where they live on disk.

pub mod classify;
pub mod compress;
pub mod storage;

use thiserror::Error;

pub use classify::{FileKind, check_size, classify, is_message_attachment, mime_type};
pub use compress::{CompressionSettings, Processed, compress_image, compress_video, process_upload};
pub use storage::Storage;

#[derive(Debug, Error)]
pub enum MediaError {
    /// Rendered to clients as a validation message.
    #[error("{kind} file size must be less than {limit_mb}MB")]
    TooLarge { kind: &'static str, limit_mb: u64 },

    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MediaError>;
