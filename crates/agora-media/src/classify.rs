use std::path::Path;

use crate::{MediaError, Result};

const MB: u64 = 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];
const FILE_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "xlsx", "csv"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Video,
    Audio,
    File,
    Document,
}

impl FileKind {
    pub fn max_bytes(self) -> u64 {
        match self {
            FileKind::Image => 10 * MB,
            FileKind::Video => 60 * MB,
            FileKind::File | FileKind::Document => 25 * MB,
            FileKind::Audio => 50 * MB,
        }
    }

    /// Capitalised name used in messages.
    pub fn label(self) -> &'static str {
        match self {
            FileKind::Image => "Image",
            FileKind::Video => "Video",
            FileKind::Audio => "Audio",
            FileKind::File => "File",
            FileKind::Document => "Document",
        }
    }

    /// Stored message type name.
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::File => "file",
            FileKind::Document => "document",
        }
    }
}

/// Lower-cased extension without the dot.
pub fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn classify(file_name: &str) -> FileKind {
    let Some(ext) = extension(file_name) else {
        return FileKind::Document;
    };
    let ext = ext.as_str();
    if IMAGE_EXTENSIONS.contains(&ext) {
        FileKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        FileKind::Video
    } else if FILE_EXTENSIONS.contains(&ext) {
        FileKind::File
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        FileKind::Audio
    } else {
        FileKind::Document
    }
}

/// Chat attachments are limited to images, videos and office files.
pub fn is_message_attachment(file_name: &str) -> bool {
    extension(file_name).is_some_and(|ext| {
        let ext = ext.as_str();
        IMAGE_EXTENSIONS.contains(&ext) || VIDEO_EXTENSIONS.contains(&ext) || FILE_EXTENSIONS.contains(&ext)
    })
}

pub fn check_size(kind: FileKind, size: u64) -> Result<()> {
    if size > kind.max_bytes() {
        return Err(MediaError::TooLarge {
            kind: kind.label(),
            limit_mb: kind.max_bytes() / MB,
        });
    }
    Ok(())
}

pub fn mime_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_by_extension() {
        assert_eq!(classify("rig.JPG"), FileKind::Image);
        assert_eq!(classify("walkthrough.mov"), FileKind::Video);
        assert_eq!(classify("invoice.pdf"), FileKind::File);
        assert_eq!(classify("memo.m4a"), FileKind::Audio);
        assert_eq!(classify("archive.zip"), FileKind::Document);
        assert_eq!(classify("README"), FileKind::Document);
    }

    #[test]
    fn attachments_exclude_audio_and_unknown() {
        assert!(is_message_attachment("a.png"));
        assert!(is_message_attachment("a.csv"));
        assert!(!is_message_attachment("a.mp3"));
        assert!(!is_message_attachment("a.zip"));
    }

    #[test]
    fn size_limit_message() {
        assert!(check_size(FileKind::Image, 10 * MB).is_ok());
        let err = check_size(FileKind::Image, 10 * MB + 1).unwrap_err();
        assert_eq!(err.to_string(), "Image file size must be less than 10MB");
        let err = check_size(FileKind::Video, 61 * MB).unwrap_err();
        assert_eq!(err.to_string(), "Video file size must be less than 60MB");
        assert!(check_size(FileKind::Audio, 40 * MB).is_ok());
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_type("a.png"), "image/png");
        assert_eq!(mime_type("a.unknownext"), "application/octet-stream");
    }
}
