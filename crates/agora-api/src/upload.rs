use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;

use agora_media::{FileKind, check_size, classify};

use crate::error::ApiError;

pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn kind(&self) -> FileKind {
        classify(&self.file_name)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Rejects anything that is not an image within the image limit.
    pub fn require_image(&self) -> Result<(), ApiError> {
        if self.kind() != FileKind::Image {
            return Err(ApiError::Validation(format!(
                "{} is not a supported image (jpg, jpeg, png, gif, webp).",
                self.file_name
            )));
        }
        check_size(FileKind::Image, self.size())?;
        Ok(())
    }
}

/// A multipart body split into text fields and files.
#[derive(Default)]
pub struct Form {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl Form {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Form::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await.map_err(|e| ApiError::bad_request(e.body_text()))?;
                    if !bytes.is_empty() {
                        form.files.push(UploadedFile {
                            field: name,
                            file_name,
                            bytes,
                        });
                    }
                }
                None => {
                    let text = field.text().await.map_err(|e| ApiError::bad_request(e.body_text()))?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    /// Trimmed text of a field; blank counts as absent.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn files_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |f| f.field == name)
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == name)
    }
}
