use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classify::extension;
use crate::{MediaError, Result};

/// Uploaded files on local disk, addressed by a name relative to the root
/// (`<folder>/<random>.<ext>`) and published under a URL prefix.
pub struct Storage {
    root: PathBuf,
    base_url: String,
}

impl Storage {
    pub async fn new(root: PathBuf, base_url: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("Media directory: {}", root.display());
        Ok(Self {
            root,
            base_url: base_url.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(MediaError::Unsupported(format!("path {}", name)));
        }
        Ok(self.root.join(relative))
    }

    /// Writes `bytes` under `folder` with a random name keeping the original
    /// extension. Returns the stored name.
    pub async fn save(&self, folder: &str, file_name: &str, bytes: &[u8]) -> Result<String> {
        let name = match extension(file_name) {
            Some(ext) => format!("{}/{}.{}", folder, Uuid::new_v4().simple(), ext),
            None => format!("{}/{}", folder, Uuid::new_v4().simple()),
        };
        let path = self.path(&name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(name)
    }

    /// Public URL of a stored name. Absolute URLs pass through.
    pub fn url(&self, name: &str) -> String {
        if name.starts_with("http://") || name.starts_with("https://") {
            return name.to_string();
        }
        format!("{}/{}", self.base_url.trim_end_matches('/'), name.trim_start_matches('/'))
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted media file {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media file {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_url_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), "/media/").await.unwrap();

        let name = storage.save("post_images", "Rig.PNG", b"png").await.unwrap();
        assert!(name.starts_with("post_images/"));
        assert!(name.ends_with(".png"));
        assert_eq!(fs::read(dir.path().join(&name)).await.unwrap(), b"png");
        assert_eq!(storage.url(&name), format!("/media/{}", name));

        storage.delete(&name).await.unwrap();
        storage.delete(&name).await.unwrap();
        assert!(!dir.path().join(&name).exists());
    }

    #[tokio::test]
    async fn escaping_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), "/media").await.unwrap();
        assert!(storage.delete("../etc/passwd").await.is_err());
        assert_eq!(storage.url("https://cdn.example.com/x.jpg"), "https://cdn.example.com/x.jpg");
    }
}
