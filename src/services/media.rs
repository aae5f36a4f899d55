use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Seam to the external media store. The core only needs "take these
/// bytes, give me back a stable reference"; the real upload relay lives
/// behind this trait.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store a blob and return its public reference, or fail — callers
    /// treat failure as an upstream dependency error.
    async fn store(&self, original_name: &str, bytes: &[u8]) -> Result<String>;
}

/// Disk-backed media store: files land under the configured directory
/// with generated names and are served back under `/media/`.
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(&self, original_name: &str, bytes: &[u8]) -> Result<String> {
        let extension = std::path::Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_lowercase();

        let name = format!("{}.{extension}", uuid::Uuid::new_v4());

        tokio::fs::create_dir_all(&self.root)
            .await
            .context("Failed to create media storage directory")?;

        tokio::fs::write(self.root.join(&name), bytes)
            .await
            .context("Failed to write media file")?;

        Ok(format!("/media/{name}"))
    }
}
