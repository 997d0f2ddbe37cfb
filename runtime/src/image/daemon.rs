//! Image store backed by the Docker daemon.
//!
//! Images are exported into a scratch directory owned by the store and read
//! from the saved archive; writes build a new archive from those files and
//! load it back. The scratch directory lives as long as the store.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use extender_core::error::{ExtendError, Result};
use tempfile::TempDir;

use super::{archive, Image, ImageStore};
use crate::engine::DockerEngine;

/// [`ImageStore`] that resolves and writes images through the daemon.
pub struct DaemonImageStore {
    engine: DockerEngine,
    scratch: TempDir,
    seq: AtomicUsize,
}

impl DaemonImageStore {
    pub fn new(engine: DockerEngine) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("image-extend-")
            .tempdir()
            .map_err(|e| {
                ExtendError::engine("resolve", format!("Failed to create scratch dir: {}", e))
            })?;
        Ok(Self {
            engine,
            scratch,
            seq: AtomicUsize::new(0),
        })
    }

    /// A fresh directory under the scratch root.
    fn next_dir(&self, label: &str) -> PathBuf {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        self.scratch.path().join(format!("{}-{}", label, n))
    }
}

#[async_trait]
impl ImageStore for DaemonImageStore {
    async fn resolve(&self, reference: &str) -> Result<Image> {
        let dir = self.next_dir("image");
        tokio::fs::create_dir_all(&dir).await?;
        let saved = dir.join("saved.tar");

        tracing::debug!(image = %reference, dir = %dir.display(), "Exporting image");
        self.engine.export_image(reference, &saved).await?;

        unpack_saved(saved, dir.join("rootfs"), reference.to_string()).await
    }

    async fn write(&self, tag: &str, image: &Image) -> Result<String> {
        let dir = self.next_dir("write");
        tokio::fs::create_dir_all(&dir).await?;
        let out = dir.join("image.tar");

        let owned = image.clone();
        let owned_tag = tag.to_string();
        let path = out.clone();
        tokio::task::spawn_blocking(move || archive::write_archive(&owned, &owned_tag, &path))
            .await
            .map_err(|e| ExtendError::engine("write", format!("Archive task failed: {}", e)))??;

        tracing::debug!(tag = %tag, layers = image.layers.len(), "Loading image");
        self.engine.load_image(&out).await?;
        let _ = tokio::fs::remove_file(&out).await;
        Ok(tag.to_string())
    }
}

/// Unpack an exported archive into `dest`, then drop the archive itself.
async fn unpack_saved(saved: PathBuf, dest: PathBuf, reference: String) -> Result<Image> {
    let archive_path = saved.clone();
    let image =
        tokio::task::spawn_blocking(move || archive::read_archive(&archive_path, &dest, &reference))
            .await
            .map_err(|e| ExtendError::engine("resolve", format!("Archive task failed: {}", e)))??;
    if let Err(e) = tokio::fs::remove_file(&saved).await {
        tracing::warn!(path = %saved.display(), error = %e, "Failed to remove exported archive");
    }
    Ok(image)
}
