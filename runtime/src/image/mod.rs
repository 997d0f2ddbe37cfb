//! Content-addressed image model and the image store contract.
//!
//! An [`Image`] is an ordered list of layers (bottom to top) plus the raw
//! configuration document. The configuration is kept as JSON rather than a
//! typed struct so that fields this crate does not know about survive a
//! resolve → write round trip unchanged.

pub mod archive;
pub mod daemon;
pub mod reference;

use std::path::PathBuf;

use async_trait::async_trait;
use extender_core::error::Result;

pub use daemon::DaemonImageStore;
pub use reference::{extended_tag, ImageName};

/// One filesystem layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Digest of the uncompressed layer tar (e.g., "sha256:abc123...")
    pub diff_id: String,
    /// Path to the layer tar on disk
    pub path: PathBuf,
}

/// An image resolved from a store.
#[derive(Debug, Clone)]
pub struct Image {
    /// Name the image was resolved by
    pub reference: String,
    /// Raw image configuration document
    pub config: serde_json::Value,
    /// Layers in order, bottom to top
    pub layers: Vec<Layer>,
}

impl Image {
    /// The most recently added layer.
    pub fn top_layer(&self) -> Option<&Layer> {
        self.layers.last()
    }

    /// Return a copy of this image with `layer` stacked on top.
    ///
    /// The layer's diff id is appended to `rootfs.diff_ids` and a history
    /// record is added; every other configuration field is kept as is.
    pub fn append_layer(&self, layer: Layer, created_by: &str) -> Image {
        let mut config = self.config.clone();
        if !config.is_object() {
            config = serde_json::json!({});
        }

        let rootfs = &mut config["rootfs"];
        if !rootfs.is_object() {
            *rootfs = serde_json::json!({ "type": "layers", "diff_ids": [] });
        }
        match rootfs["diff_ids"].as_array_mut() {
            Some(ids) => ids.push(serde_json::json!(layer.diff_id)),
            None => rootfs["diff_ids"] = serde_json::json!([layer.diff_id]),
        }

        let entry = serde_json::json!({
            "created": chrono::Utc::now().to_rfc3339(),
            "created_by": created_by,
        });
        match config["history"].as_array_mut() {
            Some(history) => history.push(entry),
            None => config["history"] = serde_json::json!([entry]),
        }

        let mut layers = self.layers.clone();
        layers.push(layer);

        Image {
            reference: self.reference.clone(),
            config,
            layers,
        }
    }

    /// Layer digests listed in the configuration.
    pub fn diff_ids(&self) -> Vec<String> {
        self.config["rootfs"]["diff_ids"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Where images are resolved from and written to.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Resolve a name to an image with its layers.
    async fn resolve(&self, reference: &str) -> Result<Image>;

    /// Write `image` under `tag`, returning the written reference.
    async fn write(&self, tag: &str, image: &Image) -> Result<String>;
}
