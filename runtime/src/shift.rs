//! Layer shifting: graft the donor's newest layer onto the base image.
//!
//! The donor is the image committed from the extension container. It holds
//! every base layer plus exactly one new layer on top; only that top layer
//! is carried over, so the extended image keeps the base's history and
//! configuration.

use std::sync::Arc;

use extender_core::error::{GraftError, Result};

use crate::image::{extended_tag, Image, ImageStore};

/// History entry recorded for the grafted layer.
const CREATED_BY: &str = "image-extend: shifted extension layer";

/// Pure graft: `base` plus the top layer of `donor`.
pub fn graft(donor: &Image, base: &Image) -> std::result::Result<Image, GraftError> {
    let top = donor.top_layer().ok_or(GraftError::NoLayers)?;
    Ok(base.append_layer(top.clone(), CREATED_BY))
}

/// Moves the newest layer of a donor image onto a base image and writes
/// the result to an image store.
pub struct LayerShifter {
    store: Arc<dyn ImageStore>,
    suffix: String,
}

impl LayerShifter {
    pub fn new(store: Arc<dyn ImageStore>, suffix: impl Into<String>) -> Self {
        Self {
            store,
            suffix: suffix.into(),
        }
    }

    /// Graft and write under the extended tag derived from the base name.
    pub async fn shift(&self, donor: &Image, base: &Image) -> Result<String> {
        let tag = extended_tag(&base.reference, &self.suffix)?;
        let extended = graft(donor, base)?;

        tracing::debug!(
            donor = %donor.reference,
            base = %base.reference,
            tag = %tag,
            layers = extended.layers.len(),
            "Grafting extension layer"
        );
        self.store.write(&tag, &extended).await
    }

    /// Resolve both images by name, then [`shift`](Self::shift).
    pub async fn shift_references(&self, donor_ref: &str, base_ref: &str) -> Result<String> {
        let donor = self.store.resolve(donor_ref).await?;
        let base = self.store.resolve(base_ref).await?;
        self.shift(&donor, &base).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Layer;
    use std::path::PathBuf;

    fn image(reference: &str, ids: &[&str]) -> Image {
        Image {
            reference: reference.to_string(),
            config: serde_json::json!({
                "architecture": "amd64",
                "os": "linux",
                "config": { "Env": ["CNB_STACK_ID=bionic"] },
                "rootfs": { "type": "layers", "diff_ids": ids },
            }),
            layers: ids
                .iter()
                .map(|id| Layer {
                    diff_id: id.to_string(),
                    path: PathBuf::from(format!("/scratch/{}", id)),
                })
                .collect(),
        }
    }

    #[test]
    fn test_graft_appends_only_top_layer() {
        let base = image("base:1", &["sha256:a", "sha256:b"]);
        let donor = image("donor", &["sha256:a", "sha256:b", "sha256:c"]);

        let extended = graft(&donor, &base).unwrap();
        assert_eq!(extended.layers.len(), 3);
        assert_eq!(extended.layers[..2], base.layers[..]);
        assert_eq!(extended.top_layer().unwrap().diff_id, "sha256:c");
        assert_eq!(extended.config["config"], base.config["config"]);
    }

    #[test]
    fn test_graft_zero_layer_donor() {
        let base = image("base:1", &["sha256:a"]);
        let donor = image("donor", &[]);
        assert!(matches!(graft(&donor, &base), Err(GraftError::NoLayers)));
    }

    #[test]
    fn test_graft_onto_empty_base() {
        let base = image("scratch", &[]);
        let donor = image("donor", &["sha256:z"]);
        let extended = graft(&donor, &base).unwrap();
        assert_eq!(extended.diff_ids(), vec!["sha256:z"]);
    }
}
