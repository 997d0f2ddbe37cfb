//! Docker image archive (`docker save` format) reading and writing.
//!
//! ```text
//! manifest.json            [{"Config": ..., "RepoTags": [...], "Layers": [...]}]
//! <config-hex>.json        image configuration
//! <diff-id-hex>/layer.tar  uncompressed layer tars
//! ```
//!
//! Newer engines store config and layers under `blobs/sha256/` instead; the
//! reader follows whatever paths `manifest.json` names.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use extender_core::error::{ExtendError, GraftError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Image, Layer};

/// One entry of `manifest.json`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestEntry {
    config: String,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
    layers: Vec<String>,
}

/// Unpack an image archive into `dest` and load the image it holds.
///
/// When the archive holds several images, the one tagged `reference` wins,
/// falling back to the first entry.
pub fn read_archive(archive_path: &Path, dest: &Path, reference: &str) -> Result<Image> {
    let file = File::open(archive_path).map_err(|e| {
        ExtendError::engine(
            "resolve",
            format!("Failed to open image archive {}: {}", archive_path.display(), e),
        )
    })?;
    tar::Archive::new(file).unpack(dest).map_err(|e| {
        ExtendError::engine(
            "resolve",
            format!("Failed to unpack image archive to {}: {}", dest.display(), e),
        )
    })?;

    let manifest_path = dest.join("manifest.json");
    let data = std::fs::read(&manifest_path).map_err(|e| {
        ExtendError::engine("resolve", format!("Image archive has no manifest.json: {}", e))
    })?;
    let entries: Vec<ManifestEntry> = serde_json::from_slice(&data)?;

    let entry = entries
        .iter()
        .find(|e| {
            e.repo_tags
                .as_ref()
                .is_some_and(|tags| tags.iter().any(|t| t == reference))
        })
        .or_else(|| entries.first())
        .ok_or_else(|| {
            ExtendError::engine("resolve", format!("No image in archive for {}", reference))
        })?;

    let config_path = dest.join(&entry.config);
    let config: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&config_path).map_err(|e| {
            ExtendError::engine(
                "resolve",
                format!("Failed to read image config {}: {}", config_path.display(), e),
            )
        })?)?;

    let image = Image {
        reference: reference.to_string(),
        config,
        layers: Vec::new(),
    };
    let diff_ids = image.diff_ids();
    if diff_ids.len() != entry.layers.len() {
        return Err(ExtendError::engine(
            "resolve",
            format!(
                "Image {} lists {} diff ids for {} layers",
                reference,
                diff_ids.len(),
                entry.layers.len()
            ),
        ));
    }

    let layers = diff_ids
        .into_iter()
        .zip(&entry.layers)
        .map(|(diff_id, path)| Layer {
            diff_id,
            path: dest.join(path),
        })
        .collect();

    Ok(Image { layers, ..image })
}

/// Write `image` as a loadable archive at `out`, tagged `tag`.
pub fn write_archive(image: &Image, tag: &str, out: &Path) -> Result<()> {
    let file = File::create(out).map_err(|e| {
        GraftError::Write(format!("Failed to create archive {}: {}", out.display(), e))
    })?;
    let mut builder = tar::Builder::new(file);

    let config_bytes = serde_json::to_vec(&image.config)?;
    let config_name = format!("{}.json", hex::encode(Sha256::digest(&config_bytes)));
    append_bytes(&mut builder, &config_name, &config_bytes)?;

    let mut written = HashSet::new();
    let mut layer_names = Vec::with_capacity(image.layers.len());
    for layer in &image.layers {
        let hex = layer
            .diff_id
            .strip_prefix("sha256:")
            .unwrap_or(&layer.diff_id);
        let name = format!("{}/layer.tar", hex);
        if written.insert(name.clone()) {
            builder
                .append_path_with_name(&layer.path, &name)
                .map_err(|e| {
                    GraftError::Write(format!(
                        "Failed to add layer {} to archive: {}",
                        layer.path.display(),
                        e
                    ))
                })?;
        }
        layer_names.push(name);
    }

    let manifest = vec![ManifestEntry {
        config: config_name,
        repo_tags: Some(vec![tag.to_string()]),
        layers: layer_names,
    }];
    append_bytes(&mut builder, "manifest.json", &serde_json::to_vec(&manifest)?)?;

    builder
        .finish()
        .map_err(|e| GraftError::Write(format!("Failed to finalize archive: {}", e)))?;
    Ok(())
}

fn append_bytes(builder: &mut tar::Builder<File>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| GraftError::Write(format!("Failed to add {} to archive: {}", name, e)))?;
    Ok(())
}
