//! Image name parsing and extended-tag derivation.
//!
//! Only the split the extender needs: repository, tag and digest. Registry
//! defaults are left to the engine.

use extender_core::error::{ExtendError, Result};

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// An image name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageName {
    /// Repository including any registry host (e.g., "localhost:5000/app")
    pub repository: String,
    /// Tag (e.g., "bionic")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageName {
    /// Parse an image name.
    ///
    /// Supports formats:
    /// - `app` → repository `app`, no tag
    /// - `app:1.0` → repository `app`, tag `1.0`
    /// - `localhost:5000/app` → the port is not mistaken for a tag
    /// - `app@sha256:abc...` → digest reference
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ExtendError::Input("Empty image reference".to_string()));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(ExtendError::Input(format!(
                        "Invalid digest format in reference '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A tag can only follow the last path component.
        let last_slash = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
        let (repository, tag) = match name_tag[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                (&name_tag[..split], Some(name_tag[split + 1..].to_string()))
            }
            None => (name_tag, None),
        };

        if repository.is_empty() || tag.as_deref() == Some("") {
            return Err(ExtendError::Input(format!(
                "Invalid image reference '{}'",
                reference
            )));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// The tag, or `latest` when none was given.
    pub fn tag_or_default(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }
}

impl std::fmt::Display for ImageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// Derive the tag the extended image is written under.
///
/// `app:bionic` → `app:bionic-extended`, `app` → `app:latest-extended`.
/// A digest pins content, not a name, so it is dropped.
pub fn extended_tag(base: &str, suffix: &str) -> Result<String> {
    let name = ImageName::parse(base)?;
    Ok(format!(
        "{}:{}{}",
        name.repository,
        name.tag_or_default(),
        suffix
    ))
}
