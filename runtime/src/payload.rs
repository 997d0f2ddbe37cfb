//! Extension payload: the `extend.toml` document and its tar archive.

use std::path::Path;

use extender_core::error::{ExtendError, Result};
use serde::{Deserialize, Serialize};

/// File name the extension binary reads its configuration from.
pub const EXTEND_TOML: &str = "extend.toml";

/// Key-value configuration handed to the extension binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendToml {
    /// Certificate paths (or contents, when embedded) to install
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certs: Vec<String>,
}

impl ExtendToml {
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

/// Archive `doc` as a single `extend.toml` entry.
pub fn build_payload(doc: &ExtendToml) -> Result<Vec<u8>> {
    archive_bytes(doc.to_toml()?.as_bytes())
}

/// Archive an existing file under the name `extend.toml`.
pub fn payload_from_file(path: &Path) -> Result<Vec<u8>> {
    let data = std::fs::read(path).map_err(|e| {
        ExtendError::Input(format!(
            "Failed to read payload {}: {}",
            path.display(),
            e
        ))
    })?;
    archive_bytes(&data)
}

fn archive_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_cksum();
    builder.append_data(&mut header, EXTEND_TOML, data)?;
    Ok(builder.into_inner()?)
}
