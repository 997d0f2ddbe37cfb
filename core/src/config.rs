use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::log::RelayMode;

/// Placeholder substituted by the random namer in name templates.
pub const NAME_PLACEHOLDER: &str = "%s";

/// Placeholder substituted with the extension kind in name templates.
pub const KIND_PLACEHOLDER: &str = "{kind}";

/// Image extension configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendConfig {
    /// Root of the extension convention inside the base image
    /// (each kind lives in `<extend_root>/<kind>/`)
    pub extend_root: PathBuf,

    /// User the extension container runs as
    pub container_user: String,

    /// Length of the random suffix in scratch names
    pub name_length: usize,

    /// Template for the scratch container name
    pub container_name_template: String,

    /// Template for the donor image committed from the container
    pub commit_name_template: String,

    /// Suffix appended to the base tag for the extended image
    pub extended_suffix: String,

    /// How the container log stream is relayed
    pub relay: RelayMode,

    /// Certificate path conventions
    pub certs: CertConventions,

    /// Default log level when `RUST_LOG` is unset
    pub log_level: LogLevel,
}

impl Default for ExtendConfig {
    fn default() -> Self {
        Self {
            extend_root: PathBuf::from("/cnb/image"),
            container_user: "0".to_string(),
            name_length: 10,
            container_name_template: "pack.local-extend-{kind}-%s".to_string(),
            commit_name_template: "pack.local/extend/commit/{kind}/%s".to_string(),
            extended_suffix: "-extended".to_string(),
            relay: RelayMode::Demux,
            certs: CertConventions::default(),
            log_level: LogLevel::Warn,
        }
    }
}

impl ExtendConfig {
    /// Directory holding the extension binary and its config for `kind`.
    pub fn kind_dir(&self, kind: &str) -> PathBuf {
        self.extend_root.join(kind)
    }

    /// Path of the extension binary for `kind`.
    pub fn extend_binary(&self, kind: &str) -> PathBuf {
        self.kind_dir(kind).join("extend")
    }

    /// Path of the extension's `extend.toml` for `kind`.
    pub fn extend_config_path(&self, kind: &str) -> PathBuf {
        self.kind_dir(kind).join("extend.toml")
    }

    /// Name template for the scratch container, with the kind filled in.
    pub fn container_template(&self, kind: &str) -> String {
        self.container_name_template.replace(KIND_PLACEHOLDER, kind)
    }

    /// Name template for the donor image, with the kind filled in.
    pub fn commit_template(&self, kind: &str) -> String {
        self.commit_name_template.replace(KIND_PLACEHOLDER, kind)
    }
}

/// Prefix and separator conventions for certificate path lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertConventions {
    /// Marks a path as build-only
    pub build_prefix: String,

    /// Marks a path as run-only
    pub run_prefix: String,

    /// Splits a single combined argument into several paths
    pub separator: char,
}

impl Default for CertConventions {
    fn default() -> Self {
        Self {
            build_prefix: "build:".to_string(),
            run_prefix: "run:".to_string(),
            separator: ',',
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!(
                "unknown log level: '{}' (supported: debug, info, warn, error)",
                s
            )),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
