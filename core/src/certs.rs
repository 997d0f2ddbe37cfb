//! Certificate path classification.
//!
//! A certificate path prefixed with `build:` is only trusted while building,
//! one prefixed with `run:` only in the run image, and an unprefixed path in
//! both. Classification does no I/O; [`CertConfig::read_contents`] loads the
//! files when the caller wants their contents up front.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::CertConventions;
use crate::error::{ExtendError, Result};

/// Certificate paths split into build-time and run-time sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertConfig {
    pub build: Vec<String>,
    pub run: Vec<String>,
}

/// Certificate file contents, in the same order as the paths they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertContents {
    pub build: Vec<String>,
    pub run: Vec<String>,
}

impl CertConfig {
    /// Classify `paths` into build and run sets.
    ///
    /// A single element containing the separator is split first, so
    /// `["build:/a.crt,/b.crt"]` behaves like `["build:/a.crt", "/b.crt"]`.
    pub fn classify<S: AsRef<str>>(paths: &[S], conventions: &CertConventions) -> Self {
        let mut cfg = CertConfig::default();

        let split: Vec<&str> = match paths {
            [single] if single.as_ref().contains(conventions.separator) => {
                single.as_ref().split(conventions.separator).collect()
            }
            _ => paths.iter().map(|p| p.as_ref()).collect(),
        };

        for path in split {
            if let Some(rest) = path.strip_prefix(conventions.build_prefix.as_str()) {
                cfg.build.push(rest.to_string());
            } else if let Some(rest) = path.strip_prefix(conventions.run_prefix.as_str()) {
                cfg.run.push(rest.to_string());
            } else {
                cfg.build.push(path.to_string());
                cfg.run.push(path.to_string());
            }
        }

        cfg
    }

    /// Read every classified certificate from disk.
    ///
    /// Relative paths resolve against the current directory. The first
    /// unreadable file aborts with [`ExtendError::CertRead`].
    pub fn read_contents(&self) -> Result<CertContents> {
        let cwd = std::env::current_dir()?;
        Ok(CertContents {
            build: read_all(&cwd, &self.build)?,
            run: read_all(&cwd, &self.run)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.build.is_empty() && self.run.is_empty()
    }
}

fn read_all(cwd: &Path, paths: &[String]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|p| {
            let full = absolute(cwd, p);
            std::fs::read_to_string(&full).map_err(|source| ExtendError::CertRead {
                path: full,
                source,
            })
        })
        .collect()
}

fn absolute(cwd: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
