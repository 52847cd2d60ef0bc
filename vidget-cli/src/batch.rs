use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::KindArg;
use crate::error::{AppError, Result};

/// One `[[job]]` entry of a batch manifest.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub url: String,
    pub output: PathBuf,
    #[serde(default)]
    pub kind: KindArg,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(rename = "job", default)]
    pub jobs: Vec<Job>,
}

impl Manifest {
    /// Read a manifest file. Relative outputs are taken relative to the manifest's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Manifest(format!("cannot read {}: {e}", path.display())))?;
        let mut manifest = Self::parse(&content)
            .map_err(|e| AppError::Manifest(format!("{}: {e}", path.display())))?;

        if let Some(base) = path.parent() {
            for job in &mut manifest.jobs {
                if job.output.is_relative() {
                    job.output = base.join(&job.output);
                }
            }
        }
        Ok(manifest)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
