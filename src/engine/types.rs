use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocDiag {
    pub docling_exe: String,
    pub docling_version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertIn {
    pub input: PathBuf,
    /// Resolved accelerator: cpu / cuda / mps, or auto to let docling pick.
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOut {
    pub markdown: String,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Why a single conversion attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvertError {
    /// The converter itself failed.
    #[error("{0}")]
    Conversion(String),
    #[error("{0}")]
    Timeout(String),
    /// Conversion ran but no Markdown could be exported from it.
    #[error("{0}")]
    Export(String),
}
