use crate::config::Config;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file_bytes: u64,
}

impl SourceFile {
    pub fn extension(&self) -> Option<String> {
        lower_extension(&self.path)
    }
}

fn lower_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}

pub fn is_supported(cfg: &Config, path: &Path) -> bool {
    match lower_extension(path) {
        Some(ext) => cfg
            .scan
            .extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

/// True for PDFs strictly larger than the split threshold.
pub fn needs_split(cfg: &Config, file: &SourceFile) -> bool {
    cfg.chunking.enabled
        && file.extension().as_deref() == Some("pdf")
        && file.file_bytes > cfg.chunking.split_threshold_bytes
}

/// Regular files directly inside `dir` with a supported extension, sorted by name.
pub fn scan_input_dir(cfg: &Config, dir: &Path) -> Result<Vec<SourceFile>> {
    if !dir.is_dir() {
        bail!("input folder not found: {}", dir.display());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read_dir entry in {}", dir.display()))?;
        let path = entry.path();
        // Follows symlinks; entries that cannot be stat'ed (dangling links) are skipped.
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) => {
                warn!("skipping {}: {err}", path.display());
                continue;
            }
        };
        if !meta.is_file() || !is_supported(cfg, &path) {
            continue;
        }
        files.push(SourceFile {
            path,
            file_bytes: meta.len(),
        });
    }

    files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(files)
}
