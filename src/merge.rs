use crate::config::Config;
use crate::util::file_stem;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use unicode_normalization::UnicodeNormalization;

/// `*.md` files directly in `dir`, sorted by file name, excluding `exclude_name`.
pub fn markdown_files(dir: &Path, exclude_name: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read_dir entry in {}", dir.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some(exclude_name) {
            continue;
        }
        files.push(path);
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Concatenates every Markdown output into one document with a heading per file.
/// Returns the merged path, or `None` when there was nothing to merge.
pub fn merge_markdown_files(cfg: &Config, output_dir: &Path) -> Result<Option<PathBuf>> {
    let merged_name = &cfg.output.merged_filename;
    let files = markdown_files(output_dir, merged_name)?;
    if files.is_empty() {
        info!("no Markdown files found to merge in {}", output_dir.display());
        return Ok(None);
    }

    let merged_path = output_dir.join(merged_name);
    info!("merging {} Markdown files", files.len());

    let file = File::create(&merged_path)
        .with_context(|| format!("create merged file: {}", merged_path.display()))?;
    let mut w = BufWriter::new(file);
    for path in &files {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let content = normalize(cfg, raw);
        write!(w, "# Document: {}\n\n", file_stem(path))?;
        w.write_all(content.as_bytes())?;
        w.write_all(b"\n\n---\n\n")?;
    }
    w.flush()
        .with_context(|| format!("writing merged file: {}", merged_path.display()))?;

    info!("merged file saved as {}", merged_path.display());
    Ok(Some(merged_path))
}

fn normalize(cfg: &Config, mut s: String) -> String {
    if cfg.merge.normalize_newlines {
        s = s.replace("\r\n", "\n");
    }

    if cfg.merge.normalize_unicode {
        s = s.nfkc().collect::<String>();
    }

    if cfg.merge.trim_trailing_whitespace {
        s = s
            .lines()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
    }

    s
}
