use crate::chunk_plan::{chunk_file_name, ChunkPlan};
use crate::util::file_stem;
use anyhow::{bail, Context, Result};
use lopdf::Document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitChunk {
    pub chunk_index: u32,
    pub start_page: u32,
    pub end_page: u32,
    pub path: PathBuf,
}

pub fn page_count(input: &Path) -> Result<u32> {
    Ok(page_count_of(&load_pdf(input)?))
}

pub fn page_count_of(doc: &Document) -> u32 {
    doc.get_pages().len() as u32
}

pub fn load_pdf(input: &Path) -> Result<Document> {
    Document::load(input).with_context(|| format!("loading PDF: {}", input.display()))
}

/// Loads `input` and writes one PDF per range of `plan` into `out_dir`.
pub fn split_pdf(input: &Path, out_dir: &Path, plan: &ChunkPlan) -> Result<Vec<SplitChunk>> {
    let source = load_pdf(input)?;
    split_document(&source, &file_stem(input), out_dir, plan)
        .with_context(|| format!("splitting {}", input.display()))
}

/// Writes one PDF per range of `plan` into `out_dir`, named `<stem>_chunk_<n>.pdf`.
///
/// All-or-nothing: if any chunk cannot be written, the chunks already on disk
/// are removed before the error is returned.
pub fn split_document(
    source: &Document,
    stem: &str,
    out_dir: &Path,
    plan: &ChunkPlan,
) -> Result<Vec<SplitChunk>> {
    if plan.is_empty() {
        bail!("empty chunk plan for {stem}");
    }

    let pages: Vec<u32> = source.get_pages().keys().copied().collect();
    if pages.is_empty() {
        bail!("PDF has zero pages: {stem}");
    }
    if let Some((i, range)) = plan
        .chunks
        .iter()
        .enumerate()
        .find(|(_, r)| r.end_page as usize > pages.len())
    {
        bail!(
            "chunk {} ends at page {} but {} has {} pages",
            i,
            range.end_page,
            stem,
            pages.len()
        );
    }

    let mut outputs = Vec::with_capacity(plan.chunks.len());
    match write_chunks(source, &pages, stem, out_dir, plan, &mut outputs) {
        Ok(()) => Ok(outputs),
        Err(err) => {
            for chunk in &outputs {
                if let Err(e) = std::fs::remove_file(&chunk.path) {
                    warn!("could not delete chunk {}: {e}", chunk.path.display());
                }
            }
            Err(err)
        }
    }
}

fn write_chunks(
    source: &Document,
    pages: &[u32],
    stem: &str,
    out_dir: &Path,
    plan: &ChunkPlan,
    outputs: &mut Vec<SplitChunk>,
) -> Result<()> {
    let total = plan.chunks.len();
    for (i, range) in plan.chunks.iter().enumerate() {
        let mut doc = source.clone();
        let drop: Vec<u32> = pages
            .iter()
            .copied()
            .filter(|p| !range.contains(*p))
            .collect();
        doc.delete_pages(&drop);
        doc.prune_objects();

        let path = out_dir.join(chunk_file_name(stem, i, total));
        doc.save(&path)
            .with_context(|| format!("writing chunk PDF: {}", path.display()))?;
        debug!(
            "split chunk {} pages {}-{} -> {}",
            i,
            range.start_page,
            range.end_page,
            path.display()
        );

        outputs.push(SplitChunk {
            chunk_index: i as u32,
            start_page: range.start_page,
            end_page: range.end_page,
            path,
        });
    }
    Ok(())
}
