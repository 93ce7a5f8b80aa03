#![allow(dead_code)]

use docling_batch::engine::{ConvertError, ConvertIn, ConvertOut, DocDiag, Engine};
use docling_batch::util::file_stem;
use lopdf::{dictionary, Document, Object, Stream};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Writes a minimal PDF with `pages` blank pages, each carrying its page number.
pub fn write_pdf(path: &Path, pages: u32) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::new();
    for n in 1..=pages {
        let content = format!("BT /F1 12 Tf 72 720 Td (page {n}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save test pdf");
}

/// Engine double: fails for inputs whose stem contains a configured marker,
/// otherwise returns a small Markdown body naming the input.
#[derive(Default)]
pub struct FakeEngine {
    pub calls: RefCell<Vec<PathBuf>>,
    pub failures: Vec<(String, ConvertError)>,
    /// Page count of each PDF input at the time it was converted.
    pub pdf_pages: RefCell<Vec<u32>>,
    /// Raised after converting an input whose stem contains the marker.
    pub interrupt_after: Option<(String, Arc<AtomicBool>)>,
}

impl FakeEngine {
    pub fn failing(marker: &str, err: ConvertError) -> Self {
        Self {
            failures: vec![(marker.to_string(), err)],
            ..Default::default()
        }
    }
}

impl Engine for FakeEngine {
    fn doctor(&self) -> anyhow::Result<DocDiag> {
        Ok(DocDiag {
            docling_exe: "fake".into(),
            docling_version: Some("2.0.0".into()),
            ok: true,
            error: None,
        })
    }

    fn convert(&self, req: &ConvertIn) -> Result<ConvertOut, ConvertError> {
        self.calls.borrow_mut().push(req.input.clone());
        if req.input.extension().and_then(|e| e.to_str()) == Some("pdf") {
            let pages = docling_batch::split::page_count(&req.input).unwrap_or(0);
            self.pdf_pages.borrow_mut().push(pages);
        }
        let stem = file_stem(&req.input);
        if let Some((marker, flag)) = &self.interrupt_after {
            if stem.contains(marker.as_str()) {
                flag.store(true, Ordering::SeqCst);
            }
        }
        for (marker, err) in &self.failures {
            if stem.contains(marker.as_str()) {
                return Err(err.clone());
            }
        }
        Ok(ConvertOut {
            markdown: format!("converted {stem}"),
            elapsed_ms: 1,
            warnings: Vec::new(),
        })
    }
}
