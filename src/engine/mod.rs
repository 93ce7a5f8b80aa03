pub mod docling;
pub mod process;
pub mod types;

use anyhow::Result;

pub use types::{ConvertError, ConvertIn, ConvertOut, DocDiag};

/// The document-to-Markdown converter the batch is driven through.
pub trait Engine {
    fn doctor(&self) -> Result<DocDiag>;
    fn convert(&self, req: &ConvertIn) -> std::result::Result<ConvertOut, ConvertError>;
}

impl<E: Engine + ?Sized> Engine for &E {
    fn doctor(&self) -> Result<DocDiag> {
        (**self).doctor()
    }

    fn convert(&self, req: &ConvertIn) -> std::result::Result<ConvertOut, ConvertError> {
        (**self).convert(req)
    }
}
