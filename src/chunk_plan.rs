use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub page_count: u32,
    pub pages_per_chunk: u32,
    pub chunks: Vec<PageRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start_page: u32, // 1-based inclusive
    pub end_page: u32,   // 1-based inclusive
}

impl PageRange {
    pub fn contains(&self, page: u32) -> bool {
        page >= self.start_page && page <= self.end_page
    }
}

impl ChunkPlan {
    pub fn single(page_count: u32) -> ChunkPlan {
        ChunkPlan {
            page_count,
            pages_per_chunk: page_count.max(1),
            chunks: vec![PageRange {
                start_page: 1,
                end_page: page_count.max(1),
            }],
        }
    }

    pub fn from_page_count(pages_per_chunk: u32, page_count: u32) -> ChunkPlan {
        let step = pages_per_chunk.max(1);

        let mut chunks = Vec::new();
        let mut p = 1u32;
        while p <= page_count {
            let end = p.saturating_add(step - 1).min(page_count);
            chunks.push(PageRange {
                start_page: p,
                end_page: end,
            });
            p = end + 1;
        }

        ChunkPlan {
            page_count,
            pages_per_chunk: step,
            chunks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// `<stem>_chunk_<n>.pdf`, 1-based, padded to the digit count of `total`
/// so that name order matches page order.
pub fn chunk_file_name(stem: &str, index: usize, total: usize) -> String {
    let width = total.max(1).to_string().len();
    format!("{stem}_chunk_{:0width$}.pdf", index + 1, width = width)
}
