//! Overlapping text chunker with a separator hierarchy.
//!
//! Splits document text into chunks of at most `chunk_size` bytes, cutting
//! at the coarsest separator available near the size limit: paragraph
//! break (`\n\n`), then line break (`\n`), then sentence end (`". "`),
//! then word boundary (`" "`), and finally a hard cut when a span has no
//! separator at all. Each chunk after the first re-reads `chunk_overlap`
//! bytes of the previous chunk's tail so that retrieval keeps semantic
//! continuity across boundaries.
//!
//! # Guarantees
//!
//! - Empty text produces no chunks (the ingestion pipeline treats this as
//!   an extraction failure).
//! - Text no longer than `chunk_size` produces exactly one chunk equal to
//!   the input.
//! - Adjacent chunks share at least `chunk_overlap` bytes; stripping each
//!   later chunk's leading overlap and concatenating reconstructs the
//!   original text.
//! - Cut points are snapped to UTF-8 char boundaries; a multi-byte char is
//!   never split.
//!
//! `chunk_overlap` must be strictly smaller than `chunk_size` (validated
//! by the config layer).

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Document};

/// Separators tried in order of coarseness. The separator stays attached
/// to the chunk on its left.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split `text` into overlapping chunks of at most `chunk_size` bytes.
pub fn split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    debug_assert!(chunk_overlap < chunk_size);

    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        if text.len() - start <= chunk_size {
            chunks.push(text[start..].to_string());
            break;
        }

        let mut window_end = floor_char_boundary(text, start + chunk_size);
        if window_end <= start + chunk_overlap {
            // Snapping back crossed into the overlap region (only possible
            // with multi-byte chars and near-degenerate sizes).
            window_end = ceil_char_boundary(text, start + chunk_size);
        }

        let end = best_cut(text, start, window_end, chunk_overlap).unwrap_or(window_end);
        chunks.push(text[start..end].to_string());

        let mut next = floor_char_boundary(text, end - chunk_overlap);
        if next <= start {
            // Progress guard: drop the overlap rather than stall.
            next = end;
        }
        start = next;
    }

    chunks
}

/// Find the cut point for a chunk starting at `start`, preferring the
/// coarsest separator whose last occurrence inside the window still lies
/// past the overlap region (so the next chunk makes progress).
fn best_cut(text: &str, start: usize, window_end: usize, chunk_overlap: usize) -> Option<usize> {
    let window = &text[start..window_end];
    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let cut = start + pos + sep.len();
            if cut > start + chunk_overlap {
                return Some(cut);
            }
        }
    }
    None
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Snap a byte index forward to the nearest valid UTF-8 char boundary.
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Chunk a document's extracted text into [`Chunk`]s with contiguous
/// indices, carrying the parent document's owner into every chunk.
pub fn chunk_document(
    doc: &Document,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    split(text, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(doc, i as i64, piece))
        .collect()
}

fn make_chunk(doc: &Document, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        document_id: doc.id.clone(),
        owner_user_id: doc.owner_user_id.clone(),
        chunk_index: index,
        text,
        hash,
    }
}
