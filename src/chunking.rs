//! Fixed-size text chunking.
//!
//! Chunks are counted in characters (not bytes), never overlap, and
//! concatenate back to the input exactly.

/// Split `text` into consecutive chunks of at most `max_chunk_size` characters.
///
/// Empty input yields no chunks. A `max_chunk_size` of 0 is treated as 1.
pub fn split(text: &str, max_chunk_size: usize) -> Vec<String> {
    let max = max_chunk_size.max(1);
    let mut chunks = Vec::with_capacity(text.len() / max + 1);

    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max {
            chunks.push(text[start..idx].to_string());
            start = idx;
            count = 0;
        }
        count += 1;
    }

    if start < text.len() {
        chunks.push(text[start..].to_string());
    }

    chunks
}
