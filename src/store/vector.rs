//! Embedding vector codec and bounded top-k selection.
//!
//! Vectors are persisted as concatenated IEEE-754 float32 little-endian
//! blobs. Search streams every candidate through a min-heap of size k, so
//! memory stays O(k) regardless of corpus size.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Result, SemIndexError};

/// Encode a vector as a little-endian f32 blob.
pub fn encode_vector(vec: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode a little-endian f32 blob back into a vector.
/// Rejects blobs whose length is not a multiple of 4.
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(SemIndexError::Other(format!(
            "corrupt embedding blob: {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }
    let mut out = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(out)
}

/// Cosine similarity between two vectors of equal length.
/// Returns `None` when either norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Entry held in the top-k heap. Ordered ascending by score so the heap
/// root is always the weakest survivor.
struct HeapEntry<T> {
    score: f32,
    item: T,
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}
impl<T> Eq for HeapEntry<T> {}

impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse: BinaryHeap is a max-heap, we need the minimum at the root
        other.score.total_cmp(&self.score)
    }
}
impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Streaming top-k selector keyed by similarity.
///
/// Push every candidate; when full, a new candidate replaces the current
/// minimum only if its score is strictly greater. Ties keep the earlier
/// insertion.
pub struct TopK<T> {
    k: usize,
    heap: BinaryHeap<HeapEntry<T>>,
}

impl<T> TopK<T> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    pub fn push(&mut self, score: f32, item: T) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(HeapEntry { score, item });
            return;
        }
        if let Some(min) = self.heap.peek() {
            if score > min.score {
                self.heap.pop();
                self.heap.push(HeapEntry { score, item });
            }
        }
    }

    /// Drain into a vector sorted by score descending.
    pub fn into_sorted_vec(self) -> Vec<(T, f32)> {
        let mut entries: Vec<HeapEntry<T>> = self.heap.into_vec();
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        entries.into_iter().map(|e| (e.item, e.score)).collect()
    }
}
