//! Embedding blob codec and cosine-similarity ranking.
//!
//! Blobs are a flat run of 32-bit floats in little-endian order, 4 bytes per
//! element, no header. The byte order is fixed so a database file moves
//! between machines unchanged.

use tasktree_common::{Error, Result};

/// Encode a vector as a little-endian `f32` blob.
pub fn vec_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a blob produced by [`vec_to_bytes`].
///
/// Fails if the blob length is not a multiple of 4.
pub fn bytes_to_vec(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Database(format!(
            "corrupt embedding blob: {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude or the lengths differ.
/// The result is clamped to [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON || !denom.is_finite() {
        return 0.0;
    }

    #[allow(clippy::cast_possible_truncation)]
    let score = (dot / denom).clamp(-1.0, 1.0) as f32;
    score
}

/// A candidate identity paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult<K = String> {
    pub id: K,
    pub score: f32,
}

/// Rank candidates by cosine similarity to `query`.
///
/// Candidates scoring below `threshold` are dropped, the rest are sorted by
/// descending score (ties keep candidate order) and cut to `top_k`.
pub fn rank_by_similarity<'a, K, I>(
    query: &[f32],
    candidates: I,
    top_k: usize,
    threshold: f32,
) -> Vec<ScoredResult<K>>
where
    I: IntoIterator<Item = (K, &'a [f32])>,
{
    let mut results: Vec<ScoredResult<K>> = candidates
        .into_iter()
        .filter_map(|(id, vector)| {
            let score = cosine_similarity(query, vector);
            (score >= threshold).then_some(ScoredResult { id, score })
        })
        .collect();

    // sort_by is stable
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(top_k);
    results
}
