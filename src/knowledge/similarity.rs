//! Cosine distance and deterministic ranking

use crate::types::{KnowledgeEntry, ScoredEntry};
use std::cmp::Ordering;

/// Compute the cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Cosine distance in [0, 2]: `1 - similarity`
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

/// Ascending distance, ties broken by ascending entry id
pub fn compare_scored(a: &ScoredEntry, b: &ScoredEntry) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.entry.id.cmp(&b.entry.id))
}

/// Score candidates against the query and keep the `limit` nearest
pub fn rank<'a, I>(query: &[f32], candidates: I, limit: usize) -> Vec<ScoredEntry>
where
    I: IntoIterator<Item = &'a KnowledgeEntry>,
{
    let mut scored: Vec<ScoredEntry> = candidates
        .into_iter()
        .filter_map(|entry| {
            entry.embedding.as_ref().map(|embedding| ScoredEntry {
                distance: cosine_distance(query, embedding),
                entry: entry.clone(),
            })
        })
        .collect();

    scored.sort_by(compare_scored);
    scored.truncate(limit);
    scored
}
