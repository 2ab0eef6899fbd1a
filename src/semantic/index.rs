//! Brute-force cosine similarity over stored chunk vectors.

use rayon::prelude::*;
use std::collections::HashMap;

use crate::{eid::Eid, store::ChunkVector};

/// Best-matching chunk of one bookmark.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub bookmark_id: Eid,
    /// Cosine similarity of the best chunk (1 - cosine distance)
    pub score: f64,
    pub chunk_index: usize,
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity; zero-norm vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm = l2_norm(a) * l2_norm(b);
    if norm < f32::EPSILON {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / norm
}

/// Scores every chunk against `query`, keeps each bookmark's best chunk and
/// returns the top `limit` bookmarks, best first. Chunks whose dimension
/// differs from the query (another model) are skipped.
pub fn rank_chunks(query: &[f32], chunks: &[ChunkVector], limit: usize) -> Vec<SemanticHit> {
    let scored: Vec<(usize, f32)> = chunks
        .par_iter()
        .enumerate()
        .filter(|(_, chunk)| chunk.vector.len() == query.len())
        .map(|(i, chunk)| (i, cosine_similarity(query, &chunk.vector)))
        .collect();

    let skipped = chunks.len() - scored.len();
    if skipped > 0 {
        log::debug!("skipped {skipped} chunk vectors with mismatched dimensions");
    }

    let mut best: HashMap<&Eid, SemanticHit> = HashMap::new();
    for (i, score) in scored {
        let chunk = &chunks[i];
        let score = score as f64;
        best.entry(&chunk.bookmark_id)
            .and_modify(|hit| {
                if score > hit.score {
                    hit.score = score;
                    hit.chunk_index = chunk.chunk_index;
                }
            })
            .or_insert_with(|| SemanticHit {
                bookmark_id: chunk.bookmark_id.clone(),
                score,
                chunk_index: chunk.chunk_index,
            });
    }

    let mut hits: Vec<SemanticHit> = best.into_values().collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.bookmark_id.cmp(&b.bookmark_id))
    });
    hits.truncate(limit);
    hits
}
