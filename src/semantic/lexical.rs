//! Lexical candidate post-processing for hybrid search.
//!
//! The store returns raw full-text scores whose scale depends on the corpus;
//! they are brought to `[0, 1]` by dividing by the best score of the
//! candidate set before the noise floor and fusion weights apply.

use crate::store::LexicalHit;

/// Divides every score by the set's maximum. Leaves the set untouched when
/// the maximum is not positive.
pub fn normalize_scores(hits: &mut [LexicalHit]) {
    let max = hits.iter().map(|h| h.score).fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return;
    }
    for hit in hits.iter_mut() {
        hit.score /= max;
    }
}

/// Lowercased whitespace-separated words, as used by the ranking boosts.
pub fn query_words(query: &str) -> Vec<String> {
    query.split_whitespace().map(|w| w.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eid::Eid;

    fn hit(id: &str, score: f64) -> LexicalHit {
        LexicalHit {
            bookmark_id: Eid::from(id),
            score,
            snippet: None,
        }
    }

    #[test]
    fn test_normalize_by_max() {
        let mut hits = vec![hit("a", 8.0), hit("b", 2.0), hit("c", 1.0)];
        normalize_scores(&mut hits);
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[1].score, 0.25);
        assert_eq!(hits[2].score, 0.125);
    }

    #[test]
    fn test_normalize_empty_and_non_positive() {
        let mut empty: Vec<LexicalHit> = vec![];
        normalize_scores(&mut empty);

        let mut hits = vec![hit("a", 0.0)];
        normalize_scores(&mut hits);
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn test_query_words() {
        assert_eq!(query_words("  Golang   TUTORIAL "), vec!["golang", "tutorial"]);
        assert!(query_words("   ").is_empty());
    }
}
