//! Hybrid ranking: semantic and lexical candidates are boosted, weighted and
//! summed per bookmark.
//!
//! Boost precedence is fixed and part of the ranking contract:
//! - word boost: title (×1.5) over description (×1.3) over content (×1.2),
//!   first match only
//! - field boost: whole query in title (×3.0) over whole query in URL
//!   (×2.0) over title word overlap (×2.0 at ≥50%, ×1.5 at ≥25%)
//!
//! Boosted scores are not clipped back to `[0, 1]`; they only order results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{index::SemanticHit, lexical::query_words};
use crate::{
    config::SearchConfig,
    eid::Eid,
    store::{Bookmark, Content, LexicalHit},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Semantic,
    Keyword,
    Hybrid,
}

/// What the boosts look at for one bookmark.
pub struct Document<'a> {
    pub bookmark: &'a Bookmark,
    pub content: Option<&'a Content>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub bookmark_id: Eid,
    pub score: f64,
    pub search_type: SearchType,
    pub snippet: Option<String>,
}

/// ×1.5 if any query word occurs in the title, else ×1.3 for the
/// description, else ×1.2 for the content text.
pub fn word_boost(words: &[String], doc: &Document) -> f64 {
    if words.is_empty() {
        return 1.0;
    }

    let title = doc.bookmark.title.to_lowercase();
    if words.iter().any(|w| title.contains(w.as_str())) {
        return 1.5;
    }

    if !doc.bookmark.description.is_empty() {
        let description = doc.bookmark.description.to_lowercase();
        if words.iter().any(|w| description.contains(w.as_str())) {
            return 1.3;
        }
    }

    if let Some(content) = doc.content.filter(|c| !c.clean_text.is_empty()) {
        let text = content.clean_text.to_lowercase();
        if words.iter().any(|w| text.contains(w.as_str())) {
            return 1.2;
        }
    }

    1.0
}

/// ×3.0 if the whole query is in the title, else ×2.0 if it is in the URL,
/// else graduated by how many query words are title words.
pub fn field_boost(query: &str, doc: &Document) -> f64 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 1.0;
    }

    let title = doc.bookmark.title.to_lowercase();
    if title.contains(&query) {
        return 3.0;
    }
    if doc.bookmark.url.to_lowercase().contains(&query) {
        return 2.0;
    }

    let words = query_words(&query);
    let title_words = query_words(&title);
    let matches = words
        .iter()
        .filter(|w| title_words.iter().any(|t| t == *w))
        .count();
    if matches == 0 {
        return 1.0;
    }

    let ratio = matches as f64 / words.len() as f64;
    if ratio >= 0.5 {
        2.0
    } else if ratio >= 0.25 {
        1.5
    } else {
        1.0
    }
}

/// Fuses both candidate lists. `lexical` must already be normalized.
/// Candidates missing from `docs` (deleted meanwhile) are dropped. The
/// result is sorted best first, ties by bookmark id, and not truncated.
pub fn fuse(
    query: &str,
    semantic: &[SemanticHit],
    lexical: &[LexicalHit],
    docs: &HashMap<Eid, Document>,
    config: &SearchConfig,
) -> Vec<FusedHit> {
    let words = query_words(query);
    let boost = |doc: &Document| word_boost(&words, doc) * field_boost(query, doc);

    let mut fused: HashMap<Eid, FusedHit> = HashMap::new();

    for hit in semantic {
        if hit.score < config.semantic_threshold {
            continue;
        }
        let Some(doc) = docs.get(&hit.bookmark_id) else {
            continue;
        };
        fused.insert(
            hit.bookmark_id.clone(),
            FusedHit {
                bookmark_id: hit.bookmark_id.clone(),
                score: hit.score * config.semantic_weight * boost(doc),
                search_type: SearchType::Semantic,
                snippet: None,
            },
        );
    }

    for hit in lexical {
        if hit.score < config.lexical_threshold {
            continue;
        }
        let Some(doc) = docs.get(&hit.bookmark_id) else {
            continue;
        };
        let score = hit.score * config.lexical_weight * boost(doc);

        match fused.get_mut(&hit.bookmark_id) {
            Some(existing) => {
                existing.score += score;
                existing.search_type = SearchType::Hybrid;
                if hit.snippet.is_some() {
                    existing.snippet = hit.snippet.clone();
                }
            }
            None => {
                fused.insert(
                    hit.bookmark_id.clone(),
                    FusedHit {
                        bookmark_id: hit.bookmark_id.clone(),
                        score,
                        search_type: SearchType::Keyword,
                        snippet: hit.snippet.clone(),
                    },
                );
            }
        }
    }

    let mut results: Vec<FusedHit> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.bookmark_id.cmp(&b.bookmark_id))
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BookmarkStatus;
    use chrono::Utc;

    fn bookmark(id: &str, url: &str, title: &str, description: &str) -> Bookmark {
        let now = Utc::now();
        Bookmark {
            id: Eid::from(id),
            url: url.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            status: BookmarkStatus::Completed,
            folder_id: None,
            folder_path: String::new(),
            favicon_url: String::new(),
            tags: vec![],
            imported_at: now,
            created_at: now,
            updated_at: now,
            scraped_at: None,
        }
    }

    fn content(id: &str, text: &str) -> Content {
        Content {
            id: 1,
            bookmark_id: Eid::from(id),
            raw_content: String::new(),
            clean_text: text.to_string(),
            content_type: "text/html".to_string(),
            scraped_at: Utc::now(),
        }
    }

    fn words(q: &str) -> Vec<String> {
        query_words(q)
    }

    #[test]
    fn test_word_boost_precedence() {
        let b = bookmark("a", "https://x.dev", "Rust Guide", "all about rust");
        let c = content("a", "rust everywhere");
        let doc = Document {
            bookmark: &b,
            content: Some(&c),
        };
        // title wins, no stacking with description/content
        assert_eq!(word_boost(&words("rust"), &doc), 1.5);

        let b = bookmark("a", "https://x.dev", "Guide", "all about rust");
        let doc = Document {
            bookmark: &b,
            content: Some(&c),
        };
        assert_eq!(word_boost(&words("rust"), &doc), 1.3);

        let b = bookmark("a", "https://x.dev", "Guide", "");
        let doc = Document {
            bookmark: &b,
            content: Some(&c),
        };
        assert_eq!(word_boost(&words("rust"), &doc), 1.2);

        let doc = Document {
            bookmark: &b,
            content: None,
        };
        assert_eq!(word_boost(&words("rust"), &doc), 1.0);
    }

    #[test]
    fn test_field_boost_title_beats_url() {
        let b = bookmark("a", "https://rust-lang.org/rust guide", "The Rust Guide", "");
        let doc = Document {
            bookmark: &b,
            content: None,
        };
        assert_eq!(field_boost("rust guide", &doc), 3.0);
    }

    #[test]
    fn test_field_boost_url() {
        let b = bookmark("a", "https://golang.org/doc", "Documentation", "");
        let doc = Document {
            bookmark: &b,
            content: None,
        };
        assert_eq!(field_boost("golang", &doc), 2.0);
    }

    #[test]
    fn test_field_boost_word_overlap() {
        let b = bookmark("a", "https://example.com", "Go Tutorial for Beginners", "");
        let doc = Document {
            bookmark: &b,
            content: None,
        };
        assert_eq!(field_boost("golang tutorial", &doc), 2.0);
        assert_eq!(field_boost("advanced golang tutorial videos", &doc), 1.5);
        assert_eq!(field_boost("one two three four five tutorial", &doc), 1.0);
        assert_eq!(field_boost("", &doc), 1.0);
    }

    #[test]
    fn test_fuse_tags_and_sums() {
        let a = bookmark("a", "https://a.dev", "Alpha", "");
        let b = bookmark("b", "https://b.dev", "Beta", "");
        let c = bookmark("c", "https://c.dev", "Gamma", "");
        let docs: HashMap<Eid, Document> = [(&a, "a"), (&b, "b"), (&c, "c")]
            .into_iter()
            .map(|(bm, id)| {
                (
                    Eid::from(id),
                    Document {
                        bookmark: bm,
                        content: None,
                    },
                )
            })
            .collect();

        let semantic = vec![
            SemanticHit {
                bookmark_id: Eid::from("a"),
                score: 0.9,
                chunk_index: 0,
            },
            SemanticHit {
                bookmark_id: Eid::from("b"),
                score: 0.5,
                chunk_index: 0,
            },
        ];
        let lexical = vec![
            LexicalHit {
                bookmark_id: Eid::from("a"),
                score: 1.0,
                snippet: Some("<mark>x</mark>".into()),
            },
            LexicalHit {
                bookmark_id: Eid::from("c"),
                score: 0.5,
                snippet: None,
            },
        ];

        let results = fuse("zzz", &semantic, &lexical, &docs, &SearchConfig::default());
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].bookmark_id, Eid::from("a"));
        assert_eq!(results[0].search_type, SearchType::Hybrid);
        assert!((results[0].score - (0.9 * 0.4 + 1.0 * 0.6)).abs() < 1e-9);
        assert_eq!(results[0].snippet.as_deref(), Some("<mark>x</mark>"));

        assert_eq!(results[1].bookmark_id, Eid::from("c"));
        assert_eq!(results[1].search_type, SearchType::Keyword);
        assert_eq!(results[2].bookmark_id, Eid::from("b"));
        assert_eq!(results[2].search_type, SearchType::Semantic);
    }

    #[test]
    fn test_fuse_drops_below_noise_floor() {
        let a = bookmark("a", "https://a.dev", "Alpha", "");
        let docs: HashMap<Eid, Document> = [(
            Eid::from("a"),
            Document {
                bookmark: &a,
                content: None,
            },
        )]
        .into_iter()
        .collect();

        let semantic = vec![SemanticHit {
            bookmark_id: Eid::from("a"),
            score: 0.1,
            chunk_index: 0,
        }];
        let lexical = vec![LexicalHit {
            bookmark_id: Eid::from("a"),
            score: 0.1,
            snippet: None,
        }];

        let results = fuse("alpha", &semantic, &lexical, &docs, &SearchConfig::default());
        assert!(results.is_empty());
    }

    #[test]
    fn test_fuse_skips_missing_documents() {
        let semantic = vec![SemanticHit {
            bookmark_id: Eid::from("gone"),
            score: 0.9,
            chunk_index: 0,
        }];
        let results = fuse("q", &semantic, &[], &HashMap::new(), &SearchConfig::default());
        assert!(results.is_empty());
    }
}
