//! Query-time search over the store.
//!
//! [`SearchEngine`] gathers semantic and lexical candidates, loads what the
//! ranking boosts need and hands everything to [`hybrid::fuse`]. A failing
//! embedding provider never fails a search; it degrades to lexical-only.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

use super::{
    embeddings::EmbeddingProvider,
    hybrid::{self, Document, SearchType},
    index,
    lexical::normalize_scores,
};
use crate::{
    config::SearchConfig,
    eid::Eid,
    errors::Result,
    store::{Bookmark, Store},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub bookmark: Bookmark,
    pub content_id: Option<i64>,
    pub relevance_score: f64,
    pub search_type: SearchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    /// `keyword` skips the query embedding, `semantic` skips lexical
    /// candidates, `hybrid` (or nothing) uses both.
    #[serde(default)]
    pub search_type: Option<SearchType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_results: usize,
}

pub struct SearchEngine {
    store: Arc<Store>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        store: Arc<Store>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    fn effective_limit(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.config.max_results)
            .min(self.config.max_results)
    }

    /// Ranks bookmarks for `query`. Semantic candidates are only gathered
    /// when a query vector is given.
    pub fn search(
        &self,
        query: &str,
        query_vector: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        self.run(query, query_vector, true, self.effective_limit(Some(limit)))
    }

    /// Lexical-only ranking, with the same boosts as the hybrid path.
    pub fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.run(query, None, true, self.effective_limit(Some(limit)))
    }

    /// Embeds the query (unless the request asks for keyword search) and
    /// runs the search. Blank queries return nothing.
    pub fn search_request(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let limit = self.effective_limit(request.limit);
        let query = request.query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(SearchResponse {
                results: vec![],
                total_results: 0,
            });
        }

        let want_semantic = request.search_type != Some(SearchType::Keyword);
        let want_lexical = request.search_type != Some(SearchType::Semantic);

        let query_vector = match (&self.embedder, want_semantic) {
            (Some(embedder), true) => match embedder.embed(query) {
                Ok(vector) => Some(vector),
                Err(e) => {
                    log::warn!("query embedding failed, falling back to keyword search: {e}");
                    None
                }
            },
            _ => None,
        };

        // a semantic-only request that lost its vector still gets keyword results
        let want_lexical = want_lexical || query_vector.is_none();
        let results = self.run(query, query_vector.as_deref(), want_lexical, limit)?;

        Ok(SearchResponse {
            total_results: results.len(),
            results,
        })
    }

    fn run(
        &self,
        query: &str,
        query_vector: Option<&[f32]>,
        with_lexical: bool,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let semantic = match query_vector {
            Some(vector) => {
                let chunks = self.store.chunk_vectors()?;
                index::rank_chunks(vector, &chunks, self.config.semantic_candidates)
            }
            None => vec![],
        };

        let mut lexical = if with_lexical {
            self.store
                .lexical_candidates(query, self.config.lexical_candidates)?
        } else {
            vec![]
        };
        normalize_scores(&mut lexical);

        let mut ids: Vec<Eid> = semantic
            .iter()
            .map(|h| h.bookmark_id.clone())
            .chain(lexical.iter().map(|h| h.bookmark_id.clone()))
            .collect();
        ids.sort();
        ids.dedup();

        let bookmarks = self.store.bookmarks_by_ids(&ids)?;
        let contents = self.store.contents_by_bookmark(&ids)?;
        let docs: HashMap<Eid, Document> = bookmarks
            .iter()
            .map(|(id, bookmark)| {
                (
                    id.clone(),
                    Document {
                        bookmark,
                        content: contents.get(id),
                    },
                )
            })
            .collect();

        let fused = hybrid::fuse(query, &semantic, &lexical, &docs, &self.config);
        log::debug!(
            "search {query:?}: {} semantic, {} lexical, {} fused",
            semantic.len(),
            lexical.len(),
            fused.len()
        );

        Ok(fused
            .into_iter()
            .take(limit)
            .filter_map(|hit| {
                let bookmark = bookmarks.get(&hit.bookmark_id)?.clone();
                Some(SearchResult {
                    content_id: contents.get(&hit.bookmark_id).map(|c| c.id),
                    bookmark,
                    relevance_score: hit.score,
                    search_type: hit.search_type,
                    snippet: hit.snippet,
                })
            })
            .collect())
    }
}
