use std::sync::{atomic::Ordering, Arc};

use crate::{
    config::{ChunkingConfig, SearchConfig},
    semantic::{ContentPipeline, SearchEngine, SearchRequest, SearchType},
    store::{BookmarkUpdate, ChunkInput, ImportBatch, Store},
    tests::support::{imported, seed, FakeEmbedder},
};

fn titled(store: &Store, url: &str, title: &str) -> crate::store::Bookmark {
    let bookmark = seed(store, &[url]).remove(0);
    store
        .update_bookmark(
            &bookmark.id,
            &BookmarkUpdate {
                title: Some(title.to_string()),
                ..Default::default()
            },
        )
        .unwrap()
}

/// Two bookmarks about a golang tutorial: one says so in its title and URL,
/// the other only mentions it in passing in its body text.
fn golang_store(embedder: Arc<FakeEmbedder>) -> (Arc<Store>, SearchEngine, [crate::eid::Eid; 2]) {
    let store = Arc::new(Store::open_in_memory().unwrap());

    let go = titled(&store, "https://golang.org/doc/tutorial", "Go Tutorial for Beginners");
    let food = titled(&store, "https://food.example.com/blog", "Cooking Recipes");

    store
        .store_content(
            &go.id,
            "",
            "golang tutorial for beginners: variables, functions, goroutines. golang tutorial",
        )
        .unwrap();
    store
        .store_content(
            &food.id,
            "",
            "A recipe blog. Someone once wrote a golang tutorial here but mostly we cook \
             pasta and bake bread every weekend with friends and family.",
        )
        .unwrap();

    let pipeline = ContentPipeline::new(
        store.clone(),
        embedder.clone(),
        ChunkingConfig::default(),
        16,
    );
    pipeline.process_content(&go.id).unwrap();
    pipeline.process_content(&food.id).unwrap();

    let engine = SearchEngine::new(store.clone(), Some(embedder), SearchConfig::default());
    (store, engine, [go.id, food.id])
}

#[test]
fn test_title_and_url_match_outranks_body_match() {
    let (_store, engine, [go, food]) = golang_store(FakeEmbedder::new());

    let response = engine
        .search_request(&SearchRequest {
            query: "golang tutorial".into(),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(response.total_results, response.results.len());
    assert_eq!(response.results[0].bookmark.id, go);
    assert_eq!(response.results[0].search_type, SearchType::Hybrid);
    assert!(response.results[0]
        .snippet
        .as_deref()
        .unwrap()
        .contains("<mark>"));

    let body_only = response
        .results
        .iter()
        .find(|r| r.bookmark.id == food)
        .unwrap();
    assert!(response.results[0].relevance_score > body_only.relevance_score);
}

#[test]
fn test_search_is_deterministic() {
    let (_store, engine, _) = golang_store(FakeEmbedder::new());
    let request = SearchRequest {
        query: "golang tutorial".into(),
        ..Default::default()
    };

    let first = engine.search_request(&request).unwrap();
    let second = engine.search_request(&request).unwrap();

    let ranked = |r: &crate::semantic::SearchResponse| {
        r.results
            .iter()
            .map(|r| (r.bookmark.id.clone(), r.relevance_score, r.search_type))
            .collect::<Vec<_>>()
    };
    assert_eq!(ranked(&first), ranked(&second));
}

#[test]
fn test_low_similarity_without_lexical_match_is_absent() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let near = titled(&store, "https://near.dev", "Near");
    let far = titled(&store, "https://far.dev", "Far");

    let mut query = vec![0.0f32; 4];
    query[0] = 1.0;

    for (bookmark, first) in [(&near, 0.9f32), (&far, 0.1f32)] {
        let content = store.store_content(&bookmark.id, "", "unrelated words").unwrap();
        let rest = (1.0 - first * first).sqrt();
        store
            .store_chunks(
                content.id,
                "m",
                &[ChunkInput {
                    text: "unrelated words".into(),
                    vector: vec![first, rest, 0.0, 0.0],
                }],
            )
            .unwrap();
    }

    let engine = SearchEngine::new(store.clone(), None, SearchConfig::default());
    let results = engine.search("quantum", Some(&query), 10).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].bookmark.id, near.id);
    assert_eq!(results[0].search_type, SearchType::Semantic);
    assert!(results.iter().all(|r| r.bookmark.id != far.id));
}

#[test]
fn test_provider_failure_falls_back_to_keyword() {
    let embedder = FakeEmbedder::new();
    let (store, _, [go, _]) = golang_store(embedder.clone());

    embedder.set_failing(true);
    let engine = SearchEngine::new(store, Some(embedder), SearchConfig::default());

    let response = engine
        .search_request(&SearchRequest {
            query: "golang tutorial".into(),
            search_type: Some(SearchType::Semantic),
            ..Default::default()
        })
        .unwrap();

    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].bookmark.id, go);
    assert!(response
        .results
        .iter()
        .all(|r| r.search_type == SearchType::Keyword));
}

#[test]
fn test_keyword_hint_skips_embedding() {
    let embedder = FakeEmbedder::new();
    let (_store, engine, _) = golang_store(embedder.clone());
    let before = embedder.calls.load(Ordering::SeqCst);

    let response = engine
        .search_request(&SearchRequest {
            query: "golang".into(),
            search_type: Some(SearchType::Keyword),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(embedder.calls.load(Ordering::SeqCst), before);
    assert!(response
        .results
        .iter()
        .all(|r| r.search_type == SearchType::Keyword));
}

#[test]
fn test_blank_query_returns_nothing() {
    let (_store, engine, _) = golang_store(FakeEmbedder::new());
    let response = engine
        .search_request(&SearchRequest {
            query: "   ".into(),
            ..Default::default()
        })
        .unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.total_results, 0);
}

#[test]
fn test_results_capped_at_max_results() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let batch = ImportBatch {
        folders: vec![],
        bookmarks: (0..25)
            .map(|i| imported(&format!("https://w{i}.dev"), &format!("Widget {i}")))
            .collect(),
    };
    store.import_batch(&batch).unwrap();

    let engine = SearchEngine::new(store, None, SearchConfig::default());
    assert_eq!(engine.keyword_search("widget", 100).unwrap().len(), 20);
    assert_eq!(engine.keyword_search("widget", 5).unwrap().len(), 5);
}
