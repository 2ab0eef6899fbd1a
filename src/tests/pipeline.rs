use std::sync::Arc;

use crate::{
    config::ChunkingConfig,
    errors::Error,
    semantic::{Chunker, ContentPipeline},
    store::{BookmarkStatus, Store},
    tests::support::{seed, FakeEmbedder},
};

fn small_budget() -> ChunkingConfig {
    ChunkingConfig {
        max_tokens: 20,
        chars_per_token: 4,
    }
}

fn paragraphs(n: usize) -> String {
    (0..n)
        .map(|i| format!("Paragraph number {i} talks about storage engines and write ahead logs."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[test]
fn test_reprocessing_replaces_chunk_set() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bookmark = seed(&store, &["https://a.dev"]).remove(0);
    let pipeline = ContentPipeline::new(store.clone(), FakeEmbedder::new(), small_budget(), 4);

    let content = store.store_content(&bookmark.id, "", &paragraphs(6)).unwrap();
    let first = pipeline.process_content(&bookmark.id).unwrap();
    assert!(first > 1);
    assert_eq!(store.get_embedding_chunks(content.id).unwrap().len(), first);

    let content = store.store_content(&bookmark.id, "", &paragraphs(2)).unwrap();
    let second = pipeline.process_content(&bookmark.id).unwrap();
    assert!(second < first);
    pipeline.process_content(&bookmark.id).unwrap();

    let chunks = store.get_embedding_chunks(content.id).unwrap();
    assert_eq!(chunks.len(), second);
    let indexes: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indexes, (0..second).collect::<Vec<_>>());
    assert!(chunks.iter().all(|c| c.model == "fake-bow-64"));

    assert_eq!(
        store.get_bookmark(&bookmark.id).unwrap().status,
        BookmarkStatus::Completed
    );
}

#[test]
fn test_stored_chunks_rebuild_source() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bookmark = seed(&store, &["https://a.dev"]).remove(0);
    let pipeline = ContentPipeline::new(store.clone(), FakeEmbedder::new(), small_budget(), 4);

    let text = paragraphs(5);
    let content = store.store_content(&bookmark.id, "", &text).unwrap();
    pipeline.process_content(&bookmark.id).unwrap();

    let chunker = Chunker::new(small_budget());
    let chunks = store.get_embedding_chunks(content.id).unwrap();
    assert!(chunks
        .iter()
        .all(|c| chunker.estimate_tokens(&c.chunk_text) <= 20));

    let joined: String = chunks
        .iter()
        .map(|c| c.chunk_text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    assert_eq!(normalize(&joined), normalize(&text));
}

#[test]
fn test_provider_failure_persists_nothing() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bookmark = seed(&store, &["https://a.dev"]).remove(0);
    let embedder = FakeEmbedder::new();
    let pipeline = ContentPipeline::new(store.clone(), embedder.clone(), small_budget(), 2);

    let content = store.store_content(&bookmark.id, "", &paragraphs(4)).unwrap();
    let stored = pipeline.process_content(&bookmark.id).unwrap();
    assert!(stored > 0);

    embedder.set_failing(true);
    let err = pipeline.process_content(&bookmark.id).unwrap_err();
    assert!(matches!(err, Error::Provider(_)));

    // the previous set is untouched and the bookmark is marked failed
    assert_eq!(store.get_embedding_chunks(content.id).unwrap().len(), stored);
    assert_eq!(
        store.get_bookmark(&bookmark.id).unwrap().status,
        BookmarkStatus::Failed
    );
}

#[test]
fn test_empty_text_completes_without_provider() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bookmark = seed(&store, &["https://a.dev"]).remove(0);
    let pipeline = ContentPipeline::new(store.clone(), FakeEmbedder::failing(), small_budget(), 2);

    let content = store.store_content(&bookmark.id, "<html></html>", "  ").unwrap();
    assert_eq!(pipeline.process_content(&bookmark.id).unwrap(), 0);
    assert!(store.get_embedding_chunks(content.id).unwrap().is_empty());
    assert_eq!(
        store.get_bookmark(&bookmark.id).unwrap().status,
        BookmarkStatus::Completed
    );
}

#[test]
fn test_missing_content_is_not_found() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bookmark = seed(&store, &["https://a.dev"]).remove(0);
    let pipeline = ContentPipeline::new(store, FakeEmbedder::new(), small_budget(), 2);

    assert!(matches!(
        pipeline.process_content(&bookmark.id),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_process_pending_counts() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bookmarks = seed(&store, &["https://a.dev", "https://b.dev", "https://c.dev"]);
    let pipeline = ContentPipeline::new(store.clone(), FakeEmbedder::new(), small_budget(), 8);

    store.store_content(&bookmarks[0].id, "", "alpha text").unwrap();
    store.store_content(&bookmarks[1].id, "", "beta text").unwrap();

    let summary = pipeline.process_pending().unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 0);
    assert!(store.bookmarks_without_embeddings(10).unwrap().is_empty());

    // nothing left to do
    assert_eq!(pipeline.process_pending().unwrap().processed, 0);
}
