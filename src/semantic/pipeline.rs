//! Chunking and embedding of scraped content.
//!
//! One call handles one bookmark: its cleaned text is chunked, every chunk
//! is embedded, and the chunk set replaces the previous one in a single
//! store transaction. A provider failure persists nothing and marks the
//! bookmark failed.

use serde::Serialize;
use std::sync::Arc;

use super::{chunking::Chunker, embeddings::EmbeddingProvider};
use crate::{
    config::ChunkingConfig,
    errors::{Error, Result},
    store::{BookmarkStatus, ChunkInput, Store},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub processed: usize,
    pub failed: usize,
}

pub struct ContentPipeline {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    max_batch_size: usize,
}

impl ContentPipeline {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
        max_batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            chunker: Chunker::new(chunking),
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Embeds all chunks, `max_batch_size` at a time. Any failed batch fails
    /// the whole call.
    fn embed_all(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.max_batch_size) {
            let embedded = self.embedder.embed_batch(batch)?;
            if embedded.len() != batch.len() {
                return Err(Error::Provider(format!(
                    "provider returned {} vectors for {} chunks",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Returns the number of chunks stored.
    pub fn process_content(&self, bookmark_id: &str) -> Result<usize> {
        let content = self.store.get_content(bookmark_id)?;
        let chunks = self.chunker.chunk(&content.clean_text);

        if chunks.is_empty() {
            self.store
                .store_chunks(content.id, self.embedder.model_id(), &[])?;
            self.store
                .update_bookmark_status(bookmark_id, BookmarkStatus::Completed)?;
            log::debug!("bookmark {bookmark_id} has no text to embed");
            return Ok(0);
        }

        let vectors = match self.embed_all(&chunks) {
            Ok(vectors) => vectors,
            Err(e) => {
                log::warn!("embedding failed for bookmark {bookmark_id}: {e}");
                self.store
                    .update_bookmark_status(bookmark_id, BookmarkStatus::Failed)?;
                return Err(e);
            }
        };

        let inputs: Vec<ChunkInput> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| ChunkInput { text, vector })
            .collect();

        let stored = self
            .store
            .store_chunks(content.id, self.embedder.model_id(), &inputs)?;
        self.store
            .update_bookmark_status(bookmark_id, BookmarkStatus::Completed)?;

        log::info!("stored {stored} chunks for bookmark {bookmark_id}");
        Ok(stored)
    }

    /// Processes every bookmark that has scraped text but no chunk set.
    /// Individual failures are counted, not returned.
    pub fn process_pending(&self) -> Result<ProcessSummary> {
        let pending = self.store.bookmarks_without_embeddings(usize::MAX)?;
        let mut summary = ProcessSummary::default();

        for bookmark in pending {
            match self.process_content(&bookmark.id) {
                Ok(_) => summary.processed += 1,
                Err(e) => {
                    log::error!("failed to process {}: {e}", bookmark.url);
                    summary.failed += 1;
                }
            }
        }

        log::info!(
            "finished processing bookmarks: {} processed, {} failed",
            summary.processed,
            summary.failed
        );
        Ok(summary)
    }
}
