//! Embedding, chunking and hybrid search.
//!
//! # Architecture
//!
//! - `embeddings`: provider trait and the fastembed-backed model
//! - `chunking`: token-bounded recursive text splitting
//! - `pipeline`: chunk + embed + persist for one bookmark's content
//! - `index`: cosine similarity over stored chunk vectors
//! - `lexical`: normalization of full-text candidates
//! - `hybrid`: boosting and score fusion
//! - `service`: query-time search engine

pub mod chunking;
pub mod embeddings;
pub mod hybrid;
pub mod index;
pub mod lexical;
pub mod pipeline;
pub mod service;

pub use chunking::Chunker;
pub use embeddings::{EmbeddingError, EmbeddingModel, EmbeddingProvider};
pub use hybrid::SearchType;
pub use pipeline::{ContentPipeline, ProcessSummary};
pub use service::{SearchEngine, SearchRequest, SearchResponse, SearchResult};
