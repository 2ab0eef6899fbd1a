//! Local bookmark knowledge base: an SQLite bookmark store with full-text
//! mirrors, hybrid semantic + keyword search, a token-bounded chunking and
//! embedding pipeline, and a pausable bulk scraper feeding it.

pub mod app;
pub mod config;
pub mod eid;
pub mod errors;
pub mod scrape;
pub mod semantic;
pub mod store;

#[cfg(test)]
mod tests;

pub use app::{AppContext, JobProgress, JobStatus, ScrapeJobManager};
pub use config::Config;
pub use eid::Eid;
pub use errors::{Error, Result};
pub use scrape::{CancelToken, HtmlScraper, ScrapeOptions, ScrapedPage, Scraper};
pub use semantic::{ContentPipeline, EmbeddingProvider, SearchEngine, SearchRequest, SearchResponse};
pub use store::Store;
