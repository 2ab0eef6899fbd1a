//! Deterministic doubles for the embedding provider and the scraper.

use std::{
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use crate::{
    eid::Eid,
    errors::{Error, Result},
    scrape::{CancelToken, ScrapeOptions, ScrapedPage, Scraper},
    semantic::{EmbeddingError, EmbeddingProvider},
    store::{Bookmark, ImportBatch, ImportedBookmark, ListFilter, Store},
};

pub const DIMENSIONS: usize = 64;

/// Bag-of-words vectors: every lowercase word is hashed into one of 64
/// buckets, then the vector is normalized. Texts sharing words are similar.
#[derive(Default)]
pub struct FakeEmbedder {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let embedder = Self::default();
        embedder.fail.store(true, Ordering::SeqCst);
        Arc::new(embedder)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl EmbeddingProvider for FakeEmbedder {
    fn model_id(&self) -> &str {
        "fake-bow-64"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::EmbeddingFailed("provider unavailable".into()));
        }
        Ok(Self::vector(text))
    }
}

/// Serves canned pages per URL; unknown URLs fail. An optional delay per
/// fetch makes pause/stop observable.
#[derive(Default)]
pub struct FakeScraper {
    pages: HashMap<String, std::result::Result<ScrapedPage, String>>,
    delay: Duration,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn page(mut self, url: &str, title: &str, body: &str) -> Self {
        let html = format!(
            "<html><head><title>{title}</title></head><body><p>{body}</p></body></html>"
        );
        self.pages
            .insert(url.to_string(), Ok(ScrapedPage::from_html(url, html)));
        self
    }

    pub fn failure(mut self, url: &str, message: &str) -> Self {
        self.pages.insert(url.to_string(), Err(message.to_string()));
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl Scraper for FakeScraper {
    fn scrape(&self, cancel: &CancelToken, url: &str, _options: &ScrapeOptions) -> Result<ScrapedPage> {
        if !self.delay.is_zero() && !cancel.sleep(self.delay) {
            return Err(Error::Provider("scrape cancelled".into()));
        }
        self.fetched.lock().unwrap().push(url.to_string());

        match self.pages.get(url) {
            Some(Ok(page)) => Ok(page.clone()),
            Some(Err(message)) => Err(Error::Provider(message.clone())),
            None => Err(Error::Provider(format!("no page for {url}"))),
        }
    }
}

pub fn imported(url: &str, title: &str) -> ImportedBookmark {
    ImportedBookmark {
        url: url.to_string(),
        title: title.to_string(),
        ..Default::default()
    }
}

/// Imports `urls` as untitled bookmarks and returns them in the same order.
pub fn seed(store: &Store, urls: &[&str]) -> Vec<Bookmark> {
    let batch = ImportBatch {
        folders: vec![],
        bookmarks: urls.iter().map(|u| imported(u, "")).collect(),
    };
    store.import_batch(&batch).unwrap();

    let all = store.list_bookmarks(&ListFilter::default()).unwrap();
    urls.iter()
        .map(|u| all.iter().find(|b| b.url == *u).unwrap().clone())
        .collect()
}

pub fn ids(bookmarks: &[Bookmark]) -> Vec<Eid> {
    bookmarks.iter().map(|b| b.id.clone()).collect()
}
