//! Bulk scraping: one background worker walks a list of bookmarks in order,
//! scraping each one and feeding the result into the store and the
//! chunking pipeline.
//!
//! State machine:
//!
//! ```text
//! idle ──start──▶ running ──pause──▶ paused ──resume──▶ running
//! running/paused ──stop──▶ stopped
//! running/paused ──list exhausted──▶ completed
//! completed/stopped ──start──▶ running (fresh job)
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::JoinHandle,
};

use crate::{
    eid::Eid,
    errors::{Error, Result},
    scrape::{CancelToken, ScrapeOptions, ScrapedPage, Scraper},
    semantic::ContentPipeline,
    store::{BookmarkStatus, BookmarkUpdate, Store},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "kebab-case")]
pub enum ItemStatus {
    NotScraped,
    InProgress,
    Scraped,
    Error(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct ItemProgress {
    pub bookmark_id: Eid,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// Point-in-time copy of the job state.
#[derive(Clone, Debug, Serialize)]
pub struct JobProgress {
    pub status: JobStatus,
    pub current: usize,
    pub total: usize,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    pub items: Vec<ItemProgress>,
}

impl JobProgress {
    pub fn item(&self, bookmark_id: &str) -> Option<&ItemStatus> {
        self.items
            .iter()
            .find(|i| &*i.bookmark_id == bookmark_id)
            .map(|i| &i.status)
    }

    pub fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.status)).count()
    }
}

struct JobState {
    status: JobStatus,
    ids: Vec<Eid>,
    current: usize,
    current_url: Option<String>,
    items: HashMap<Eid, ItemStatus>,
}

impl JobState {
    fn idle() -> Self {
        Self {
            status: JobStatus::Idle,
            ids: vec![],
            current: 0,
            current_url: None,
            items: HashMap::new(),
        }
    }

    fn snapshot(&self) -> JobProgress {
        let total = self.ids.len();
        let progress = if total > 0 {
            self.current as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        JobProgress {
            status: self.status,
            current: self.current,
            total,
            progress,
            current_url: self.current_url.clone(),
            items: self
                .ids
                .iter()
                .map(|id| ItemProgress {
                    bookmark_id: id.clone(),
                    status: self
                        .items
                        .get(id)
                        .cloned()
                        .unwrap_or(ItemStatus::NotScraped),
                })
                .collect(),
        }
    }
}

/// Job state plus the signal the worker parks on while paused.
struct Shared {
    state: Mutex<JobState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, JobState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_item(&self, id: &Eid, status: ItemStatus) {
        self.lock().items.insert(id.clone(), status);
    }
}

/// What the worker thread needs, cloned out of the manager on start.
struct Worker {
    shared: Arc<Shared>,
    store: Arc<Store>,
    scraper: Arc<dyn Scraper>,
    pipeline: Option<Arc<ContentPipeline>>,
    options: ScrapeOptions,
    cancel: CancelToken,
}

impl Worker {
    /// Blocks while the job is paused. Returns false if the job should exit.
    fn wait_if_paused(&self) -> bool {
        let mut state = self.shared.lock();
        while state.status == JobStatus::Paused && !self.cancel.is_cancelled() {
            state = match self.shared.changed.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        !self.cancel.is_cancelled()
    }

    fn run(self, ids: Vec<Eid>) {
        let _span = tracing::info_span!("scrape_job", total = ids.len()).entered();
        for (i, id) in ids.iter().enumerate() {
            if self.cancel.is_cancelled() || !self.wait_if_paused() {
                log::info!("scrape job stopped at item {}/{}", i, ids.len());
                let mut state = self.shared.lock();
                state.current_url = None;
                self.shared.changed.notify_all();
                return;
            }

            self.shared.lock().current = i + 1;

            match self.process(id) {
                Ok(()) => self.shared.set_item(id, ItemStatus::Scraped),
                Err(msg) => {
                    log::warn!("failed to scrape bookmark {id}: {msg}");
                    self.shared.set_item(id, ItemStatus::Error(msg));
                }
            }
        }

        // a pause that lands during the last item has nothing left to hold
        let mut state = self.shared.lock();
        state.current = state.ids.len();
        state.current_url = None;
        if matches!(state.status, JobStatus::Running | JobStatus::Paused) {
            state.status = JobStatus::Completed;
            log::info!("scrape job completed: {} bookmarks", state.ids.len());
        }
        self.shared.changed.notify_all();
    }

    fn process(&self, id: &Eid) -> std::result::Result<(), String> {
        let bookmark = self
            .store
            .get_bookmark(id)
            .map_err(|e| format!("failed to get bookmark: {e}"))?;

        {
            let mut state = self.shared.lock();
            state.current_url = Some(bookmark.url.clone());
            state.items.insert(id.clone(), ItemStatus::InProgress);
        }

        let page = match self.scraper.scrape(&self.cancel, &bookmark.url, &self.options) {
            Ok(page) if page.success => page,
            Ok(page) => return Err(self.scrape_failed(id, page_error(&page))),
            Err(e) => return Err(self.scrape_failed(id, e.to_string())),
        };

        let update = BookmarkUpdate {
            title: non_empty(&page.title),
            description: non_empty(&page.description),
            favicon_url: non_empty(&page.favicon_url),
            tags: None,
            scraped_at: Some(Utc::now()),
        };
        self.store
            .update_bookmark(id, &update)
            .map_err(|e| format!("failed to update bookmark: {e}"))?;

        self.store
            .store_content(id, &page.raw_content, &page.clean_text)
            .map_err(|e| format!("failed to store content: {e}"))?;

        match &self.pipeline {
            Some(pipeline) => {
                // the pipeline marks the bookmark failed itself
                if let Err(e) = pipeline.process_content(id) {
                    log::warn!("content pipeline failed for {}: {e}", bookmark.url);
                }
            }
            None => {
                self.store
                    .update_bookmark_status(id, BookmarkStatus::Completed)
                    .map_err(|e| format!("failed to update status: {e}"))?;
            }
        }

        log::info!("scraped {}", bookmark.url);
        Ok(())
    }

    fn scrape_failed(&self, id: &Eid, msg: String) -> String {
        if self.cancel.is_cancelled() {
            return msg;
        }
        if let Err(e) = self.store.update_bookmark_status(id, BookmarkStatus::Failed) {
            log::error!("failed to mark bookmark {id} failed: {e}");
        }
        msg
    }
}

fn page_error(page: &ScrapedPage) -> String {
    page.error
        .clone()
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "failed to scrape content".to_string())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Owns the single scrape job. Construct once and share.
pub struct ScrapeJobManager {
    shared: Arc<Shared>,
    store: Arc<Store>,
    scraper: Arc<dyn Scraper>,
    pipeline: Option<Arc<ContentPipeline>>,
    options: ScrapeOptions,
    cancel: Mutex<CancelToken>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScrapeJobManager {
    pub fn new(
        store: Arc<Store>,
        scraper: Arc<dyn Scraper>,
        pipeline: Option<Arc<ContentPipeline>>,
        options: ScrapeOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(JobState::idle()),
                changed: Condvar::new(),
            }),
            store,
            scraper,
            pipeline,
            options,
            cancel: Mutex::new(CancelToken::new()),
            handle: Mutex::new(None),
        }
    }

    /// Starts a fresh job over `bookmark_ids`, processed in the given order.
    /// Repeated ids are scraped once.
    pub fn start(&self, bookmark_ids: &[Eid]) -> Result<()> {
        let mut seen = HashSet::new();
        let ids: Vec<Eid> = bookmark_ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();

        // held until the new worker is stored, so concurrent starts queue here
        let mut handle = lock(&self.handle);
        if self.is_active() {
            return Err(Error::JobState("scraping already in progress".to_string()));
        }

        // a stopped worker may still be finishing its in-flight item
        if let Some(previous) = handle.take() {
            if previous.join().is_err() {
                log::error!("previous scrape worker panicked");
            }
        }

        let cancel = CancelToken::new();
        {
            let mut state = self.shared.lock();
            if matches!(state.status, JobStatus::Running | JobStatus::Paused) {
                return Err(Error::JobState("scraping already in progress".to_string()));
            }

            *state = JobState {
                status: JobStatus::Running,
                items: ids
                    .iter()
                    .map(|id| (id.clone(), ItemStatus::NotScraped))
                    .collect(),
                ids: ids.clone(),
                current: 0,
                current_url: None,
            };
            *lock(&self.cancel) = cancel.clone();
        }

        let worker = Worker {
            shared: self.shared.clone(),
            store: self.store.clone(),
            scraper: self.scraper.clone(),
            pipeline: self.pipeline.clone(),
            options: self.options.clone(),
            cancel,
        };

        log::info!("starting scrape job for {} bookmarks", ids.len());
        *handle = Some(std::thread::spawn(move || worker.run(ids)));

        Ok(())
    }

    fn is_active(&self) -> bool {
        matches!(
            self.shared.lock().status,
            JobStatus::Running | JobStatus::Paused
        )
    }

    pub fn pause(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.status != JobStatus::Running {
            return Err(Error::JobState(
                "no running scraping process to pause".to_string(),
            ));
        }
        state.status = JobStatus::Paused;
        log::info!("scrape job paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.status != JobStatus::Paused {
            return Err(Error::JobState(
                "no paused scraping process to resume".to_string(),
            ));
        }
        state.status = JobStatus::Running;
        self.shared.changed.notify_all();
        log::info!("scrape job resumed");
        Ok(())
    }

    /// Cancels the job. An in-flight fetch finishes or times out; items not
    /// yet started stay `not-scraped`.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if !matches!(state.status, JobStatus::Running | JobStatus::Paused) {
            return Err(Error::JobState("no scraping process to stop".to_string()));
        }
        state.status = JobStatus::Stopped;
        lock(&self.cancel).cancel();
        self.shared.changed.notify_all();
        log::info!("scrape job stopped");
        Ok(())
    }

    pub fn get_status(&self) -> JobProgress {
        self.shared.lock().snapshot()
    }

    /// Blocks until the current worker has exited. Returns immediately when
    /// no job was ever started.
    pub fn wait(&self) -> JobProgress {
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("scrape worker panicked");
            }
        }
        self.get_status()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_progress() {
        let mut state = JobState::idle();
        let snap = state.snapshot();
        assert_eq!(snap.status, JobStatus::Idle);
        assert_eq!(snap.progress, 0.0);

        state.ids = vec![Eid::from("a"), Eid::from("b"), Eid::from("c"), Eid::from("d")];
        state.current = 1;
        state.items.insert(Eid::from("a"), ItemStatus::Scraped);
        let snap = state.snapshot();
        assert_eq!(snap.total, 4);
        assert_eq!(snap.progress, 25.0);
        assert_eq!(snap.item("a"), Some(&ItemStatus::Scraped));
        assert_eq!(snap.item("b"), Some(&ItemStatus::NotScraped));
        assert_eq!(snap.items[3].bookmark_id, Eid::from("d"));
    }

    #[test]
    fn test_item_status_serialization() {
        let json = serde_json::to_value(ItemProgress {
            bookmark_id: Eid::from("a"),
            status: ItemStatus::Error("timeout".to_string()),
        })
        .unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "timeout");
        assert_eq!(json["bookmark_id"], "a");

        let json = serde_json::to_value(ItemStatus::NotScraped).unwrap();
        assert_eq!(json["status"], "not-scraped");
    }

    #[test]
    fn test_page_error_default() {
        let page = ScrapedPage::failed("https://x.dev", "");
        assert_eq!(page_error(&page), "failed to scrape content");
    }
}
