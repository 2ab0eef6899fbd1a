//! SQLite-backed persistence for bookmarks, folders, scraped content and
//! embedding chunks.
//!
//! Two FTS5 tables mirror the searchable text (`bookmarks_fts` over
//! title/description keyed by the bookmark rowid, `content_fts` over the
//! cleaned text keyed by the content id). They are written explicitly in the
//! same transaction as the row they mirror; there are no triggers.

mod bookmarks;
mod content;
mod lexical;
pub mod models;
pub mod schema;

use rusqlite::Connection;
use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    config::StoreConfig,
    errors::{Result, ResultExt},
};

pub use lexical::fts_query;
pub use models::*;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl From<&StoreConfig> for RetryPolicy {
    fn from(config: &StoreConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }
}

/// Single logical connection; every operation runs under its lock, so the
/// store behaves as one serialized writer.
pub struct Store {
    conn: Mutex<Connection>,
    retry: RetryPolicy,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, RetryPolicy::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, retry: RetryPolicy) -> Result<Self> {
        let path = path.as_ref();
        log::info!("opening store at {}", path.display());
        let conn = Connection::open(path).op("open database")?;
        Self::from_connection(conn, retry)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().op("open database")?;
        Self::from_connection(conn, RetryPolicy::default())
    }

    fn from_connection(conn: Connection, retry: RetryPolicy) -> Result<Self> {
        schema::run_all(&conn).op("run migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // a panic while holding the lock leaves no open transaction behind
        // (it is rolled back on drop), so the connection is still usable
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` against the connection, retrying lock contention with
    /// exponential backoff. The lock is released between attempts.
    pub(crate) fn run<T>(&self, mut f: impl FnMut(&mut Connection) -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            let result = {
                let mut conn = self.lock();
                f(&mut conn)
            };

            match result {
                Err(e) if e.is_transient() && attempt + 1 < self.retry.attempts => {
                    let delay = self.retry.base_delay * 2u32.pow(attempt);
                    log::warn!(
                        "{e}; retrying in {}ms (attempt {}/{})",
                        delay.as_millis(),
                        attempt + 1,
                        self.retry.attempts
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
