use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use crate::eid::Eid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl BookmarkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookmarkStatus::Pending => "pending",
            BookmarkStatus::Completed => "completed",
            BookmarkStatus::Failed => "failed",
        }
    }
}

impl Display for BookmarkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookmarkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookmarkStatus::Pending),
            "completed" => Ok(BookmarkStatus::Completed),
            "failed" => Ok(BookmarkStatus::Failed),
            other => Err(format!("unknown bookmark status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: Eid,
    pub url: String,
    pub title: String,
    pub description: String,
    pub status: BookmarkStatus,
    pub folder_id: Option<Eid>,
    pub folder_path: String,
    pub favicon_url: String,
    pub tags: Vec<String>,
    pub imported_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scraped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: Eid,
    pub name: String,
    pub parent_id: Option<Eid>,
    /// Materialized ancestry, e.g. `Technology/Databases`.
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub bookmark_id: Eid,
    pub raw_content: String,
    pub clean_text: String,
    pub content_type: String,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingChunk {
    pub id: i64,
    pub content_id: i64,
    pub chunk_index: usize,
    pub chunk_text: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// Chunk text with its vector, as handed to `Store::store_chunks`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkInput {
    pub text: String,
    pub vector: Vec<f32>,
}

/// Single bookmark insert outside of an import batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBookmark {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub favicon_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookmarkUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl BookmarkUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.favicon_url.is_none()
            && self.tags.is_none()
            && self.scraped_at.is_none()
    }

    pub(crate) fn touches_lexical_fields(&self) -> bool {
        self.title.is_some() || self.description.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListFilter {
    pub status: Option<BookmarkStatus>,
    /// Matches the folder itself and every folder below it.
    pub folder_path: Option<String>,
    pub limit: Option<usize>,
}

/// Folder tree node as produced by a bookmark-file parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderNode {
    pub name: String,
    /// Full path from the root, including `name` as the last segment.
    pub path: Vec<String>,
    #[serde(default)]
    pub subfolders: Vec<FolderNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportedBookmark {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date_added: Option<DateTime<Utc>>,
    #[serde(default)]
    pub folder_path: Vec<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportBatch {
    #[serde(default)]
    pub folders: Vec<FolderNode>,
    #[serde(default)]
    pub bookmarks: Vec<ImportedBookmark>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    pub imported: usize,
    pub duplicate: usize,
    pub failed: usize,
    pub folders: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_bookmarks: usize,
    pub pending_bookmarks: usize,
    pub completed_bookmarks: usize,
    pub failed_bookmarks: usize,
    pub content_entries: usize,
    pub embedding_chunks: usize,
    /// Bookmarks whose stored content has non-empty cleaned text.
    pub bookmarks_with_content: usize,
    pub bookmarks_with_embeddings: usize,
}

/// A bookmark surfaced by the full-text mirror, before fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub bookmark_id: Eid,
    /// Higher is better (already sign-flipped from SQLite's `bm25()`).
    pub score: f64,
    pub snippet: Option<String>,
}

/// One stored chunk vector with the bookmark it belongs to.
#[derive(Debug, Clone)]
pub struct ChunkVector {
    pub bookmark_id: Eid,
    pub content_id: i64,
    pub chunk_index: usize,
    pub vector: Vec<f32>,
}
