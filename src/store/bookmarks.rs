use chrono::Utc;
use rusqlite::{params, params_from_iter, types::Type, Connection, OptionalExtension, Row};
use std::collections::HashMap;

use super::{
    lexical::{remove_bookmark_fts, remove_content_fts, sync_bookmark_fts},
    Bookmark, BookmarkStatus, BookmarkUpdate, Folder, FolderNode, ImportBatch, ImportCounts,
    ListFilter, NewBookmark, Store, StoreStats,
};
use crate::{
    eid::Eid,
    errors::{is_unique_violation, Error, Result, ResultExt},
};

const BOOKMARK_COLUMNS: &str = "id, url, title, description, status, folder_id, folder_path, \
     favicon_url, tags, imported_at, created_at, updated_at, scraped_at";

fn bookmark_from_row(row: &Row) -> rusqlite::Result<Bookmark> {
    let status: String = row.get(4)?;
    let status = status
        .parse::<BookmarkStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?;
    let tags: String = row.get(8)?;
    let tags: Vec<String> = serde_json::from_str(&tags)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(Bookmark {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status,
        folder_id: row.get(5)?,
        folder_path: row.get(6)?,
        favicon_url: row.get(7)?,
        tags,
        imported_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        scraped_at: row.get(12)?,
    })
}

fn tags_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Returns the bookmark's rowid (the key of its `bookmarks_fts` entry) and
/// the bookmark itself.
fn find_bookmark(conn: &Connection, id: &str) -> rusqlite::Result<Option<(i64, Bookmark)>> {
    conn.query_row(
        &format!("SELECT {BOOKMARK_COLUMNS}, rowid FROM bookmarks WHERE id = ?1"),
        [id],
        |row| Ok((row.get(13)?, bookmark_from_row(row)?)),
    )
    .optional()
}

fn validate_segments(segments: &[String]) -> std::result::Result<(), String> {
    for segment in segments {
        if segment.trim().is_empty() {
            return Err(format!("empty segment in folder path {:?}", segments.join("/")));
        }
        if segment.contains('/') {
            return Err(format!("folder name {segment:?} contains '/'"));
        }
    }
    Ok(())
}

fn validate_folder(node: &FolderNode) -> Result<()> {
    if node.name.trim().is_empty() {
        return Err(Error::Validation("folder with empty name".to_string()));
    }
    validate_segments(&node.path).map_err(Error::Validation)?;
    if node.path.last() != Some(&node.name) {
        return Err(Error::Validation(format!(
            "folder {:?} has path {:?} that does not end with its name",
            node.name,
            node.path.join("/")
        )));
    }
    for child in &node.subfolders {
        validate_folder(child)?;
    }
    Ok(())
}

/// Whole-batch checks. Anything caught here rejects the batch before a
/// single row is written.
fn validate_batch(batch: &ImportBatch) -> Result<()> {
    for folder in &batch.folders {
        validate_folder(folder)?;
    }
    for bookmark in &batch.bookmarks {
        validate_segments(&bookmark.folder_path).map_err(|e| {
            Error::Validation(format!("bookmark {}: {e}", bookmark.url))
        })?;
    }
    Ok(())
}

/// Folders keyed by materialized path, created on first sight. Re-importing
/// the same tree reuses the existing rows.
struct FolderResolver {
    known: HashMap<String, Eid>,
    created: usize,
}

impl FolderResolver {
    fn new() -> Self {
        Self {
            known: HashMap::new(),
            created: 0,
        }
    }

    fn resolve(&mut self, conn: &Connection, segments: &[String]) -> rusqlite::Result<Option<Eid>> {
        let mut parent: Option<Eid> = None;

        for depth in 0..segments.len() {
            let path = segments[..=depth].join("/");
            if let Some(id) = self.known.get(&path) {
                parent = Some(id.clone());
                continue;
            }

            let existing: Option<Eid> = conn
                .query_row("SELECT id FROM folders WHERE path = ?1", [&path], |row| {
                    row.get(0)
                })
                .optional()?;

            let id = match existing {
                Some(id) => id,
                None => {
                    let id = Eid::new();
                    conn.execute(
                        "INSERT INTO folders (id, name, parent_id, path, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![id, segments[depth], parent, path, Utc::now()],
                    )?;
                    self.created += 1;
                    id
                }
            };

            self.known.insert(path, id.clone());
            parent = Some(id);
        }

        Ok(parent)
    }

    fn walk(&mut self, conn: &Connection, node: &FolderNode) -> rusqlite::Result<()> {
        self.resolve(conn, &node.path)?;
        for child in &node.subfolders {
            self.walk(conn, child)?;
        }
        Ok(())
    }
}

impl Store {
    /// Imports a parsed folder/bookmark tree in one transaction.
    ///
    /// URLs already present (in the store or earlier in the same batch) are
    /// counted as duplicates and skipped. A bookmark that cannot be inserted
    /// is counted as failed with its message in `errors`; the rest of the
    /// batch still goes in.
    pub fn import_batch(&self, batch: &ImportBatch) -> Result<ImportCounts> {
        validate_batch(batch)?;

        let counts = self.run(|conn| {
            let tx = conn.transaction().op("begin import")?;
            let mut counts = ImportCounts::default();
            let mut folders = FolderResolver::new();

            for node in &batch.folders {
                folders.walk(&tx, node).op("create folders")?;
            }

            for imported in &batch.bookmarks {
                let url = imported.url.trim();
                if url.is_empty() {
                    counts.failed += 1;
                    counts.errors.push("bookmark with empty url".to_string());
                    continue;
                }

                let exists: Option<i64> = tx
                    .query_row("SELECT 1 FROM bookmarks WHERE url = ?1", [url], |row| row.get(0))
                    .optional()
                    .op("check duplicate url")?;
                if exists.is_some() {
                    counts.duplicate += 1;
                    continue;
                }

                let folder_id = folders
                    .resolve(&tx, &imported.folder_path)
                    .op("create folders")?;
                let now = Utc::now();
                let inserted = tx.execute(
                    &format!(
                        "INSERT INTO bookmarks ({BOOKMARK_COLUMNS}) \
                         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?9, ?10, ?10, NULL)"
                    ),
                    params![
                        Eid::new(),
                        url,
                        imported.title,
                        imported.description,
                        folder_id,
                        imported.folder_path.join("/"),
                        imported.icon.as_deref().unwrap_or_default(),
                        tags_json(&imported.tags),
                        now,
                        imported.date_added.unwrap_or(now),
                    ],
                );

                match inserted {
                    Ok(_) => {
                        let rowid = tx.last_insert_rowid();
                        sync_bookmark_fts(&tx, rowid, &imported.title, &imported.description)
                            .op("index bookmark")?;
                        counts.imported += 1;
                    }
                    Err(e) => {
                        let e = crate::errors::classify("import bookmark", e);
                        if e.is_transient() {
                            return Err(e);
                        }
                        counts.failed += 1;
                        counts.errors.push(format!("failed to insert {url}: {e}"));
                    }
                }
            }

            counts.folders = folders.created;
            tx.commit().op("commit import")?;
            Ok(counts)
        })?;

        log::info!(
            "imported {} bookmarks ({} duplicates, {} failed, {} new folders)",
            counts.imported,
            counts.duplicate,
            counts.failed,
            counts.folders
        );
        Ok(counts)
    }

    /// Direct single insert. Unlike [`Store::import_batch`], a URL collision
    /// is an error here.
    pub fn insert_bookmark(&self, new: &NewBookmark) -> Result<Bookmark> {
        let url = new.url.trim();
        if url.is_empty() {
            return Err(Error::Validation("bookmark url is empty".to_string()));
        }

        self.run(|conn| {
            let tx = conn.transaction().op("begin insert")?;
            let id = Eid::new();
            let now = Utc::now();

            tx.execute(
                &format!(
                    "INSERT INTO bookmarks ({BOOKMARK_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, 'pending', NULL, '', ?5, ?6, ?7, ?7, ?7, NULL)"
                ),
                params![
                    id,
                    url,
                    new.title,
                    new.description,
                    new.favicon_url,
                    tags_json(&new.tags),
                    now
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicateKey(url.to_string())
                } else {
                    crate::errors::classify("insert bookmark", e)
                }
            })?;

            let rowid = tx.last_insert_rowid();
            sync_bookmark_fts(&tx, rowid, &new.title, &new.description).op("index bookmark")?;
            let (_, bookmark) = find_bookmark(&tx, &id)
                .op("get bookmark")?
                .ok_or_else(|| Error::not_found("bookmark", id.as_str()))?;
            tx.commit().op("commit insert")?;
            Ok(bookmark)
        })
    }

    pub fn get_bookmark(&self, id: &str) -> Result<Bookmark> {
        self.run(|conn| {
            find_bookmark(conn, id)
                .op("get bookmark")?
                .map(|(_, bookmark)| bookmark)
                .ok_or_else(|| Error::not_found("bookmark", id))
        })
    }

    /// Newest first. A folder filter matches the folder and all of its
    /// descendants.
    pub fn list_bookmarks(&self, filter: &ListFilter) -> Result<Vec<Bookmark>> {
        let mut clauses: Vec<&str> = vec![];
        let mut args: Vec<String> = vec![];

        if let Some(status) = filter.status {
            args.push(status.as_str().to_string());
            clauses.push("status = ?");
        }
        if let Some(path) = filter.folder_path.as_deref() {
            let path = path.trim_matches('/').to_string();
            let prefix = format!("{path}/");
            args.extend([path, prefix.clone(), prefix]);
            clauses.push("(folder_path = ? OR substr(folder_path, 1, length(?)) = ?)");
        }

        let mut sql = format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        self.run(|conn| {
            let mut stmt = conn.prepare(&sql).op("list bookmarks")?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), bookmark_from_row)
                .op("list bookmarks")?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .op("list bookmarks")
        })
    }

    /// Patches the given fields and keeps the full-text mirror in step.
    pub fn update_bookmark(&self, id: &str, update: &BookmarkUpdate) -> Result<Bookmark> {
        self.run(|conn| {
            let tx = conn.transaction().op("begin update")?;
            let (rowid, mut bookmark) = find_bookmark(&tx, id)
                .op("get bookmark")?
                .ok_or_else(|| Error::not_found("bookmark", id))?;

            if update.is_empty() {
                return Ok(bookmark);
            }

            if let Some(title) = &update.title {
                bookmark.title = title.clone();
            }
            if let Some(description) = &update.description {
                bookmark.description = description.clone();
            }
            if let Some(favicon_url) = &update.favicon_url {
                bookmark.favicon_url = favicon_url.clone();
            }
            if let Some(tags) = &update.tags {
                bookmark.tags = tags.clone();
            }
            if let Some(scraped_at) = update.scraped_at {
                bookmark.scraped_at = Some(scraped_at);
            }
            bookmark.updated_at = Utc::now();

            tx.execute(
                "UPDATE bookmarks
                 SET title = ?2, description = ?3, favicon_url = ?4, tags = ?5,
                     scraped_at = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    bookmark.title,
                    bookmark.description,
                    bookmark.favicon_url,
                    tags_json(&bookmark.tags),
                    bookmark.scraped_at,
                    bookmark.updated_at
                ],
            )
            .op("update bookmark")?;

            if update.touches_lexical_fields() {
                sync_bookmark_fts(&tx, rowid, &bookmark.title, &bookmark.description)
                    .op("index bookmark")?;
            }

            tx.commit().op("commit update")?;
            Ok(bookmark)
        })
    }

    pub fn update_bookmark_status(&self, id: &str, status: BookmarkStatus) -> Result<()> {
        self.run(|conn| {
            let changed = conn
                .execute(
                    "UPDATE bookmarks SET status = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, status.as_str(), Utc::now()],
                )
                .op("update bookmark status")?;
            if changed == 0 {
                return Err(Error::not_found("bookmark", id));
            }
            Ok(())
        })
    }

    /// Removes the bookmark together with its content, chunks and both
    /// full-text entries.
    pub fn delete_bookmark(&self, id: &str) -> Result<()> {
        self.run(|conn| {
            let tx = conn.transaction().op("begin delete")?;
            let rowid: i64 = tx
                .query_row("SELECT rowid FROM bookmarks WHERE id = ?1", [id], |row| row.get(0))
                .optional()
                .op("get bookmark")?
                .ok_or_else(|| Error::not_found("bookmark", id))?;

            let content_ids: Vec<i64> = {
                let mut stmt = tx
                    .prepare("SELECT id FROM content WHERE bookmark_id = ?1")
                    .op("delete bookmark")?;
                let rows = stmt
                    .query_map([id], |row| row.get(0))
                    .op("delete bookmark")?;
                rows.collect::<rusqlite::Result<_>>().op("delete bookmark")?
            };

            for content_id in &content_ids {
                remove_content_fts(&tx, *content_id).op("unindex content")?;
                tx.execute(
                    "DELETE FROM embedding_chunks WHERE content_id = ?1",
                    [content_id],
                )
                .op("delete chunks")?;
            }
            tx.execute("DELETE FROM content WHERE bookmark_id = ?1", [id])
                .op("delete content")?;
            remove_bookmark_fts(&tx, rowid).op("unindex bookmark")?;
            tx.execute("DELETE FROM bookmarks WHERE id = ?1", [id])
                .op("delete bookmark")?;

            tx.commit().op("commit delete")?;
            Ok(())
        })?;

        log::debug!("deleted bookmark {id}");
        Ok(())
    }

    /// Loads the given bookmarks in one pass; ids that no longer exist are
    /// left out of the map.
    pub fn bookmarks_by_ids(&self, ids: &[Eid]) -> Result<HashMap<Eid, Bookmark>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare_cached(&format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE id = ?1"))
                .op("get bookmarks")?;
            let mut found = HashMap::with_capacity(ids.len());
            for id in ids {
                if let Some(bookmark) = stmt
                    .query_row([id], bookmark_from_row)
                    .optional()
                    .op("get bookmarks")?
                {
                    found.insert(id.clone(), bookmark);
                }
            }
            Ok(found)
        })
    }

    pub fn list_folders(&self) -> Result<Vec<Folder>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, parent_id, path, created_at FROM folders ORDER BY path")
                .op("list folders")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Folder {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        parent_id: row.get(2)?,
                        path: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })
                .op("list folders")?;
            rows.collect::<rusqlite::Result<Vec<_>>>().op("list folders")
        })
    }

    /// Bookmarks that have non-empty scraped text but no chunk set yet.
    pub fn bookmarks_without_embeddings(&self, limit: usize) -> Result<Vec<Bookmark>> {
        let sql = format!(
            "SELECT {} FROM bookmarks b
             JOIN content c ON c.bookmark_id = b.id
             WHERE c.clean_text != ''
               AND NOT EXISTS (SELECT 1 FROM embedding_chunks e WHERE e.content_id = c.id)
             ORDER BY b.created_at, b.id
             LIMIT ?1",
            BOOKMARK_COLUMNS
                .split(", ")
                .map(|c| format!("b.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.run(|conn| {
            let mut stmt = conn.prepare(&sql).op("list bookmarks without embeddings")?;
            let rows = stmt
                .query_map([limit.min(i64::MAX as usize) as i64], bookmark_from_row)
                .op("list bookmarks without embeddings")?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .op("list bookmarks without embeddings")
        })
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.run(|conn| {
            let count = |sql: &str| -> Result<usize> {
                conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                    .map(|n| n as usize)
                    .op("read stats")
            };

            Ok(StoreStats {
                total_bookmarks: count("SELECT COUNT(*) FROM bookmarks")?,
                pending_bookmarks: count("SELECT COUNT(*) FROM bookmarks WHERE status = 'pending'")?,
                completed_bookmarks: count(
                    "SELECT COUNT(*) FROM bookmarks WHERE status = 'completed'",
                )?,
                failed_bookmarks: count("SELECT COUNT(*) FROM bookmarks WHERE status = 'failed'")?,
                content_entries: count("SELECT COUNT(*) FROM content")?,
                embedding_chunks: count("SELECT COUNT(*) FROM embedding_chunks")?,
                bookmarks_with_content: count(
                    "SELECT COUNT(DISTINCT bookmark_id) FROM content WHERE clean_text != ''",
                )?,
                bookmarks_with_embeddings: count(
                    "SELECT COUNT(DISTINCT c.bookmark_id) FROM content c
                     JOIN embedding_chunks e ON e.content_id = c.id",
                )?,
            })
        })
    }
}
