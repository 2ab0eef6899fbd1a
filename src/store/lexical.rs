use rusqlite::{params, Connection};
use std::collections::HashMap;

use super::{LexicalHit, Store};
use crate::{
    eid::Eid,
    errors::{Result, ResultExt},
};

/// Builds an FTS5 MATCH expression from free text: every alphanumeric word
/// is quoted and the words are OR-ed, so user input can never inject FTS
/// syntax. Returns `None` when the text has no words.
pub fn fts_query(text: &str) -> Option<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w.to_lowercase()))
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" OR "))
    }
}

pub(crate) fn sync_bookmark_fts(
    conn: &Connection,
    rowid: i64,
    title: &str,
    description: &str,
) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM bookmarks_fts WHERE rowid = ?1", [rowid])?;
    conn.execute(
        "INSERT INTO bookmarks_fts (rowid, title, description) VALUES (?1, ?2, ?3)",
        params![rowid, title, description],
    )?;
    Ok(())
}

pub(crate) fn remove_bookmark_fts(conn: &Connection, rowid: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM bookmarks_fts WHERE rowid = ?1", [rowid])?;
    Ok(())
}

pub(crate) fn sync_content_fts(
    conn: &Connection,
    content_id: i64,
    clean_text: &str,
) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM content_fts WHERE rowid = ?1", [content_id])?;
    conn.execute(
        "INSERT INTO content_fts (rowid, clean_text) VALUES (?1, ?2)",
        params![content_id, clean_text],
    )?;
    Ok(())
}

pub(crate) fn remove_content_fts(conn: &Connection, content_id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM content_fts WHERE rowid = ?1", [content_id])?;
    Ok(())
}

impl Store {
    /// Ranks bookmarks against `query` over title/description and, in a
    /// separate pass, over cleaned content text. A bookmark found by both
    /// passes keeps its better score and the content snippet.
    ///
    /// Scores are raw, sign-flipped `bm25()` values (higher is better) and
    /// not normalized.
    pub fn lexical_candidates(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let Some(fts) = fts_query(query) else {
            return Ok(vec![]);
        };
        if limit == 0 {
            return Ok(vec![]);
        }

        self.run(|conn| {
            let mut merged: HashMap<Eid, LexicalHit> = HashMap::new();

            let mut stmt = conn
                .prepare_cached(
                    "SELECT b.id, -bm25(bookmarks_fts)
                     FROM bookmarks_fts
                     JOIN bookmarks b ON b.rowid = bookmarks_fts.rowid
                     WHERE bookmarks_fts MATCH ?1
                     ORDER BY bm25(bookmarks_fts), b.id
                     LIMIT ?2",
                )
                .op("search bookmark text")?;
            let rows = stmt
                .query_map(params![fts, limit as i64], |row| {
                    Ok(LexicalHit {
                        bookmark_id: row.get(0)?,
                        score: row.get(1)?,
                        snippet: None,
                    })
                })
                .op("search bookmark text")?;
            for hit in rows {
                let hit = hit.op("search bookmark text")?;
                merged.insert(hit.bookmark_id.clone(), hit);
            }

            let mut stmt = conn
                .prepare_cached(
                    "SELECT c.bookmark_id, -bm25(content_fts),
                            snippet(content_fts, 0, '<mark>', '</mark>', '...', 32)
                     FROM content_fts
                     JOIN content c ON c.id = content_fts.rowid
                     WHERE content_fts MATCH ?1
                     ORDER BY bm25(content_fts), c.bookmark_id
                     LIMIT ?2",
                )
                .op("search content text")?;
            let rows = stmt
                .query_map(params![fts, limit as i64], |row| {
                    Ok(LexicalHit {
                        bookmark_id: row.get(0)?,
                        score: row.get(1)?,
                        snippet: row.get(2)?,
                    })
                })
                .op("search content text")?;
            for hit in rows {
                let hit = hit.op("search content text")?;
                merged
                    .entry(hit.bookmark_id.clone())
                    .and_modify(|existing| {
                        existing.score = existing.score.max(hit.score);
                        existing.snippet = hit.snippet.clone();
                    })
                    .or_insert(hit);
            }

            let mut hits: Vec<LexicalHit> = merged.into_values().collect();
            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.bookmark_id.cmp(&b.bookmark_id))
            });
            hits.truncate(limit);
            Ok(hits)
        })
    }
}
