use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

use super::{
    lexical::{remove_content_fts, sync_content_fts},
    ChunkInput, ChunkVector, Content, EmbeddingChunk, Store,
};
use crate::{
    eid::Eid,
    errors::{Error, Result, ResultExt},
};

const CONTENT_COLUMNS: &str = "id, bookmark_id, raw_content, clean_text, content_type, scraped_at";

fn content_from_row(row: &Row) -> rusqlite::Result<Content> {
    Ok(Content {
        id: row.get(0)?,
        bookmark_id: row.get(1)?,
        raw_content: row.get(2)?,
        clean_text: row.get(3)?,
        content_type: row.get(4)?,
        scraped_at: row.get(5)?,
    })
}

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn find_content(conn: &Connection, bookmark_id: &str) -> rusqlite::Result<Option<Content>> {
    conn.query_row(
        &format!("SELECT {CONTENT_COLUMNS} FROM content WHERE bookmark_id = ?1"),
        [bookmark_id],
        content_from_row,
    )
    .optional()
}

impl Store {
    /// Replaces the bookmark's content row. The previous row, its chunk set
    /// and its full-text entry go away in the same transaction, so the new
    /// row always starts without embeddings.
    pub fn store_content(&self, bookmark_id: &str, raw_content: &str, clean_text: &str) -> Result<Content> {
        let content = self.run(|conn| {
            let tx = conn.transaction().op("begin store content")?;

            let exists: Option<i64> = tx
                .query_row("SELECT 1 FROM bookmarks WHERE id = ?1", [bookmark_id], |row| row.get(0))
                .optional()
                .op("get bookmark")?;
            if exists.is_none() {
                return Err(Error::not_found("bookmark", bookmark_id));
            }

            if let Some(previous) = find_content(&tx, bookmark_id).op("get content")? {
                remove_content_fts(&tx, previous.id).op("unindex content")?;
                tx.execute("DELETE FROM embedding_chunks WHERE content_id = ?1", [previous.id])
                    .op("delete chunks")?;
                tx.execute("DELETE FROM content WHERE id = ?1", [previous.id])
                    .op("delete content")?;
            }

            tx.execute(
                "INSERT INTO content (bookmark_id, raw_content, clean_text, content_type, scraped_at)
                 VALUES (?1, ?2, ?3, 'text/html', ?4)",
                params![bookmark_id, raw_content, clean_text, Utc::now()],
            )
            .op("store content")?;
            let content_id = tx.last_insert_rowid();
            sync_content_fts(&tx, content_id, clean_text).op("index content")?;

            let content = find_content(&tx, bookmark_id)
                .op("get content")?
                .ok_or_else(|| Error::not_found("content", bookmark_id))?;
            tx.commit().op("commit content")?;
            Ok(content)
        })?;

        log::debug!(
            "stored content {} for bookmark {bookmark_id} ({} chars of text)",
            content.id,
            clean_text.chars().count()
        );
        Ok(content)
    }

    pub fn get_content(&self, bookmark_id: &str) -> Result<Content> {
        self.run(|conn| {
            find_content(conn, bookmark_id)
                .op("get content")?
                .ok_or_else(|| Error::not_found("content", bookmark_id))
        })
    }

    /// Content rows for the given bookmarks, keyed by bookmark id.
    pub fn contents_by_bookmark(&self, bookmark_ids: &[Eid]) -> Result<HashMap<Eid, Content>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {CONTENT_COLUMNS} FROM content WHERE bookmark_id = ?1"
                ))
                .op("get content")?;
            let mut found = HashMap::new();
            for id in bookmark_ids {
                if let Some(content) = stmt
                    .query_row([id], content_from_row)
                    .optional()
                    .op("get content")?
                {
                    found.insert(id.clone(), content);
                }
            }
            Ok(found)
        })
    }

    /// Atomically swaps the whole chunk set of a content row. Readers see
    /// either the old set or the new one, never a mix.
    pub fn store_chunks(&self, content_id: i64, model: &str, chunks: &[ChunkInput]) -> Result<usize> {
        if let Some(pos) = chunks.iter().position(|c| c.vector.is_empty()) {
            return Err(Error::Validation(format!("chunk {pos} has an empty vector")));
        }

        self.run(|conn| {
            let tx = conn.transaction().op("begin store chunks")?;

            let exists: Option<i64> = tx
                .query_row("SELECT 1 FROM content WHERE id = ?1", [content_id], |row| row.get(0))
                .optional()
                .op("get content")?;
            if exists.is_none() {
                return Err(Error::not_found("content", content_id.to_string()));
            }

            tx.execute("DELETE FROM embedding_chunks WHERE content_id = ?1", [content_id])
                .op("clear chunks")?;

            {
                let mut stmt = tx
                    .prepare_cached(
                        "INSERT INTO embedding_chunks
                             (content_id, chunk_index, chunk_text, vector, model, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )
                    .op("store chunks")?;
                let now = Utc::now();
                for (index, chunk) in chunks.iter().enumerate() {
                    stmt.execute(params![
                        content_id,
                        index as i64,
                        chunk.text,
                        encode_vector(&chunk.vector),
                        model,
                        now
                    ])
                    .op("store chunks")?;
                }
            }

            tx.commit().op("commit chunks")?;
            Ok(chunks.len())
        })
    }

    /// Chunks in `chunk_index` order.
    pub fn get_embedding_chunks(&self, content_id: i64) -> Result<Vec<EmbeddingChunk>> {
        self.run(|conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM content WHERE id = ?1", [content_id], |row| row.get(0))
                .optional()
                .op("get content")?;
            if exists.is_none() {
                return Err(Error::not_found("content", content_id.to_string()));
            }

            let mut stmt = conn
                .prepare_cached(
                    "SELECT id, content_id, chunk_index, chunk_text, vector, model, created_at
                     FROM embedding_chunks WHERE content_id = ?1 ORDER BY chunk_index",
                )
                .op("get chunks")?;
            let rows = stmt
                .query_map([content_id], |row| {
                    Ok(EmbeddingChunk {
                        id: row.get(0)?,
                        content_id: row.get(1)?,
                        chunk_index: row.get::<_, i64>(2)? as usize,
                        chunk_text: row.get(3)?,
                        vector: decode_vector(&row.get::<_, Vec<u8>>(4)?),
                        model: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })
                .op("get chunks")?;
            rows.collect::<rusqlite::Result<Vec<_>>>().op("get chunks")
        })
    }

    /// Every stored chunk vector, for the brute-force similarity scan.
    pub fn chunk_vectors(&self) -> Result<Vec<ChunkVector>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT c.bookmark_id, e.content_id, e.chunk_index, e.vector
                     FROM embedding_chunks e
                     JOIN content c ON c.id = e.content_id
                     ORDER BY c.bookmark_id, e.chunk_index",
                )
                .op("scan chunk vectors")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ChunkVector {
                        bookmark_id: row.get(0)?,
                        content_id: row.get(1)?,
                        chunk_index: row.get::<_, i64>(2)? as usize,
                        vector: decode_vector(&row.get::<_, Vec<u8>>(3)?),
                    })
                })
                .op("scan chunk vectors")?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .op("scan chunk vectors")
        })
    }
}
