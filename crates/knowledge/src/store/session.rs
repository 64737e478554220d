//! A single SQLite connection scoped to one unit of work.

use super::{bytes_to_embedding, embedding_to_bytes};
use crate::retrieval::mmr::cosine_similarity;
use crate::text;
use crate::types::{
    ChunkImage, DocumentRecord, ImageInput, ImageMatch, ImageRecord, SearchFilters, StoredChunk,
};
use chrono::{DateTime, Utc};
use groundwork_core::{AppError, AppResult};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, InterruptHandle, OptionalExtension, Row};
use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;

/// Document fields written on create or replace.
#[derive(Debug, Clone)]
pub struct DocumentUpsert<'a> {
    pub source_path: &'a str,
    pub domain: &'a str,
    pub department: &'a str,
    pub content_hash: &'a str,
    pub content: &'a str,
    pub client_tag: &'a str,
}

/// A chunk ready to be written.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// An image ready to be written, with its description embedding if any.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub input: ImageInput,
    pub embedding: Option<Vec<f32>>,
}

/// Result of a document replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceResult {
    pub document_id: i64,
    pub created: bool,
}

/// Store handle owning one connection.
///
/// Created inside a blocking worker by [`super::ChunkStore::with_session`]
/// and dropped when that unit of work returns.
pub struct StoreSession {
    conn: Connection,
}

const CHUNK_COLUMNS: &str = "c.id, c.text, c.embedding, d.source_path, d.domain";

const IMAGE_COLUMNS: &str = "i.id, i.filename, i.storage_path, i.mime_type, i.description, \
                             i.width, i.height, i.source_page, i.source_url";

impl StoreSession {
    /// Open a connection with foreign keys enforced.
    pub fn open(path: &Path) -> AppResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| AppError::Store(format!("Failed to open chunk store: {}", e)))?;
        Self::configure(conn)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Store(format!("Failed to open chunk store: {}", e)))?;
        let session = Self::configure(conn)?;
        super::schema::migrate(&session.conn)?;
        Ok(session)
    }

    fn configure(conn: Connection) -> AppResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| AppError::Store(format!("Failed to enable foreign keys: {}", e)))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| AppError::Store(format!("Failed to set busy timeout: {}", e)))?;
        Ok(Self { conn })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    /// Nearest chunks to `embedding` by cosine similarity.
    ///
    /// Exhaustive over the filtered rows; ties are ordered by chunk id.
    pub fn semantic_search(
        &self,
        embedding: &[f32],
        pool_size: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<StoredChunk>> {
        if pool_size == 0 {
            return Ok(Vec::new());
        }

        let mut values = Vec::new();
        let sql = format!(
            "SELECT {} FROM chunks c JOIN documents d ON d.id = c.document_id WHERE 1 = 1{}",
            CHUNK_COLUMNS,
            filter_clause(filters, &mut values)
        );

        let rows = self.query_chunks(&sql, values)?;
        let mut scored: Vec<(f32, StoredChunk)> = rows
            .into_iter()
            .map(|chunk| (cosine_similarity(embedding, &chunk.embedding), chunk))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.chunk_id.cmp(&b.1.chunk_id))
        });
        scored.truncate(pool_size);

        Ok(scored.into_iter().map(|(_, chunk)| chunk).collect())
    }

    /// Full-text matches for every content term of `query`, best first.
    ///
    /// Returns an empty list when the query has no searchable terms.
    pub fn lexical_search(
        &self,
        query: &str,
        pool_size: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<StoredChunk>> {
        let Some(match_expr) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };
        if pool_size == 0 {
            return Ok(Vec::new());
        }

        let mut values = vec![Value::Text(match_expr)];
        let filters_sql = filter_clause(filters, &mut values);
        values.push(Value::Integer(pool_size as i64));

        let sql = format!(
            "SELECT {} FROM chunks_fts \
             JOIN chunks c ON c.id = chunks_fts.rowid \
             JOIN documents d ON d.id = c.document_id \
             WHERE chunks_fts MATCH ?{} \
             ORDER BY bm25(chunks_fts), c.id \
             LIMIT ?",
            CHUNK_COLUMNS, filters_sql
        );

        self.query_chunks(&sql, values)
    }

    fn query_chunks(&self, sql: &str, values: Vec<Value>) -> AppResult<Vec<StoredChunk>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| AppError::Store(format!("Failed to prepare chunk query: {}", e)))?;

        let rows = stmt
            .query_map(params_from_iter(values), chunk_from_row)
            .map_err(|e| AppError::Store(format!("Failed to query chunks: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read chunk row: {}", e)))
    }

    /// Images linked to any of `chunk_ids`, grouped by chunk.
    pub fn images_for_chunks(&self, chunk_ids: &[i64]) -> AppResult<Vec<ChunkImage>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT ci.chunk_id, {} FROM chunk_images ci \
             JOIN images i ON i.id = ci.image_id \
             WHERE ci.chunk_id IN ({}) \
             ORDER BY ci.chunk_id, i.id",
            IMAGE_COLUMNS,
            placeholders(chunk_ids.len())
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| AppError::Store(format!("Failed to prepare image query: {}", e)))?;

        let rows = stmt
            .query_map(params_from_iter(chunk_ids.iter()), |row| {
                Ok(ChunkImage {
                    chunk_id: row.get(0)?,
                    image: image_from_row(row, 1)?,
                })
            })
            .map_err(|e| AppError::Store(format!("Failed to query images: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read image row: {}", e)))
    }

    /// Images whose description embedding is at least `min_similarity` to `embedding`.
    pub fn search_images(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> AppResult<Vec<ImageMatch>> {
        let sql = format!(
            "SELECT i.embedding, {} FROM images i WHERE i.embedding IS NOT NULL",
            IMAGE_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| AppError::Store(format!("Failed to prepare image search: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(0)?;
                let vector = decode_embedding(&bytes, 0)?;
                Ok((vector, image_from_row(row, 1)?))
            })
            .map_err(|e| AppError::Store(format!("Failed to search images: {}", e)))?;

        let mut matches = Vec::new();
        for row in rows {
            let (vector, image) =
                row.map_err(|e| AppError::Store(format!("Failed to read image row: {}", e)))?;
            let similarity = cosine_similarity(embedding, &vector);
            if similarity >= min_similarity {
                matches.push(ImageMatch { image, similarity });
            }
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then(a.image.id.cmp(&b.image.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    /// Look up a document by its source identifier.
    pub fn find_document(&self, source_path: &str) -> AppResult<Option<DocumentRecord>> {
        self.conn
            .query_row(
                "SELECT id, source_path, domain, department, content_hash, client_tag, updated_at \
                 FROM documents WHERE source_path = ?1",
                params![source_path],
                |row| {
                    let updated_at: String = row.get(6)?;
                    Ok(DocumentRecord {
                        id: row.get(0)?,
                        source_path: row.get(1)?,
                        domain: row.get(2)?,
                        department: row.get(3)?,
                        content_hash: row.get(4)?,
                        client_tag: row.get(5)?,
                        updated_at: parse_timestamp(&updated_at, 6)?,
                    })
                },
            )
            .optional()
            .map_err(|e| AppError::Store(format!("Failed to look up document: {}", e)))
    }

    /// Create a document, or replace all of its chunks and images.
    ///
    /// Runs in one transaction: readers see either the old chunk set or the
    /// new one. Images are linked to the first chunk.
    pub fn replace_document(
        &mut self,
        document: &DocumentUpsert<'_>,
        chunks: &[NewChunk],
        images: &[NewImage],
    ) -> AppResult<ReplaceResult> {
        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction()
            .map_err(|e| AppError::Store(format!("Failed to begin transaction: {}", e)))?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM documents WHERE source_path = ?1",
                params![document.source_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Store(format!("Failed to look up document: {}", e)))?;

        let document_id = match existing {
            Some(id) => {
                clear_document_content(&tx, id)?;
                tx.execute(
                    "UPDATE documents SET domain = ?1, department = ?2, content_hash = ?3, \
                     content = ?4, client_tag = ?5, updated_at = ?6 WHERE id = ?7",
                    params![
                        document.domain,
                        document.department,
                        document.content_hash,
                        document.content,
                        document.client_tag,
                        now,
                        id
                    ],
                )
                .map_err(|e| AppError::Store(format!("Failed to update document: {}", e)))?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO documents \
                     (source_path, domain, department, content_hash, content, client_tag, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        document.source_path,
                        document.domain,
                        document.department,
                        document.content_hash,
                        document.content,
                        document.client_tag,
                        now
                    ],
                )
                .map_err(|e| AppError::Store(format!("Failed to insert document: {}", e)))?;
                tx.last_insert_rowid()
            }
        };

        let mut first_chunk_id = None;
        for (index, chunk) in chunks.iter().enumerate() {
            tx.execute(
                "INSERT INTO chunks (document_id, chunk_index, text, embedding, client_tag) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    document_id,
                    index as i64,
                    chunk.text,
                    embedding_to_bytes(&chunk.embedding),
                    document.client_tag
                ],
            )
            .map_err(|e| AppError::Store(format!("Failed to insert chunk: {}", e)))?;
            let chunk_id = tx.last_insert_rowid();
            first_chunk_id.get_or_insert(chunk_id);

            tx.execute(
                "INSERT INTO chunks_fts (rowid, text) VALUES (?1, ?2)",
                params![chunk_id, chunk.text],
            )
            .map_err(|e| AppError::Store(format!("Failed to index chunk text: {}", e)))?;
        }

        for image in images {
            let input = &image.input;
            tx.execute(
                "INSERT INTO images (document_id, filename, storage_path, mime_type, width, height, \
                 description, embedding, source_page, source_url, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    document_id,
                    input.filename,
                    input.storage_path,
                    input.mime_type,
                    input.width,
                    input.height,
                    input.description,
                    image.embedding.as_deref().map(embedding_to_bytes),
                    input.source_page,
                    input.source_url,
                    now
                ],
            )
            .map_err(|e| AppError::Store(format!("Failed to insert image: {}", e)))?;
            let image_id = tx.last_insert_rowid();

            if let Some(chunk_id) = first_chunk_id {
                tx.execute(
                    "INSERT INTO chunk_images (chunk_id, image_id) VALUES (?1, ?2)",
                    params![chunk_id, image_id],
                )
                .map_err(|e| AppError::Store(format!("Failed to link image: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| AppError::Store(format!("Failed to commit document: {}", e)))?;

        Ok(ReplaceResult {
            document_id,
            created: existing.is_none(),
        })
    }

    /// Delete a document and everything it owns. Returns false if absent.
    pub fn delete_document(&mut self, source_path: &str) -> AppResult<bool> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| AppError::Store(format!("Failed to begin transaction: {}", e)))?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM documents WHERE source_path = ?1",
                params![source_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Store(format!("Failed to look up document: {}", e)))?;

        let Some(document_id) = existing else {
            return Ok(false);
        };

        // The full-text table has no foreign key, so clear it explicitly
        tx.execute(
            "DELETE FROM chunks_fts WHERE rowid IN (SELECT id FROM chunks WHERE document_id = ?1)",
            params![document_id],
        )
        .map_err(|e| AppError::Store(format!("Failed to delete chunk text: {}", e)))?;
        tx.execute("DELETE FROM documents WHERE id = ?1", params![document_id])
            .map_err(|e| AppError::Store(format!("Failed to delete document: {}", e)))?;

        tx.commit()
            .map_err(|e| AppError::Store(format!("Failed to commit delete: {}", e)))?;
        Ok(true)
    }

    /// Row counts; the file size is filled in by the store.
    pub fn counts(&self) -> AppResult<(u64, u64, u64)> {
        let count = |table: &str| -> AppResult<u64> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|v| v as u64)
                .map_err(|e| AppError::Store(format!("Failed to count {}: {}", table, e)))
        };

        Ok((count("documents")?, count("chunks")?, count("images")?))
    }
}

fn clear_document_content(tx: &rusqlite::Transaction<'_>, document_id: i64) -> AppResult<()> {
    tx.execute(
        "DELETE FROM chunks_fts WHERE rowid IN (SELECT id FROM chunks WHERE document_id = ?1)",
        params![document_id],
    )
    .map_err(|e| AppError::Store(format!("Failed to delete chunk text: {}", e)))?;
    tx.execute(
        "DELETE FROM chunks WHERE document_id = ?1",
        params![document_id],
    )
    .map_err(|e| AppError::Store(format!("Failed to delete chunks: {}", e)))?;
    tx.execute(
        "DELETE FROM images WHERE document_id = ?1",
        params![document_id],
    )
    .map_err(|e| AppError::Store(format!("Failed to delete images: {}", e)))?;
    Ok(())
}

/// FTS5 expression requiring every content term of `query`.
///
/// Terms are quoted so user punctuation never reaches the FTS5 parser.
pub fn fts_match_expression(query: &str) -> Option<String> {
    let terms = text::terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// SQL fragment for the active filters, appending bound values in order.
fn filter_clause(filters: &SearchFilters, values: &mut Vec<Value>) -> String {
    let mut sql = String::new();

    if let Some(domain) = filters.domain() {
        sql.push_str(" AND d.domain = ?");
        values.push(Value::Text(domain.to_string()));
    }
    if let Some(departments) = filters.departments() {
        sql.push_str(&format!(
            " AND d.department IN ({})",
            placeholders(departments.len())
        ));
        values.extend(departments.iter().map(|d| Value::Text(d.clone())));
    }
    if let Some(tag) = filters.client_tag() {
        sql.push_str(" AND c.client_tag = ?");
        values.push(Value::Text(tag.to_string()));
    }

    sql
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<StoredChunk> {
    let bytes: Vec<u8> = row.get(2)?;
    Ok(StoredChunk {
        chunk_id: row.get(0)?,
        text: row.get(1)?,
        embedding: decode_embedding(&bytes, 2)?,
        source: row.get(3)?,
        domain: row.get(4)?,
    })
}

fn image_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(offset)?,
        filename: row.get(offset + 1)?,
        storage_path: row.get(offset + 2)?,
        mime_type: row.get(offset + 3)?,
        description: row.get(offset + 4)?,
        width: row.get(offset + 5)?,
        height: row.get(offset + 6)?,
        source_page: row.get(offset + 7)?,
        source_url: row.get(offset + 8)?,
    })
}

fn decode_embedding(bytes: &[u8], column: usize) -> rusqlite::Result<Vec<f32>> {
    bytes_to_embedding(bytes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Blob, Box::new(e)))
}

fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}
