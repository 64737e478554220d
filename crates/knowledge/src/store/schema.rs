//! Chunk store schema.

use groundwork_core::{AppError, AppResult};
use rusqlite::Connection;

const TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_path TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    department TEXT NOT NULL DEFAULT 'all',
    content_hash TEXT NOT NULL,
    content TEXT NOT NULL,
    client_tag TEXT NOT NULL DEFAULT 'default',
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    client_tag TEXT NOT NULL DEFAULT 'default',
    UNIQUE (document_id, chunk_index)
);

CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    filename TEXT NOT NULL,
    storage_path TEXT NOT NULL,
    mime_type TEXT,
    width INTEGER,
    height INTEGER,
    description TEXT,
    embedding BLOB,
    source_page INTEGER,
    source_url TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunk_images (
    chunk_id INTEGER NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    PRIMARY KEY (chunk_id, image_id)
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
CREATE INDEX IF NOT EXISTS idx_documents_domain ON documents(domain);
CREATE INDEX IF NOT EXISTS idx_documents_department ON documents(department);
CREATE INDEX IF NOT EXISTS idx_images_document ON images(document_id);
CREATE INDEX IF NOT EXISTS idx_chunk_images_image ON chunk_images(image_id);

-- rowid mirrors chunks.id
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(text, tokenize = 'porter unicode61');
"#;

/// Create tables and indexes if missing.
pub fn migrate(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(TABLES)
        .map_err(|e| AppError::Store(format!("Failed to create tables: {}", e)))?;

    tracing::debug!("Chunk store schema ready");
    Ok(())
}
