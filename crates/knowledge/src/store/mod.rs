//! SQLite chunk store with vector and full-text search.
//!
//! [`ChunkStore`] is a cheap, cloneable handle. Every unit of work runs on a
//! freshly opened [`StoreSession`] inside a blocking worker, so concurrent
//! retrieval tasks never share a connection. Workers are bounded by a
//! semaphore and each unit of work carries the store timeout; on timeout the
//! running statement is interrupted and the connection is released when the
//! worker returns.

pub mod schema;
pub mod session;

pub use session::{DocumentUpsert, NewChunk, NewImage, ReplaceResult, StoreSession};

use crate::types::StoreStats;
use groundwork_core::{AppError, AppResult, RetrievalConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};

/// Handle to the on-disk chunk store.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    path: PathBuf,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ChunkStore {
    /// Open (creating if needed) the store at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>, config: &RetrievalConfig) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            path,
            permits: Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1))),
            timeout: Duration::from_secs(config.store_timeout_secs.max(1)),
        };

        store
            .with_session(|session| schema::migrate(session.connection()))
            .await?;

        tracing::debug!("Opened chunk store at {:?}", store.path);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on a dedicated session in the blocking pool.
    ///
    /// # Errors
    /// `AppError::Timeout` if no worker frees up or the work does not finish
    /// within the store timeout; otherwise whatever `f` returns.
    pub async fn with_session<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut StoreSession) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = tokio::time::timeout(self.timeout, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| AppError::Timeout("Timed out waiting for a store session".to_string()))?
            .map_err(|e| AppError::Store(format!("Store session pool closed: {}", e)))?;

        let path = self.path.clone();
        let (interrupt_tx, mut interrupt_rx) = oneshot::channel();

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut session = StoreSession::open(&path)?;
            let _ = interrupt_tx.send(session.interrupt_handle());
            f(&mut session)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(AppError::Store(format!("Store worker failed: {}", e))),
            Err(_) => {
                if let Ok(handle) = interrupt_rx.try_recv() {
                    handle.interrupt();
                }
                Err(AppError::Timeout(format!(
                    "Store operation exceeded {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// Document, chunk and image counts plus the database file size.
    pub async fn stats(&self) -> AppResult<StoreStats> {
        let (documents, chunks, images) = self.with_session(|s| s.counts()).await?;
        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);

        Ok(StoreStats {
            documents,
            chunks,
            images,
            db_size_bytes,
        })
    }
}

/// Convert embedding vector to little-endian bytes for storage.
pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert stored bytes back to an embedding vector.
pub(crate) fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Store(format!(
            "Invalid embedding bytes length: {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
