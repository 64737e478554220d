//! Document ingestion: hash, chunk, embed and write to the chunk store.

use crate::chunker::chunk_text;
use crate::embeddings::EmbeddingProvider;
use crate::store::{ChunkStore, DocumentUpsert, NewChunk, NewImage};
use crate::types::{DocumentInput, IngestAction, IngestOutcome};
use groundwork_core::{AppError, AppResult, RetrievalConfig};
use sha2::{Digest, Sha256};
use std::path::{Component, Path};
use std::sync::Arc;

/// Client tag used when a document carries none.
pub const DEFAULT_CLIENT_TAG: &str = "default";

/// Generate SHA-256 content hash for change detection
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Classify a source path into a domain by its directory names.
pub fn infer_domain(path: &Path) -> &'static str {
    let parts = lower_components(path);
    if parts.iter().any(|p| p == "powerbi") {
        "powerbi"
    } else if parts.iter().any(|p| p == "d365fo" || p == "d365" || p == "xpp") {
        "d365fo"
    } else {
        "general"
    }
}

/// Department from a `**Department:** value` line, else from the path, else `all`.
pub fn infer_department(path: &Path, text: &str) -> String {
    if let Some(department) = metadata_value(text, "department") {
        return department.to_lowercase();
    }

    let parts = lower_components(path);
    let has = |name: &str| parts.iter().any(|p| p == name);
    if has("finance") {
        "finance"
    } else if has("hr") {
        "hr"
    } else if has("it") || has("ops") {
        "it"
    } else if has("supply") || has("sc") {
        "supply"
    } else {
        "all"
    }
    .to_string()
}

fn lower_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str().map(str::to_lowercase),
            _ => None,
        })
        .collect()
}

/// Last `**Key:** value` line whose key matches `key` case-insensitively.
fn metadata_value(text: &str, key: &str) -> Option<String> {
    let mut found = None;
    for line in text.lines() {
        let mut rest = line;
        while let Some(start) = rest.find("**") {
            let after = &rest[start + 2..];
            let Some(end) = after.find(":**") else {
                break;
            };
            let name = after[..end].trim();
            let tail = &after[end + 3..];
            if name.eq_ignore_ascii_case(key) {
                let value = tail.trim();
                if !value.is_empty() {
                    found = Some(value.to_string());
                }
            }
            rest = tail;
        }
    }
    found
}

/// Writes documents into the chunk store.
pub struct Ingestor {
    store: ChunkStore,
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_size: usize,
    overlap: usize,
}

impl Ingestor {
    pub fn new(
        store: ChunkStore,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
        }
    }

    /// Ingest one document.
    ///
    /// Empty text and an unchanged content hash are skipped. A changed hash
    /// replaces every chunk and image of the document in one transaction.
    pub async fn ingest(&self, input: DocumentInput) -> AppResult<IngestOutcome> {
        let text = input.text.trim().to_string();
        if text.is_empty() {
            tracing::debug!("Skipping empty document {}", input.source);
            return Ok(IngestOutcome::skipped(None));
        }

        let hash = content_hash(&text);
        let source = input.source.clone();
        let existing = self
            .store
            .with_session(move |s| s.find_document(&source))
            .await?;
        if let Some(doc) = existing.as_ref().filter(|d| d.content_hash == hash) {
            tracing::debug!("Unchanged document {}, skipping", input.source);
            return Ok(IngestOutcome::skipped(Some(doc.id)));
        }

        let path = Path::new(&input.source);
        let domain = input
            .domain
            .clone()
            .unwrap_or_else(|| infer_domain(path).to_string());
        let department = input
            .department
            .clone()
            .unwrap_or_else(|| infer_department(path, &text));
        let client_tag = input
            .client_tag
            .clone()
            .unwrap_or_else(|| DEFAULT_CLIENT_TAG.to_string());

        let pieces = chunk_text(&text, self.chunk_size, self.overlap)?;
        let embeddings = self.embedder.embed_batch(&pieces).await?;
        if embeddings.len() != pieces.len() {
            return Err(AppError::Embedding(format!(
                "Expected {} embeddings, got {}",
                pieces.len(),
                embeddings.len()
            )));
        }

        let expected = self.embedder.dimensions();
        let mut chunks = Vec::with_capacity(pieces.len());
        for (text, embedding) in pieces.into_iter().zip(embeddings) {
            if embedding.len() != expected {
                return Err(AppError::EmbeddingShape {
                    expected,
                    actual: embedding.len(),
                });
            }
            chunks.push(NewChunk { text, embedding });
        }

        let images = self.prepare_images(&input).await;

        let chunk_count = chunks.len();
        let image_count = images.len();
        let source = input.source.clone();
        let result = self
            .store
            .with_session(move |s| {
                s.replace_document(
                    &DocumentUpsert {
                        source_path: &source,
                        domain: &domain,
                        department: &department,
                        content_hash: &hash,
                        content: &text,
                        client_tag: &client_tag,
                    },
                    &chunks,
                    &images,
                )
            })
            .await?;

        let action = if result.created {
            IngestAction::Created
        } else {
            IngestAction::Updated
        };
        tracing::info!(
            source = %input.source,
            chunks = chunk_count,
            images = image_count,
            "Document {:?}",
            action
        );

        Ok(IngestOutcome {
            action,
            document_id: Some(result.document_id),
            chunks: chunk_count,
            images: image_count,
        })
    }

    /// Delete a document and everything it owns. Returns false if it was absent.
    pub async fn remove(&self, source: &str) -> AppResult<bool> {
        let source = source.to_string();
        let removed = self
            .store
            .with_session(move |s| s.delete_document(&source))
            .await?;
        tracing::debug!(removed, "Remove document");
        Ok(removed)
    }

    /// Embed image descriptions. An image whose description cannot be
    /// embedded is still stored, without a vector.
    async fn prepare_images(&self, input: &DocumentInput) -> Vec<NewImage> {
        let mut images = Vec::with_capacity(input.images.len());
        for image in &input.images {
            let embedding = match image.description.as_deref().map(str::trim) {
                Some(description) if !description.is_empty() => {
                    match self.embedder.embed(description).await {
                        Ok(v) => Some(v),
                        Err(e) => {
                            tracing::warn!(
                                "Failed to embed description of {}: {}",
                                image.filename,
                                e
                            );
                            None
                        }
                    }
                }
                _ => None,
            };
            images.push(NewImage {
                input: image.clone(),
                embedding,
            });
        }
        images
    }
}
