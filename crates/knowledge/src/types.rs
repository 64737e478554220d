//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which search channel surfaced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Vector similarity only
    Semantic,
    /// Full-text match only
    Lexical,
    /// Found by both channels
    Hybrid,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Semantic => "semantic",
            Channel::Lexical => "lexical",
            Channel::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk row as returned by either search channel.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub chunk_id: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Parent document's source identifier
    pub source: String,
    /// Parent document's domain tag
    pub domain: String,
}

/// The unit that flows through the retrieval pipeline. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalCandidate {
    pub chunk_id: i64,
    pub text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub source: String,
    pub domain: String,
    pub channel: Channel,
    /// Fused reciprocal-rank score
    pub score: f64,
}

impl RetrievalCandidate {
    pub fn from_stored(chunk: StoredChunk, channel: Channel) -> Self {
        Self {
            chunk_id: chunk.chunk_id,
            text: chunk.text,
            embedding: chunk.embedding,
            source: chunk.source,
            domain: chunk.domain,
            channel,
            score: 0.0,
        }
    }
}

/// Equality filters applied identically to both search channels.
///
/// The literal `"all"` (case-insensitive) disables a filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub domain: Option<String>,
    pub departments: Option<Vec<String>>,
    pub client_tag: Option<String>,
}

impl SearchFilters {
    /// Effective domain filter.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref().filter(|d| is_active(d))
    }

    /// Effective department filter; `None` when empty or containing `"all"`.
    pub fn departments(&self) -> Option<&[String]> {
        let departments = self.departments.as_deref()?;
        if departments.is_empty() || departments.iter().any(|d| !is_active(d)) {
            return None;
        }
        Some(departments)
    }

    /// Effective client isolation tag.
    pub fn client_tag(&self) -> Option<&str> {
        self.client_tag.as_deref().filter(|t| is_active(t))
    }
}

fn is_active(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.eq_ignore_ascii_case("all")
}

/// Image metadata stored alongside a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: i64,
    pub filename: String,
    pub storage_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// An image linked to a specific chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkImage {
    pub chunk_id: i64,
    #[serde(flatten)]
    pub image: ImageRecord,
}

/// An image found by description similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMatch {
    #[serde(flatten)]
    pub image: ImageRecord,
    pub similarity: f32,
}

/// One citation per selected candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub chunk_id: i64,
    pub source: String,
    pub domain: String,
    pub title: String,
    pub snippet: String,
    pub text: String,
    pub channel: Channel,
    pub images: Vec<ChunkImage>,
}

/// Observability data for one retrieval. Not used for correctness.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalMeta {
    /// Per-channel pool size searched
    pub pool_size: usize,
    /// Fused candidates across all expanded queries
    pub fused_candidates: usize,
    pub semantic_hits: usize,
    pub lexical_hits: usize,
    pub selected: usize,
    pub mmr_lambda: f32,
    /// Whether at least one reranker call produced a usable ordering
    pub rerank_applied: bool,
    pub elapsed_ms: u64,
    pub images_found: usize,
    pub queries_expanded: usize,
    pub failed_queries: usize,
}

/// Result of the retrieval entry point. Always well-formed, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalOutput {
    pub citations: Vec<Citation>,
    pub context_text: String,
    pub meta: RetrievalMeta,
}

/// Arguments of the retrieval entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub top_k: usize,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub departments: Option<Vec<String>>,
    /// Overrides the configured MMR lambda
    #[serde(default)]
    pub mmr_lambda: Option<f32>,
    /// Only chunks ingested under this client tag
    #[serde(default)]
    pub client_tag: Option<String>,
}

impl RetrieveRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            domain: None,
            departments: None,
            mmr_lambda: None,
            client_tag: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_departments(mut self, departments: Vec<String>) -> Self {
        self.departments = Some(departments);
        self
    }

    pub fn with_mmr_lambda(mut self, lambda: f32) -> Self {
        self.mmr_lambda = Some(lambda);
        self
    }

    pub fn with_client_tag(mut self, client_tag: impl Into<String>) -> Self {
        self.client_tag = Some(client_tag.into());
        self
    }

    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            domain: self.domain.clone(),
            departments: self.departments.clone(),
            client_tag: self.client_tag.clone(),
        }
    }
}

/// A stored document row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub source_path: String,
    pub domain: String,
    pub department: String,
    pub content_hash: String,
    pub client_tag: String,
    pub updated_at: DateTime<Utc>,
}

/// An image supplied with a document at ingestion time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
    pub filename: String,
    pub storage_path: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub source_page: Option<i64>,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// A document to ingest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInput {
    /// Unique source identifier (path or URL)
    pub source: String,
    pub text: String,
    /// Inferred from the source path when absent
    #[serde(default)]
    pub domain: Option<String>,
    /// Inferred from the path and metadata lines when absent
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub client_tag: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageInput>,
}

impl DocumentInput {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            ..Default::default()
        }
    }
}

/// What ingestion did with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestAction {
    Created,
    Updated,
    /// Unchanged content hash or empty text
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub action: IngestAction,
    pub document_id: Option<i64>,
    pub chunks: usize,
    pub images: usize,
}

impl IngestOutcome {
    pub fn skipped(document_id: Option<i64>) -> Self {
        Self {
            action: IngestAction::Skipped,
            document_id,
            chunks: 0,
            images: 0,
        }
    }
}

/// Row counts of the chunk store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: u64,
    pub chunks: u64,
    pub images: u64,
    pub db_size_bytes: u64,
}
