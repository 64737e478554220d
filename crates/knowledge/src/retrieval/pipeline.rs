//! The retrieval entry point.
//!
//! A request flows through query expansion, then one task per expanded query
//! (embed, hybrid search, MMR, rerank) running concurrently, then a merge
//! keyed by chunk id, the image lookup and context assembly. Only malformed
//! requests are errors; every transport failure shrinks the result instead.

use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::retrieval::assemble::assemble;
use crate::retrieval::expand::QueryExpander;
use crate::retrieval::hybrid::HybridSearcher;
use crate::retrieval::mmr::mmr_select;
use crate::retrieval::rerank::Reranker;
use crate::store::ChunkStore;
use crate::types::{
    ChunkImage, ImageMatch, RetrievalCandidate, RetrievalMeta, RetrievalOutput, RetrieveRequest,
    SearchFilters,
};
use groundwork_core::{AppConfig, AppError, AppResult, LlmSettings, RetrievalConfig};
use groundwork_llm::{create_client, LlmClient};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Smallest per-channel pool searched for any query.
pub const MIN_POOL_SIZE: usize = 40;

/// Domain label handed to the expander when the request has none.
const DEFAULT_DOMAIN: &str = "general";

/// Default similarity floor for [`Retriever::search_images`].
pub const DEFAULT_IMAGE_SIMILARITY: f32 = 0.7;

/// What one expanded query contributed.
#[derive(Debug, Default)]
struct QueryRun {
    candidates: Vec<RetrievalCandidate>,
    fused: usize,
    semantic_hits: usize,
    lexical_hits: usize,
    rerank_applied: bool,
}

pub struct Retriever {
    store: ChunkStore,
    embedder: Arc<dyn EmbeddingProvider>,
    searcher: HybridSearcher,
    expander: QueryExpander,
    reranker: Reranker,
    default_lambda: f32,
    embed_timeout: Duration,
}

impl Retriever {
    /// Assemble a retriever from already-built collaborators.
    pub fn new(
        store: ChunkStore,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmClient>,
        llm_settings: &LlmSettings,
        config: &RetrievalConfig,
        embed_timeout: Duration,
    ) -> Self {
        let expander = QueryExpander::new(
            Arc::clone(&llm),
            llm_settings.chat_model.clone(),
            config.query_expansion,
            Duration::from_secs(llm_settings.timeout_secs.max(1)),
        );
        let reranker = Reranker::new(llm, llm_settings, config);

        Self {
            searcher: HybridSearcher::new(store.clone()),
            store,
            embedder,
            expander,
            reranker,
            default_lambda: config.mmr_lambda,
            embed_timeout,
        }
    }

    /// Open the configured store and build both gateways from `config`.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let store = ChunkStore::open(config.database_path(), &config.retrieval).await?;
        let embedder = create_provider(&config.embedding)?;
        let llm = create_client(&config.llm)?;

        Ok(Self::new(
            store,
            embedder,
            llm,
            &config.llm,
            &config.retrieval,
            Duration::from_secs(config.embedding.timeout_secs.max(1)),
        ))
    }

    /// Run the full retrieval pipeline for one request.
    ///
    /// # Errors
    /// `AppError::InvalidRequest` for an empty query, `top_k == 0` or a lambda
    /// outside `[0, 1]`. A query that fails with a non-recoverable error (see
    /// [`AppError::is_recoverable`]) fails the call; recoverable failures are
    /// counted in `failed_queries` and skipped.
    pub async fn retrieve(&self, request: RetrieveRequest) -> AppResult<RetrievalOutput> {
        let started = Instant::now();
        let lambda = request.mmr_lambda.unwrap_or(self.default_lambda);
        validate(&request, lambda)?;

        let domain = request
            .domain
            .as_deref()
            .filter(|d| !d.trim().is_empty() && *d != "all")
            .unwrap_or(DEFAULT_DOMAIN);
        let queries = self.expander.expand(request.query.trim(), domain).await;

        let per_query_k = (request.top_k / queries.len().max(1)).max(2);
        let pool_size = (per_query_k * 6).max(MIN_POOL_SIZE);
        let filters = request.filters();

        let runs = futures::future::join_all(
            queries
                .iter()
                .map(|q| self.run_query(q, &filters, pool_size, per_query_k, lambda)),
        )
        .await;

        let mut meta = RetrievalMeta {
            pool_size,
            mmr_lambda: lambda,
            queries_expanded: queries.len(),
            ..Default::default()
        };
        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for (query, run) in queries.iter().zip(runs) {
            let run = match run {
                Ok(run) => run,
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    tracing::warn!("Retrieval for expanded query '{}' failed: {}", query, e);
                    meta.failed_queries += 1;
                    continue;
                }
            };

            meta.fused_candidates += run.fused;
            meta.semantic_hits += run.semantic_hits;
            meta.lexical_hits += run.lexical_hits;
            meta.rerank_applied |= run.rerank_applied;

            for candidate in run.candidates {
                if seen.insert(candidate.chunk_id) {
                    selected.push(candidate);
                }
            }
        }

        let images = self.images_for(&selected).await;
        let (citations, context_text) = assemble(&selected, &images);

        meta.selected = citations.len();
        meta.images_found = images.len();
        meta.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            queries = meta.queries_expanded,
            failed = meta.failed_queries,
            fused = meta.fused_candidates,
            lexical_hits = meta.lexical_hits,
            selected = meta.selected,
            rerank = meta.rerank_applied,
            elapsed_ms = meta.elapsed_ms,
            "Retrieval complete"
        );

        Ok(RetrievalOutput {
            citations,
            context_text,
            meta,
        })
    }

    /// Images whose description is similar to `query`, best first.
    pub async fn search_images(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> AppResult<Vec<ImageMatch>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Image search query must not be empty".to_string(),
            ));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embed_query(query).await?;
        self.store
            .with_session(move |s| s.search_images(&embedding, top_k, min_similarity))
            .await
    }

    async fn run_query(
        &self,
        query: &str,
        filters: &SearchFilters,
        pool_size: usize,
        per_query_k: usize,
        lambda: f32,
    ) -> AppResult<QueryRun> {
        let embedding = self.embed_query(query).await?;

        let hybrid = self
            .searcher
            .search(query, embedding.clone(), pool_size, filters)
            .await;
        let fused = hybrid.candidates.len();

        let diverse_k = (per_query_k * 3).min(fused);
        let diverse = mmr_select(&embedding, hybrid.candidates, diverse_k, lambda);
        let reranked = self.reranker.rerank(query, diverse, per_query_k).await;

        tracing::debug!(
            query,
            fused,
            kept = reranked.candidates.len(),
            "Expanded query retrieved"
        );

        Ok(QueryRun {
            candidates: reranked.candidates,
            fused,
            semantic_hits: hybrid.semantic_hits,
            lexical_hits: hybrid.lexical_hits,
            rerank_applied: reranked.applied,
        })
    }

    async fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        let embedding = tokio::time::timeout(self.embed_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "Query embedding exceeded {}s",
                    self.embed_timeout.as_secs()
                ))
            })??;

        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            return Err(AppError::EmbeddingShape {
                expected,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    async fn images_for(&self, selected: &[RetrievalCandidate]) -> Vec<ChunkImage> {
        if selected.is_empty() {
            return Vec::new();
        }

        let chunk_ids: Vec<i64> = selected.iter().map(|c| c.chunk_id).collect();
        self.store
            .with_session(move |s| s.images_for_chunks(&chunk_ids))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Image lookup failed, continuing without images: {}", e);
                Vec::new()
            })
    }
}

fn validate(request: &RetrieveRequest, lambda: f32) -> AppResult<()> {
    if request.query.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Query text must not be empty".to_string(),
        ));
    }
    if request.top_k == 0 {
        return Err(AppError::InvalidRequest(
            "top_k must be at least 1".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&lambda) {
        return Err(AppError::InvalidRequest(format!(
            "mmr_lambda must be within [0, 1], got {}",
            lambda
        )));
    }
    Ok(())
}
