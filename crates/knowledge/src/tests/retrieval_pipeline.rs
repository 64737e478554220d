//! End-to-end retrieval over a tempfile store with offline embeddings.

use crate::embeddings::providers::TrigramProvider;
use crate::embeddings::EmbeddingProvider;
use crate::ingest::Ingestor;
use crate::retrieval::{Retriever, CONTEXT_SEPARATOR};
use crate::store::ChunkStore;
use crate::types::{Channel, DocumentInput, ImageInput, RetrieveRequest};
use groundwork_core::{AppError, AppResult, LlmSettings, RetrievalConfig};
use groundwork_llm::MockLlmClient;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DIMENSIONS: usize = 128;

struct Fixture {
    _temp: TempDir,
    store: ChunkStore,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Fixture {
    async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = ChunkStore::open(temp.path().join("index.sqlite"), &RetrievalConfig::default())
            .await
            .unwrap();
        Self {
            _temp: temp,
            store,
            embedder: Arc::new(TrigramProvider::new(DIMENSIONS)),
        }
    }

    async fn with_corpus() -> Self {
        let fixture = Self::new().await;
        let ingestor = Ingestor::new(
            fixture.store.clone(),
            Arc::clone(&fixture.embedder),
            &RetrievalConfig::default(),
        );

        let mut payables = DocumentInput::new(
            "kb/finance/payables.md",
            "# Accounts Payable\n\nVendor invoices are posted daily after approval.",
        );
        payables.images = vec![ImageInput {
            filename: "invoice-journal.png".to_string(),
            storage_path: "/images/invoice-journal.png".to_string(),
            description: Some("Invoice journal posting screen".to_string()),
            ..Default::default()
        }];

        for input in [
            payables,
            DocumentInput::new(
                "kb/hr/leave.md",
                "# Leave Policy\n\nAnnual leave requests need manager approval.",
            ),
            DocumentInput::new(
                "kb/it/patching.md",
                "# Patching\n\nServers are patched every second weekend.",
            ),
        ] {
            ingestor.ingest(input).await.unwrap();
        }

        fixture
    }

    fn retriever(
        &self,
        client: Arc<MockLlmClient>,
        expansion: bool,
        rerank: bool,
    ) -> Retriever {
        self.retriever_with(Arc::clone(&self.embedder), client, expansion, rerank)
    }

    fn retriever_with(
        &self,
        embedder: Arc<dyn EmbeddingProvider>,
        client: Arc<MockLlmClient>,
        expansion: bool,
        rerank: bool,
    ) -> Retriever {
        let config = RetrievalConfig {
            query_expansion: expansion,
            rerank_enabled: rerank,
            ..Default::default()
        };
        Retriever::new(
            self.store.clone(),
            embedder,
            client,
            &LlmSettings::default(),
            &config,
            Duration::from_secs(5),
        )
    }
}

/// Trigram embeddings, except for one text that always fails.
#[derive(Debug)]
struct FailingEmbedder {
    inner: TrigramProvider,
    fail_on: &'static str,
    recoverable: bool,
}

impl FailingEmbedder {
    fn new(fail_on: &'static str, recoverable: bool) -> Self {
        Self {
            inner: TrigramProvider::new(DIMENSIONS),
            fail_on,
            recoverable,
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn provider_name(&self) -> &str {
        "failing"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t == self.fail_on) {
            return Err(if self.recoverable {
                AppError::Embedding("model unloaded".to_string())
            } else {
                AppError::Config("embedding endpoint is not configured".to_string())
            });
        }
        self.inner.embed_batch(texts).await
    }
}

fn sources(output: &crate::types::RetrievalOutput) -> Vec<&str> {
    output.citations.iter().map(|c| c.source.as_str()).collect()
}

#[tokio::test]
async fn test_best_match_comes_first() {
    let fixture = Fixture::with_corpus().await;
    let client = Arc::new(MockLlmClient::new());
    let retriever = fixture.retriever(client.clone(), false, false);

    let output = retriever
        .retrieve(RetrieveRequest::new("vendor invoice posting", 2))
        .await
        .unwrap();

    assert_eq!(output.citations.len(), 2);
    let top = &output.citations[0];
    assert_eq!(top.source, "kb/finance/payables.md");
    assert_eq!(top.channel, Channel::Hybrid);
    assert!(top.text.starts_with("[Document: Accounts Payable] # Accounts Payable"));

    assert!(output.context_text.starts_with("- (kb/finance/payables.md :: chunk "));
    assert!(output
        .context_text
        .contains("[IMAGE DESCRIPTION (invoice-journal.png): Invoice journal posting screen]"));
    assert_eq!(output.context_text.matches(CONTEXT_SEPARATOR).count(), 1);

    let meta = &output.meta;
    assert_eq!(meta.queries_expanded, 1);
    assert_eq!(meta.failed_queries, 0);
    assert_eq!(meta.pool_size, 40);
    assert_eq!(meta.selected, 2);
    assert_eq!(meta.lexical_hits, 1);
    assert_eq!(meta.semantic_hits, 3);
    assert_eq!(meta.fused_candidates, 3);
    assert_eq!(meta.images_found, 1);
    assert!(!meta.rerank_applied);
    assert!((meta.mmr_lambda - 0.7).abs() < 1e-6);
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_department_filter() {
    let fixture = Fixture::with_corpus().await;
    let retriever = fixture.retriever(Arc::new(MockLlmClient::new()), false, false);

    let output = retriever
        .retrieve(
            RetrieveRequest::new("approval", 5).with_departments(vec!["hr".to_string()]),
        )
        .await
        .unwrap();

    assert_eq!(sources(&output), vec!["kb/hr/leave.md"]);
}

#[tokio::test]
async fn test_expanded_queries_are_merged_without_duplicates() {
    let fixture = Fixture::with_corpus().await;
    let client = Arc::new(MockLlmClient::with_responses([
        "```json\n{\"queries\": [\"accounts payable invoices\", \"server patching\"]}\n```",
    ]));
    let retriever = fixture.retriever(client.clone(), true, false);

    let output = retriever
        .retrieve(RetrieveRequest::new("vendor invoice posting", 6).with_domain("general"))
        .await
        .unwrap();

    assert_eq!(output.meta.queries_expanded, 3);
    assert_eq!(output.meta.failed_queries, 0);
    assert_eq!(output.meta.pool_size, 40);

    let ids: Vec<i64> = output.citations.iter().map(|c| c.chunk_id).collect();
    let unique: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert_eq!(output.citations[0].source, "kb/finance/payables.md");
    assert!(output.citations.len() >= 2);

    assert_eq!(
        client.requests()[0].prompt,
        "Domain: general\nOriginal Query: vendor invoice posting"
    );
}

#[tokio::test]
async fn test_model_failures_degrade_to_plain_retrieval() {
    let fixture = Fixture::with_corpus().await;
    let baseline = fixture
        .retriever(Arc::new(MockLlmClient::new()), false, false)
        .retrieve(RetrieveRequest::new("vendor invoice posting", 2))
        .await
        .unwrap();

    let client = Arc::new(MockLlmClient::new());
    client.push_err("expansion timed out");
    client.push_ok("The first passage looks best.");
    let degraded = fixture
        .retriever(client.clone(), true, true)
        .retrieve(RetrieveRequest::new("vendor invoice posting", 2))
        .await
        .unwrap();

    assert_eq!(client.call_count(), 2);
    assert_eq!(degraded.meta.queries_expanded, 1);
    assert!(!degraded.meta.rerank_applied);
    assert_eq!(degraded.citations, baseline.citations);
    assert_eq!(degraded.context_text, baseline.context_text);
}

#[tokio::test]
async fn test_rerank_reorders_selection() {
    let fixture = Fixture::with_corpus().await;
    let baseline = fixture
        .retriever(Arc::new(MockLlmClient::new()), false, false)
        .retrieve(RetrieveRequest::new("vendor invoice posting", 2))
        .await
        .unwrap();

    let client = Arc::new(MockLlmClient::with_responses([
        r#"{"scores": [{"i": 0, "score": 15}, {"i": 1, "score": 92}]}"#,
    ]));
    let reranked = fixture
        .retriever(client, false, true)
        .retrieve(RetrieveRequest::new("vendor invoice posting", 2))
        .await
        .unwrap();

    assert!(reranked.meta.rerank_applied);
    assert_eq!(reranked.citations[0], baseline.citations[1]);
    assert_eq!(reranked.citations[1], baseline.citations[0]);
}

#[tokio::test]
async fn test_empty_store_returns_empty_output() {
    let fixture = Fixture::new().await;
    let retriever = fixture.retriever(Arc::new(MockLlmClient::new()), false, false);

    let output = retriever
        .retrieve(RetrieveRequest::new("anything at all", 5))
        .await
        .unwrap();

    assert!(output.citations.is_empty());
    assert!(output.context_text.is_empty());
    assert_eq!(output.meta.fused_candidates, 0);
    assert_eq!(output.meta.selected, 0);
}

#[tokio::test]
async fn test_malformed_requests_are_rejected() {
    let fixture = Fixture::new().await;
    let retriever = fixture.retriever(Arc::new(MockLlmClient::new()), false, false);

    for request in [
        RetrieveRequest::new("", 5),
        RetrieveRequest::new("query", 0),
        RetrieveRequest::new("query", 5).with_mmr_lambda(2.0),
    ] {
        let result = retriever.retrieve(request).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }
}

#[tokio::test]
async fn test_search_images_by_description() {
    let fixture = Fixture::with_corpus().await;
    let retriever = fixture.retriever(Arc::new(MockLlmClient::new()), false, false);

    let matches = retriever
        .search_images("Invoice journal posting screen", 5, 0.7)
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].image.filename, "invoice-journal.png");
    assert!(matches[0].similarity > 0.99);

    let none = retriever
        .search_images("weekend server maintenance", 5, 0.7)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_failed_expanded_query_is_counted_and_skipped() {
    let fixture = Fixture::with_corpus().await;
    let client = Arc::new(MockLlmClient::with_responses([
        r#"{"queries": ["broken query"]}"#,
    ]));
    let retriever = fixture.retriever_with(
        Arc::new(FailingEmbedder::new("broken query", true)),
        client,
        true,
        false,
    );

    let output = retriever
        .retrieve(RetrieveRequest::new("vendor invoice posting", 4))
        .await
        .unwrap();

    assert_eq!(output.meta.queries_expanded, 2);
    assert_eq!(output.meta.failed_queries, 1);
    assert!(!output.citations.is_empty());
    assert_eq!(output.citations[0].source, "kb/finance/payables.md");
}

#[tokio::test]
async fn test_non_recoverable_query_failure_is_returned() {
    let fixture = Fixture::with_corpus().await;
    let retriever = fixture.retriever_with(
        Arc::new(FailingEmbedder::new("vendor invoice posting", false)),
        Arc::new(MockLlmClient::new()),
        false,
        false,
    );

    let result = retriever
        .retrieve(RetrieveRequest::new("vendor invoice posting", 4))
        .await;

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[tokio::test]
async fn test_client_tag_isolates_documents() {
    let fixture = Fixture::new().await;
    let ingestor = Ingestor::new(
        fixture.store.clone(),
        Arc::clone(&fixture.embedder),
        &RetrievalConfig::default(),
    );

    for (path, text, client) in [
        (
            "kb/finance/acme-invoices.md",
            "# Acme Invoices\n\nVendor invoices are posted after two approvals.",
            "acme",
        ),
        (
            "kb/finance/globex-invoices.md",
            "# Globex Invoices\n\nVendor invoices are posted by the shared service centre.",
            "globex",
        ),
    ] {
        let mut input = DocumentInput::new(path, text);
        input.client_tag = Some(client.to_string());
        ingestor.ingest(input).await.unwrap();
    }

    let retriever = fixture.retriever(Arc::new(MockLlmClient::new()), false, false);

    let unscoped = retriever
        .retrieve(RetrieveRequest::new("vendor invoices posted", 5))
        .await
        .unwrap();
    assert_eq!(unscoped.citations.len(), 2);

    let scoped = retriever
        .retrieve(RetrieveRequest::new("vendor invoices posted", 5).with_client_tag("globex"))
        .await
        .unwrap();
    assert_eq!(sources(&scoped), vec!["kb/finance/globex-invoices.md"]);
}
