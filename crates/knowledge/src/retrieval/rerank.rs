//! Optional language-model reranking of a bounded candidate pool.

use crate::types::RetrievalCandidate;
use groundwork_core::{LlmSettings, RetrievalConfig};
use groundwork_llm::{parse_payload, LlmClient, LlmRequest, Parsed};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Characters of candidate text shown to the scorer.
pub const RERANK_TEXT_BUDGET: usize = 800;

const RERANK_SYSTEM: &str = r#"You are a precision relevance scorer for a retrieval system.
Evaluate each candidate snippet against the user query.
Assign a score from 0 to 100 where:
- 100: Evidence is perfect and directly answers the query.
- 70-99: Evidence is strongly relevant but may miss small details.
- 40-69: Evidence is tangential; related to the topic but does not answer the query.
- 0-39: Evidence is irrelevant, a mismatch, or generic noise.

Return ONLY a JSON object in this exact format:
{"scores": [{"i": int, "score": int}]}"#;

/// Reordered candidates and whether the model's scores were used.
#[derive(Debug, Clone, Default)]
pub struct RerankOutcome {
    pub candidates: Vec<RetrievalCandidate>,
    pub applied: bool,
}

#[derive(Debug, Deserialize)]
struct ScoresPayload {
    #[serde(default)]
    scores: Vec<Value>,
}

/// Scores candidates with a single model call and reorders by score.
///
/// Disabled, this is truncation to `top_k`. Any transport or parse failure
/// falls back to the pre-rerank order.
pub struct Reranker {
    client: Arc<dyn LlmClient>,
    model: String,
    enabled: bool,
    pool_size: usize,
    timeout: Duration,
}

impl Reranker {
    pub fn new(client: Arc<dyn LlmClient>, llm: &LlmSettings, config: &RetrievalConfig) -> Self {
        Self {
            client,
            model: llm.rerank_model().to_string(),
            enabled: config.rerank_enabled,
            pool_size: config.rerank_pool_size.max(1),
            timeout: Duration::from_secs(llm.timeout_secs.max(1)),
        }
    }

    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<RetrievalCandidate>,
        top_k: usize,
    ) -> RerankOutcome {
        if !self.enabled || candidates.is_empty() {
            candidates.truncate(top_k);
            return RerankOutcome {
                candidates,
                applied: false,
            };
        }

        let pool_len = top_k
            .max(candidates.len().min(self.pool_size))
            .min(candidates.len());
        candidates.truncate(pool_len);
        let pool = candidates;

        let request = LlmRequest::new(build_prompt(query, &pool), &self.model)
            .with_system(RERANK_SYSTEM)
            .with_temperature(0.0)
            .with_timeout(self.timeout);

        let content = match self.client.complete(&request).await {
            Ok(response) => response.content,
            Err(e) => {
                tracing::warn!("Reranker call failed, keeping retrieval order: {}", e);
                return fallback(pool, top_k);
            }
        };

        let scores = match parse_payload::<ScoresPayload>(&content) {
            Parsed::Structured(payload) => collect_scores(&payload.scores),
            Parsed::Fallback { reason } => {
                tracing::warn!("Unparseable reranker response, keeping retrieval order: {}", reason);
                return fallback(pool, top_k);
            }
        };
        if scores.is_empty() {
            tracing::warn!("Reranker returned no usable scores, keeping retrieval order");
            return fallback(pool, top_k);
        }

        let mut ranked: Vec<(f64, RetrievalCandidate)> = pool
            .into_iter()
            .enumerate()
            .map(|(i, c)| (scores.get(&i).copied().unwrap_or(0.0), c))
            .collect();
        // Stable: equal scores keep retrieval order
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);

        tracing::debug!(scored = scores.len(), kept = ranked.len(), "Reranked candidates");

        RerankOutcome {
            candidates: ranked.into_iter().map(|(_, c)| c).collect(),
            applied: true,
        }
    }
}

fn fallback(mut pool: Vec<RetrievalCandidate>, top_k: usize) -> RerankOutcome {
    pool.truncate(top_k);
    RerankOutcome {
        candidates: pool,
        applied: false,
    }
}

fn build_prompt(query: &str, pool: &[RetrievalCandidate]) -> String {
    let items: Vec<Value> = pool
        .iter()
        .enumerate()
        .map(|(i, c)| {
            json!({
                "i": i,
                "source": c.source,
                "chunk_id": c.chunk_id,
                "text": c.text.chars().take(RERANK_TEXT_BUDGET).collect::<String>(),
            })
        })
        .collect();

    json!({ "query": query, "candidates": items }).to_string()
}

/// Index to score map. Entries without a usable index or score are skipped;
/// a repeated index keeps its last score.
fn collect_scores(entries: &[Value]) -> HashMap<usize, f64> {
    let mut scores = HashMap::new();
    for entry in entries {
        let index = entry.get("i").and_then(as_number).filter(|i| *i >= 0.0);
        let score = entry.get("score").and_then(as_number);
        if let (Some(index), Some(score)) = (index, score) {
            scores.insert(index as usize, score);
        }
    }
    scores
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
