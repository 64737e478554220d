//! Query expansion through alternate technical phrasings.

use groundwork_llm::{parse_payload, LlmClient, LlmRequest, Parsed};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on queries returned, original included.
pub const MAX_EXPANDED_QUERIES: usize = 5;

const EXPAND_SYSTEM: &str = "You are a search query optimizer. Expand the user query into 3-4 \
specific, technical search phrasings that would help find relevant passages in a specialized \
business knowledge base. Return STRICT JSON only: {\"queries\": [\"expanded 1\", \"expanded 2\"]}";

#[derive(Debug, Deserialize)]
struct QueriesPayload {
    #[serde(default)]
    queries: Vec<serde_json::Value>,
}

pub struct QueryExpander {
    client: Arc<dyn LlmClient>,
    model: String,
    enabled: bool,
    timeout: Duration,
}

impl QueryExpander {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        enabled: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            enabled,
            timeout,
        }
    }

    /// Original query first, then distinct reformulations, at most
    /// [`MAX_EXPANDED_QUERIES`] in total. Any failure yields `[query]`.
    pub async fn expand(&self, query: &str, domain: &str) -> Vec<String> {
        let original = vec![query.to_string()];
        if !self.enabled {
            return original;
        }

        let request = LlmRequest::new(
            format!("Domain: {}\nOriginal Query: {}", domain, query),
            &self.model,
        )
        .with_system(EXPAND_SYSTEM)
        .with_timeout(self.timeout);

        let content = match self.client.complete(&request).await {
            Ok(response) => response.content,
            Err(e) => {
                tracing::warn!("Query expansion failed, using original query: {}", e);
                return original;
            }
        };

        match parse_payload::<QueriesPayload>(&content) {
            Parsed::Structured(payload) => {
                let expanded = merge_queries(query, &payload.queries);
                tracing::debug!(count = expanded.len(), "Expanded query");
                expanded
            }
            Parsed::Fallback { reason } => {
                tracing::warn!("Unparseable expansion response, using original query: {}", reason);
                original
            }
        }
    }
}

fn merge_queries(query: &str, candidates: &[serde_json::Value]) -> Vec<String> {
    let mut queries = vec![query.to_string()];
    for candidate in candidates.iter().filter_map(|v| v.as_str()) {
        if queries.len() >= MAX_EXPANDED_QUERIES {
            break;
        }
        let candidate = candidate.trim();
        if !candidate.is_empty() && !queries.iter().any(|q| q.trim() == candidate) {
            queries.push(candidate.to_string());
        }
    }
    queries
}
