//! Dual-channel search and Reciprocal Rank Fusion.

use crate::store::ChunkStore;
use crate::types::{Channel, RetrievalCandidate, SearchFilters, StoredChunk};
use std::collections::HashMap;

/// RRF smoothing constant.
pub const RRF_K: f64 = 60.0;

/// Fused candidates plus per-channel hit counts.
#[derive(Debug, Clone, Default)]
pub struct HybridResults {
    pub candidates: Vec<RetrievalCandidate>,
    pub semantic_hits: usize,
    pub lexical_hits: usize,
}

/// Fuse two rankings with Reciprocal Rank Fusion.
///
/// A candidate at 0-based rank `i` in a channel contributes
/// `1 / (RRF_K + i + 1)`. Output is sorted by descending total; equal totals
/// keep insertion order (semantic ranking first, then lexical-only hits).
pub fn reciprocal_rank_fusion(
    semantic: Vec<StoredChunk>,
    lexical: Vec<StoredChunk>,
) -> Vec<RetrievalCandidate> {
    let mut fused: Vec<RetrievalCandidate> = Vec::with_capacity(semantic.len() + lexical.len());
    let mut position: HashMap<i64, usize> = HashMap::new();

    for (rank, chunk) in semantic.into_iter().enumerate() {
        let contribution = rrf_contribution(rank);
        match position.get(&chunk.chunk_id) {
            Some(&idx) => fused[idx].score += contribution,
            None => {
                position.insert(chunk.chunk_id, fused.len());
                let mut candidate = RetrievalCandidate::from_stored(chunk, Channel::Semantic);
                candidate.score = contribution;
                fused.push(candidate);
            }
        }
    }

    for (rank, chunk) in lexical.into_iter().enumerate() {
        let contribution = rrf_contribution(rank);
        match position.get(&chunk.chunk_id) {
            Some(&idx) => {
                let existing = &mut fused[idx];
                existing.score += contribution;
                if existing.channel == Channel::Semantic {
                    existing.channel = Channel::Hybrid;
                }
            }
            None => {
                position.insert(chunk.chunk_id, fused.len());
                let mut candidate = RetrievalCandidate::from_stored(chunk, Channel::Lexical);
                candidate.score = contribution;
                fused.push(candidate);
            }
        }
    }

    // Stable: equal scores keep insertion order
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}

fn rrf_contribution(rank: usize) -> f64 {
    1.0 / (RRF_K + rank as f64 + 1.0)
}

/// Runs the semantic and lexical channels against the chunk store.
#[derive(Debug, Clone)]
pub struct HybridSearcher {
    store: ChunkStore,
}

impl HybridSearcher {
    pub fn new(store: ChunkStore) -> Self {
        Self { store }
    }

    /// Search both channels and fuse the results.
    ///
    /// Each channel runs on its own session. A failing channel is logged and
    /// contributes nothing; if both come back empty the result is empty.
    pub async fn search(
        &self,
        query_text: &str,
        query_embedding: Vec<f32>,
        pool_size: usize,
        filters: &SearchFilters,
    ) -> HybridResults {
        let semantic_filters = filters.clone();
        let semantic = self.store.with_session(move |s| {
            s.semantic_search(&query_embedding, pool_size, &semantic_filters)
        });

        let lexical_query = query_text.to_string();
        let lexical_filters = filters.clone();
        let lexical = self.store.with_session(move |s| {
            s.lexical_search(&lexical_query, pool_size, &lexical_filters)
        });

        let (semantic, lexical) = tokio::join!(semantic, lexical);

        let semantic = semantic.unwrap_or_else(|e| {
            tracing::warn!("Semantic search failed, continuing without it: {}", e);
            Vec::new()
        });
        let lexical = lexical.unwrap_or_else(|e| {
            tracing::warn!("Lexical search failed, continuing without it: {}", e);
            Vec::new()
        });

        let semantic_hits = semantic.len();
        let lexical_hits = lexical.len();
        let candidates = reciprocal_rank_fusion(semantic, lexical);

        tracing::debug!(
            semantic_hits,
            lexical_hits,
            fused = candidates.len(),
            "Hybrid search complete"
        );

        HybridResults {
            candidates,
            semantic_hits,
            lexical_hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentUpsert, NewChunk};
    use groundwork_core::{AppError, RetrievalConfig};
    use tempfile::TempDir;

    fn stored(id: i64) -> StoredChunk {
        StoredChunk {
            chunk_id: id,
            text: format!("chunk {}", id),
            embedding: vec![1.0],
            source: "doc.md".to_string(),
            domain: "general".to_string(),
        }
    }

    fn ids(candidates: &[RetrievalCandidate]) -> Vec<i64> {
        candidates.iter().map(|c| c.chunk_id).collect()
    }

    #[test]
    fn test_fusion_scenario() {
        // A=1, B=2, C=3, D=4
        let fused = reciprocal_rank_fusion(
            vec![stored(1), stored(2), stored(3)],
            vec![stored(2), stored(4)],
        );

        assert_eq!(fused[0].chunk_id, 2);
        assert_eq!(fused[0].channel, Channel::Hybrid);

        let b = fused[0].score;
        let a = fused.iter().find(|c| c.chunk_id == 1).unwrap();
        assert!((b - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((a.score - 1.0 / 61.0).abs() < 1e-12);
        assert!(b > a.score);
        assert_eq!(a.channel, Channel::Semantic);

        let d = fused.iter().find(|c| c.chunk_id == 4).unwrap();
        assert_eq!(d.channel, Channel::Lexical);
    }

    #[test]
    fn test_both_channels_rank_zero_beats_single() {
        let both = reciprocal_rank_fusion(vec![stored(1)], vec![stored(1)]);
        let single = reciprocal_rank_fusion(vec![stored(1)], Vec::new());
        assert!(both[0].score > single[0].score);
    }

    #[test]
    fn test_ties_keep_semantic_insertion_order() {
        // 1 and 9 both sit at rank 0 of one channel
        let fused = reciprocal_rank_fusion(vec![stored(1), stored(2)], vec![stored(9)]);
        assert_eq!(ids(&fused), vec![1, 9, 2]);
    }

    #[test]
    fn test_empty_channels() {
        assert!(reciprocal_rank_fusion(Vec::new(), Vec::new()).is_empty());
        let lexical_only = reciprocal_rank_fusion(Vec::new(), vec![stored(5), stored(6)]);
        assert_eq!(ids(&lexical_only), vec![5, 6]);
    }

    async fn store_with(docs: &[(&'static str, &'static str, Vec<f32>)]) -> (TempDir, ChunkStore) {
        let temp = TempDir::new().unwrap();
        let store = ChunkStore::open(temp.path().join("index.sqlite"), &RetrievalConfig::default())
            .await
            .unwrap();

        for (source, text, embedding) in docs.iter().cloned() {
            store
                .with_session(move |s| {
                    s.replace_document(
                        &DocumentUpsert {
                            source_path: source,
                            domain: "general",
                            department: "all",
                            content_hash: "h",
                            content: text,
                            client_tag: "default",
                        },
                        &[NewChunk {
                            text: text.to_string(),
                            embedding,
                        }],
                        &[],
                    )
                })
                .await
                .unwrap();
        }
        (temp, store)
    }

    #[tokio::test]
    async fn test_search_marks_hybrid_hits() {
        let (_temp, store) = store_with(&[
            ("a.md", "vendor invoice posting", vec![1.0, 0.0]),
            ("b.md", "sales order workflow", vec![0.0, 1.0]),
        ])
        .await;

        let results = HybridSearcher::new(store)
            .search("invoice", vec![1.0, 0.0], 10, &SearchFilters::default())
            .await;

        assert_eq!(results.semantic_hits, 2);
        assert_eq!(results.lexical_hits, 1);
        assert_eq!(results.candidates[0].source, "a.md");
        assert_eq!(results.candidates[0].channel, Channel::Hybrid);
        assert_eq!(results.candidates[1].channel, Channel::Semantic);
    }

    #[tokio::test]
    async fn test_lexical_failure_keeps_semantic_results() {
        let (_temp, store) = store_with(&[
            ("a.md", "vendor invoice posting", vec![1.0, 0.0]),
            ("b.md", "sales order workflow", vec![0.0, 1.0]),
        ])
        .await;
        store
            .with_session(|s| {
                s.connection()
                    .execute_batch("DROP TABLE chunks_fts;")
                    .map_err(|e| AppError::Store(e.to_string()))
            })
            .await
            .unwrap();

        let results = HybridSearcher::new(store)
            .search("invoice", vec![1.0, 0.0], 10, &SearchFilters::default())
            .await;

        assert_eq!(results.lexical_hits, 0);
        assert_eq!(results.semantic_hits, 2);
        assert_eq!(results.candidates[0].source, "a.md");
        assert!(results
            .candidates
            .iter()
            .all(|c| c.channel == Channel::Semantic));
    }

    #[tokio::test]
    async fn test_search_with_no_matches_is_empty() {
        let (_temp, store) = store_with(&[]).await;
        let results = HybridSearcher::new(store)
            .search("anything", vec![1.0, 0.0], 10, &SearchFilters::default())
            .await;

        assert!(results.candidates.is_empty());
        assert_eq!(results.semantic_hits + results.lexical_hits, 0);
    }
}
