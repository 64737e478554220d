//! Maximal Marginal Relevance selection.

use crate::types::RetrievalCandidate;

/// Cosine similarity, defined as 0 for zero-norm or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Greedily pick `min(k, candidates.len())` candidates trading relevance
/// against redundancy.
///
/// The first pick is the most relevant candidate; each later pick maximizes
/// `lambda * relevance - (1 - lambda) * max_similarity_to_selected`. Ties go
/// to the earlier candidate. `lambda` is clamped to `[0, 1]`.
pub fn mmr_select(
    query_embedding: &[f32],
    candidates: Vec<RetrievalCandidate>,
    k: usize,
    lambda: f32,
) -> Vec<RetrievalCandidate> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }
    let lambda = lambda.clamp(0.0, 1.0);

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query_embedding, &c.embedding))
        .collect();

    // Highest similarity of each candidate to anything selected so far
    let mut max_sim = vec![f32::NEG_INFINITY; candidates.len()];
    let mut taken = vec![false; candidates.len()];
    let mut order = Vec::with_capacity(k);

    let mut pick = argmax((0..candidates.len()).map(|i| (i, relevance[i])));

    while let Some(chosen) = pick {
        taken[chosen] = true;
        order.push(chosen);
        if order.len() == k {
            break;
        }

        for i in 0..candidates.len() {
            if !taken[i] {
                let sim = cosine_similarity(&candidates[i].embedding, &candidates[chosen].embedding);
                max_sim[i] = max_sim[i].max(sim);
            }
        }

        pick = argmax(
            (0..candidates.len())
                .filter(|&i| !taken[i])
                .map(|i| (i, lambda * relevance[i] - (1.0 - lambda) * max_sim[i])),
        );
    }

    let mut slots: Vec<Option<RetrievalCandidate>> = candidates.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

/// Index of the strictly greatest score; the first one wins ties.
fn argmax(scores: impl Iterator<Item = (usize, f32)>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, score) in scores {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}
