//! Maximal marginal relevance re-ranking.

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, Embedding, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmrParams {
    /// Number of results to return.
    pub k: usize,
    /// Size of the similarity-ranked candidate pool MMR selects from.
    pub fetch_k: usize,
    /// 1.0 ranks purely by relevance, 0.0 purely by diversity.
    pub lambda_mult: f32,
}

impl MmrParams {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(DomainError::configuration("k must be greater than zero"));
        }
        if self.fetch_k < self.k {
            return Err(DomainError::configuration(format!(
                "fetch_k ({}) must be at least k ({})",
                self.fetch_k, self.k
            )));
        }
        if !(0.0..=1.0).contains(&self.lambda_mult) {
            return Err(DomainError::configuration(format!(
                "lambda_mult ({}) must be within [0, 1]",
                self.lambda_mult
            )));
        }
        Ok(())
    }
}

impl Default for MmrParams {
    fn default() -> Self {
        Self {
            k: 50,
            fetch_k: 100,
            lambda_mult: 0.25,
        }
    }
}

/// Greedily picks up to `k` candidates, each maximizing
/// `lambda * sim(query, c) - (1 - lambda) * max sim(c, picked)`.
///
/// Returns indices into `candidates` in selection order. The first pick is
/// always the most query-similar candidate; ties go to the lower index.
pub fn maximal_marginal_relevance(
    query: &Embedding,
    candidates: &[Embedding],
    k: usize,
    lambda_mult: f32,
) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| query.cosine_similarity(c))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k);
    // Highest similarity to anything already picked, per candidate.
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;

        for i in 0..candidates.len() {
            if selected.contains(&i) {
                continue;
            }

            let score = if selected.is_empty() {
                relevance[i]
            } else {
                lambda_mult * relevance[i] - (1.0 - lambda_mult) * redundancy[i]
            };

            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let Some((pick, _)) = best else { break };
        selected.push(pick);

        for (i, candidate) in candidates.iter().enumerate() {
            let sim = candidates[pick].cosine_similarity(candidate);
            if sim > redundancy[i] {
                redundancy[i] = sim;
            }
        }
    }

    selected
}
