// Token selection for the decode loop.
//
// Greedy (argmax) selection is pure. Stochastic selection goes through
// `Sampler`, which owns the only RNG in the crate: temperature-scaled
// softmax followed by nucleus (top-p) filtering and a categorical draw.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::InferenceError;

/// Return the index of the maximum value in the logits.
///
/// Ties resolve to the lowest index. NaN entries are never selected.
pub fn argmax(logits: &[f32]) -> u32 {
    let mut best_idx = 0u32;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in logits.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = i as u32;
        }
    }
    best_idx
}

/// Temperature-scaled softmax over one logit row.
///
/// Fails when the row has no finite logit, since no distribution can be
/// formed from it.
pub fn softmax_with_temperature(
    logits: &[f32],
    temperature: f32,
    row: usize,
) -> Result<Vec<f32>, InferenceError> {
    let max_logit = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max_logit.is_finite() {
        return Err(InferenceError::DegenerateDistribution { row });
    }
    let mut probs: Vec<f32> = logits
        .iter()
        .map(|&l| ((l - max_logit) / temperature).exp())
        .map(|p| if p.is_nan() { 0.0 } else { p })
        .collect();
    let sum: f32 = probs.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return Err(InferenceError::DegenerateDistribution { row });
    }
    for p in &mut probs {
        *p /= sum;
    }
    Ok(probs)
}

/// Log-softmax of one logit row evaluated at `target`.
pub fn log_prob(logits: &[f32], target: u32) -> f32 {
    let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logits.iter().map(|&l| (l - max_logit).exp()).sum();
    logits[target as usize] - max_logit - sum.ln()
}

/// Nucleus filter over one probability row.
///
/// Returns `(vocab index, renormalized probability)` pairs in descending
/// probability order. An entry is dropped when the mass ranked strictly
/// above it already exceeds `p`, so the smallest prefix reaching `p` is
/// kept. The top entry always survives. Sorting is stable, so ties keep
/// vocabulary order.
pub fn top_p_filter(probs: &[f32], p: f32) -> Vec<(u32, f32)> {
    let mut sorted: Vec<(u32, f32)> = probs
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as u32, v))
        .collect();
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut cumulative = 0.0f32;
    let mut keep = 0usize;
    for &(_, prob) in &sorted {
        // mass strictly before this entry
        if keep > 0 && cumulative > p {
            break;
        }
        cumulative += prob;
        keep += 1;
    }
    sorted.truncate(keep);

    let mass: f32 = sorted.iter().map(|c| c.1).sum();
    if mass > 0.0 {
        for c in &mut sorted {
            c.1 /= mass;
        }
    }
    sorted
}

/// Owner of all sampling randomness.
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Create a sampler with a fixed seed. Same seed and same inputs give
    /// the same draws.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw one vocabulary index per row from nucleus-filtered
    /// distributions.
    pub fn sample_top_p(&mut self, probs: &[Vec<f32>], p: f32) -> Result<Vec<u32>, InferenceError> {
        probs
            .iter()
            .enumerate()
            .map(|(row, dist)| self.sample_row(dist, p, row))
            .collect()
    }

    fn sample_row(&mut self, probs: &[f32], p: f32, row: usize) -> Result<u32, InferenceError> {
        let nucleus = top_p_filter(probs, p);
        let mass: f32 = nucleus.iter().map(|c| c.1).sum();
        if !(mass.is_finite() && mass > 0.0) {
            return Err(InferenceError::DegenerateDistribution { row });
        }

        let r: f32 = self.rng.gen::<f32>() * mass;
        let mut cumulative = 0.0f32;
        for &(idx, prob) in &nucleus {
            cumulative += prob;
            if r < cumulative {
                return Ok(idx);
            }
        }
        // rounding left r at the upper edge
        Ok(nucleus.last().map(|c| c.0).unwrap_or(0))
    }
}
