// ============================================================================
// SAMPLING
// ============================================================================

use std::collections::VecDeque;

use rand::Rng;

use crate::error::{Result, RnnError};
use crate::model::Parameters;
use crate::tape::{vec_max, Tape};

/// Numerically stable softmax of `logits / temperature`.
#[must_use]
pub fn softmax(logits: &[f32], temperature: f32) -> Vec<f32> {
    let scaled: Vec<f32> = logits.iter().map(|l| l / temperature).collect();
    let mx = vec_max(&scaled);
    let ex: Vec<f32> = scaled.iter().map(|l| (l - mx).exp()).collect();
    let sum: f32 = ex.iter().sum();
    ex.iter().map(|e| e / sum).collect()
}

/// Draws an index with probability `probs[i]` by inverse-CDF search
/// against one uniform draw in `[0, 1)`.
///
/// Rounding can leave the cumulative sum just under 1; draws that land in
/// that gap go to the last index with non-zero mass.
pub fn sample_categorical(probs: &[f32], rng: &mut impl Rng) -> usize {
    debug_assert!(!probs.is_empty());
    let u: f32 = rng.gen();
    let mut cumsum = 0.0f32;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if u < cumsum {
            return i;
        }
    }
    probs.iter().rposition(|&p| p > 0.0).unwrap_or(probs.len() - 1)
}

/// Free-runs the model for `len` symbols.
///
/// Each step re-encodes the whole window, runs it forward from `h0`, draws
/// the next symbol from the last position's distribution, then slides the
/// window by one. `params` and `h0` are only read.
pub fn generate(
    params: &Parameters,
    seed: &[usize],
    h0: &[f32],
    len: usize,
    temperature: f32,
    rng: &mut impl Rng,
) -> Result<Vec<usize>> {
    if seed.is_empty() {
        return Err(RnnError::InvalidConfig(
            "sampling needs a non-empty seed window".to_string(),
        ));
    }
    let mut tape = Tape::new();
    let mut window: VecDeque<usize> = seed.iter().copied().collect();
    let mut out = Vec::with_capacity(len);

    for _ in 0..len {
        tape.clear();
        let fwd = params.forward(&mut tape, window.make_contiguous(), h0)?;
        let last = fwd.logits[fwd.logits.len() - 1];
        let probs = softmax(tape.data(last), temperature);
        let next = sample_categorical(&probs, rng);
        out.push(next);
        window.pop_front();
        window.push_back(next);
    }
    Ok(out)
}
