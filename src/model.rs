//! Vanilla RNN: one tanh recurrence plus a linear read-out.
//!
//! ```text
//! h_t = tanh(x_t·U + h_{t-1}·W + b_h)
//! y_t = h_t·V + b_y
//! ```

use rand::Rng;

use crate::error::{Result, RnnError};
use crate::tape::{Tape, TID};

/// Encodes `indices` as a row-major `[len, vocab_size]` indicator matrix.
pub fn one_hot(indices: &[usize], vocab_size: usize) -> Result<Vec<f32>> {
    let mut out = vec![0.0f32; indices.len() * vocab_size];
    for (row, &index) in indices.iter().enumerate() {
        if index >= vocab_size {
            return Err(RnnError::IndexOutOfRange { index, vocab_size });
        }
        out[row * vocab_size + index] = 1.0;
    }
    Ok(out)
}

fn rand_normal(n: usize, scale: f32, rng: &mut impl Rng) -> Vec<f32> {
    (0..n)
        .map(|_| {
            let u1: f32 = rng.gen::<f32>().max(1e-10);
            let u2: f32 = rng.gen();
            (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos() * scale
        })
        .collect()
}

/// The five trainable arrays, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub vocab_size: usize,
    pub hidden_size: usize,
    /// U, `[V, H]`
    pub input_hidden: Vec<f32>,
    /// W, `[H, H]`
    pub hidden_hidden: Vec<f32>,
    /// V, `[H, V]`
    pub hidden_output: Vec<f32>,
    /// b_h, `[H]`
    pub hidden_bias: Vec<f32>,
    /// b_y, `[V]`
    pub output_bias: Vec<f32>,
}

/// Tape handles for one bound copy of the parameters.
#[derive(Debug, Clone, Copy)]
pub struct BoundParams {
    u: TID,
    w: TID,
    v: TID,
    b_h: TID,
    b_y: TID,
}

impl BoundParams {
    /// Gradients in the same order as [`Parameters::tensors`].
    #[must_use]
    pub fn gradients(&self, tape: &Tape) -> Vec<Vec<f32>> {
        [self.u, self.w, self.v, self.b_h, self.b_y]
            .iter()
            .map(|&t| tape.grad(t).to_vec())
            .collect()
    }
}

pub struct ForwardResult {
    /// One `[1, V]` logit node per window position.
    pub logits: Vec<TID>,
    /// h_L, detached, for carrying into the next window.
    pub final_hidden: Vec<f32>,
    pub params: BoundParams,
}

impl Parameters {
    /// Normal(0, `scale`) weights, zero biases.
    pub fn init(vocab_size: usize, hidden_size: usize, scale: f32, rng: &mut impl Rng) -> Self {
        Self {
            vocab_size,
            hidden_size,
            input_hidden: rand_normal(vocab_size * hidden_size, scale, rng),
            hidden_hidden: rand_normal(hidden_size * hidden_size, scale, rng),
            hidden_output: rand_normal(hidden_size * vocab_size, scale, rng),
            hidden_bias: vec![0.0; hidden_size],
            output_bias: vec![0.0; vocab_size],
        }
    }

    #[must_use]
    pub fn tensors(&self) -> [&[f32]; 5] {
        [
            self.input_hidden.as_slice(),
            self.hidden_hidden.as_slice(),
            self.hidden_output.as_slice(),
            self.hidden_bias.as_slice(),
            self.output_bias.as_slice(),
        ]
    }

    pub fn tensors_mut(&mut self) -> [&mut [f32]; 5] {
        [
            self.input_hidden.as_mut_slice(),
            self.hidden_hidden.as_mut_slice(),
            self.hidden_output.as_mut_slice(),
            self.hidden_bias.as_mut_slice(),
            self.output_bias.as_mut_slice(),
        ]
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.tensors().iter().all(|t| t.iter().all(|x| x.is_finite()))
    }

    /// Copies the parameters onto `tape` as gradient-tracking leaves.
    pub fn bind(&self, tape: &mut Tape) -> BoundParams {
        let (vs, hs) = (self.vocab_size, self.hidden_size);
        BoundParams {
            u: tape.param(self.input_hidden.clone(), vs, hs),
            w: tape.param(self.hidden_hidden.clone(), hs, hs),
            v: tape.param(self.hidden_output.clone(), hs, vs),
            b_h: tape.param(self.hidden_bias.clone(), 1, hs),
            b_y: tape.param(self.output_bias.clone(), 1, vs),
        }
    }

    /// Unrolls the recurrence over `inputs` starting from `h0`.
    ///
    /// `h0` enters the tape as a constant, so backpropagation stops at the
    /// window boundary.
    pub fn forward(&self, tape: &mut Tape, inputs: &[usize], h0: &[f32]) -> Result<ForwardResult> {
        let (vs, hs) = (self.vocab_size, self.hidden_size);
        debug_assert_eq!(h0.len(), hs);
        let params = self.bind(tape);

        let x = tape.constant(one_hot(inputs, vs)?, inputs.len(), vs);
        // x_t·U for every t at once; row t is the input contribution at step t.
        let xu = tape.matmul(x, params.u);

        let mut h = tape.constant(h0.to_vec(), 1, hs);
        let mut logits = Vec::with_capacity(inputs.len());
        for t in 0..inputs.len() {
            let xt = tape.row_slice(xu, t);
            let hw = tape.matmul(h, params.w);
            let pre = tape.add(xt, hw);
            let pre = tape.add(pre, params.b_h);
            h = tape.tanh(pre);
            let y = tape.matmul(h, params.v);
            logits.push(tape.add(y, params.b_y));
        }

        Ok(ForwardResult {
            logits,
            final_hidden: tape.data(h).to_vec(),
            params,
        })
    }
}

/// Mean softmax cross-entropy over the window.
pub fn cross_entropy(tape: &mut Tape, logits: &[TID], targets: &[usize]) -> TID {
    debug_assert_eq!(logits.len(), targets.len());
    debug_assert!(!logits.is_empty());
    let mut total = tape.softmax_ce(logits[0], targets[0]);
    for (&l, &t) in logits.iter().zip(targets.iter()).skip(1) {
        let ce = tape.softmax_ce(l, t);
        total = tape.add(total, ce);
    }
    tape.scalar_div(total, logits.len() as f32)
}
