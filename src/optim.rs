// ============================================================================
// GRADIENT CLIPPING + ADAM
// ============================================================================

use crate::config::TrainConfig;
use crate::model::Parameters;

/// Clamps every component to `[-limit, limit]`; returns how many were clipped.
pub fn clip_gradients(grads: &mut [Vec<f32>], limit: f32) -> usize {
    let mut clipped = 0;
    for g in grads.iter_mut().flat_map(|t| t.iter_mut()) {
        if g.abs() > limit {
            *g = g.clamp(-limit, limit);
            clipped += 1;
        }
    }
    clipped
}

#[must_use]
pub fn grad_norm(grads: &[Vec<f32>]) -> f32 {
    grads.iter().flatten().map(|g| g * g).sum::<f32>().sqrt()
}

/// Adam with optional decoupled weight decay. Moment buffers mirror
/// [`Parameters::tensors`].
///
/// Decay shrinks every weight on every step. Entries whose gradient and first
/// moment are both still zero then skip the moment update.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    t: usize,
    m: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
}

impl Adam {
    #[must_use]
    pub fn new(params: &Parameters, config: &TrainConfig) -> Self {
        let zeros = || -> Vec<Vec<f32>> {
            params.tensors().iter().map(|t| vec![0.0; t.len()]).collect()
        };
        Self {
            lr: config.learning_rate,
            beta1: config.beta1,
            beta2: config.beta2,
            eps: config.eps,
            weight_decay: config.weight_decay,
            t: 0,
            m: zeros(),
            v: zeros(),
        }
    }

    /// Number of updates applied so far.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.t
    }

    pub fn step(&mut self, params: &mut Parameters, grads: &[Vec<f32>]) {
        debug_assert_eq!(grads.len(), self.m.len());
        self.t += 1;
        let t = self.t as f32;
        let bc1 = 1.0 - self.beta1.powf(t);
        let bc2 = 1.0 - self.beta2.powf(t);

        for (idx, data) in params.tensors_mut().into_iter().enumerate() {
            let grad = &grads[idx];
            let pm = &mut self.m[idx];
            let pv = &mut self.v[idx];
            for j in 0..data.len() {
                data[j] -= self.lr * self.weight_decay * data[j];
                let g = grad[j];
                if g == 0.0 && pm[j] == 0.0 {
                    continue;
                }
                pm[j] = self.beta1 * pm[j] + (1.0 - self.beta1) * g;
                pv[j] = self.beta2 * pv[j] + (1.0 - self.beta2) * g * g;
                let m_hat = pm[j] / bc1;
                let v_hat = pv[j] / bc2;
                data[j] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn zero_grads(params: &Parameters) -> Vec<Vec<f32>> {
        params.tensors().iter().map(|t| vec![0.0; t.len()]).collect()
    }

    #[test]
    fn test_clip_gradients() {
        let mut grads = vec![vec![-7.0, 0.5, 5.0], vec![12.0], vec![-5.0001]];
        let clipped = clip_gradients(&mut grads, 5.0);
        assert_eq!(clipped, 3);
        assert_eq!(grads, vec![vec![-5.0, 0.5, 5.0], vec![5.0], vec![-5.0]]);
        assert!(grads.iter().flatten().all(|g| g.abs() <= 5.0));
    }

    #[test]
    fn test_grad_norm() {
        let grads = vec![vec![3.0], vec![0.0, 4.0]];
        assert!((grad_norm(&grads) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        // With bias correction the first Adam step is lr * sign(g).
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut params = Parameters::init(2, 2, 0.1, &mut rng);
        let before = params.clone();
        let config = TrainConfig::new().with_learning_rate(0.01);
        let mut opt = Adam::new(&params, &config);

        let grads: Vec<Vec<f32>> = params
            .tensors()
            .iter()
            .map(|t| {
                (0..t.len())
                    .map(|j| if j % 2 == 0 { 1.0 } else { -3.0 })
                    .collect()
            })
            .collect();
        opt.step(&mut params, &grads);
        assert_eq!(opt.steps(), 1);

        let pairs = params.tensors().into_iter().zip(before.tensors());
        for ((after, before), grad) in pairs.zip(grads.iter()) {
            for j in 0..after.len() {
                let delta = after[j] - before[j];
                let expected = -0.01 * grad[j].signum();
                assert!((delta - expected).abs() < 1e-5, "delta {delta} expected {expected}");
            }
        }
    }

    #[test]
    fn test_zero_gradient_leaves_params() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut params = Parameters::init(3, 2, 0.1, &mut rng);
        let before = params.clone();
        let mut opt = Adam::new(&params, &TrainConfig::default());
        let grads = zero_grads(&params);
        opt.step(&mut params, &grads);
        assert_eq!(params, before);
    }

    #[test]
    fn test_weight_decay_reaches_untouched_entries() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut params = Parameters::init(3, 2, 0.5, &mut rng);
        let before = params.clone();
        let config = TrainConfig::new()
            .with_learning_rate(0.1)
            .with_weight_decay(0.5);
        let mut opt = Adam::new(&params, &config);
        let grads = zero_grads(&params);
        for _ in 0..2 {
            opt.step(&mut params, &grads);
        }
        let factor = (1.0f32 - 0.1 * 0.5).powi(2);
        let pairs = params.tensors().into_iter().zip(before.tensors());
        for (after, before) in pairs {
            for (a, b) in after.iter().zip(before.iter()) {
                assert!((a - b * factor).abs() < 1e-6, "{a} vs {}", b * factor);
            }
        }
        assert_ne!(params.input_hidden, before.input_hidden);
    }

    #[test]
    fn test_minimises_quadratic() {
        // f(x) = sum (x - 3)^2 on the output bias.
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut params = Parameters::init(2, 1, 0.1, &mut rng);
        let mut opt = Adam::new(&params, &TrainConfig::new().with_learning_rate(0.1));
        for _ in 0..500 {
            let mut grads = zero_grads(&params);
            grads[4] = params.output_bias.iter().map(|x| 2.0 * (x - 3.0)).collect();
            opt.step(&mut params, &grads);
        }
        for x in &params.output_bias {
            assert!((x - 3.0).abs() < 0.05, "x = {x}");
        }
    }
}
