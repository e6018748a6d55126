use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RnnError};

/// Hyperparameters and schedule for a training run.
///
/// Every field has a default, so a JSON config file only needs to name the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Width H of the recurrent state.
    pub hidden_size: usize,
    /// Window length L, in symbols.
    pub window: usize,
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    /// Decoupled weight decay. Zero gives plain Adam.
    pub weight_decay: f32,
    /// Gradient components are clamped to `[-clip, clip]`.
    pub clip: f32,
    /// Standard deviation of the normal weight initialisation.
    pub init_scale: f32,
    /// Symbols generated per sample (N).
    pub sample_len: usize,
    /// Steps between samples (Ks).
    pub sample_every: usize,
    /// Steps between surfacing the latest sample to the caller (Kp).
    pub print_every: usize,
    /// Steps between loss log lines.
    pub log_every: usize,
    pub temperature: f32,
    /// Seed for initialisation and sampling. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            hidden_size: 100,
            window: 25,
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
            clip: 5.0,
            init_scale: 0.01,
            sample_len: 500,
            sample_every: 500,
            print_every: 50_000,
            log_every: 100,
            temperature: 1.0,
            seed: None,
        }
    }
}

impl TrainConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub const fn with_hidden_size(mut self, size: usize) -> Self {
        self.hidden_size = size;
        self
    }

    #[must_use]
    pub const fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    #[must_use]
    pub fn with_weight_decay(mut self, wd: f32) -> Self {
        self.weight_decay = wd;
        self
    }

    #[must_use]
    pub fn with_clip(mut self, clip: f32) -> Self {
        self.clip = clip;
        self
    }

    #[must_use]
    pub fn with_init_scale(mut self, scale: f32) -> Self {
        self.init_scale = scale;
        self
    }

    #[must_use]
    pub const fn with_sample_len(mut self, len: usize) -> Self {
        self.sample_len = len;
        self
    }

    #[must_use]
    pub const fn with_sample_every(mut self, steps: usize) -> Self {
        self.sample_every = steps;
        self
    }

    #[must_use]
    pub const fn with_print_every(mut self, steps: usize) -> Self {
        self.print_every = steps;
        self
    }

    #[must_use]
    pub const fn with_log_every(mut self, steps: usize) -> Self {
        self.log_every = steps;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Rejects settings the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, v: f32) -> Result<()> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(RnnError::InvalidConfig(format!("{name} must be positive, got {v}")))
            }
        }
        fn nonzero(name: &str, v: usize) -> Result<()> {
            if v == 0 {
                Err(RnnError::InvalidConfig(format!("{name} must be at least 1")))
            } else {
                Ok(())
            }
        }

        nonzero("hidden_size", self.hidden_size)?;
        nonzero("window", self.window)?;
        nonzero("sample_every", self.sample_every)?;
        nonzero("print_every", self.print_every)?;
        nonzero("log_every", self.log_every)?;
        positive("learning_rate", self.learning_rate)?;
        positive("clip", self.clip)?;
        positive("temperature", self.temperature)?;
        positive("eps", self.eps)?;
        positive("init_scale", self.init_scale)?;
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(RnnError::InvalidConfig(format!(
                    "{name} must be in [0, 1), got {beta}"
                )));
            }
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(RnnError::InvalidConfig(format!(
                "weight_decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }
}
