// ============================================================================
// TRAINING / SAMPLING DRIVER
// ============================================================================

use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::TrainConfig;
use crate::corpus::Corpus;
use crate::error::{Result, RnnError};
use crate::model::{cross_entropy, Parameters};
use crate::optim::{clip_gradients, grad_norm, Adam};
use crate::sample::generate;
use crate::tape::Tape;

const SMOOTHING: f32 = 0.999;

/// What the session did last. A step that ends with a sampling rollout
/// leaves the session in `Sampling` until the next step starts training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Sampling,
}

/// What one window update did.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub iteration: usize,
    pub loss: f32,
    pub smooth_loss: f32,
    /// Gradient norm before clipping.
    pub grad_norm: f32,
    pub clipped: usize,
    /// The cursor wrapped and the hidden state was zeroed before this window.
    pub wrapped: bool,
    /// `Sampling` when this step ended with a rollout.
    pub phase: Phase,
    pub sample: Option<String>,
}

/// The latest sample, handed to the caller every `print_every` steps.
#[derive(Debug, Clone, Copy)]
pub struct SampleEvent<'a> {
    pub iteration: usize,
    pub smooth_loss: f32,
    pub text: &'a str,
}

/// When [`TrainingSession::run`] stops. Unset limits never trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    pub max_steps: Option<usize>,
    pub time_limit: Option<Duration>,
}

impl Budget {
    #[must_use]
    pub const fn steps(n: usize) -> Self {
        Self {
            max_steps: Some(n),
            time_limit: None,
        }
    }

    #[must_use]
    pub const fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn exhausted(&self, steps: usize, elapsed: Duration) -> bool {
        self.max_steps.is_some_and(|max| steps >= max)
            || self.time_limit.is_some_and(|limit| elapsed >= limit)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub steps: usize,
    pub passes: usize,
    pub last_loss: f32,
    pub best_loss: f32,
    pub smooth_loss: f32,
    pub elapsed: Duration,
}

/// Everything a run mutates: parameters, optimizer state, the carried hidden
/// state, the corpus cursor and the counters.
pub struct TrainingSession {
    corpus: Corpus,
    config: TrainConfig,
    params: Parameters,
    optimizer: Adam,
    hidden: Vec<f32>,
    cursor: usize,
    iteration: usize,
    passes: usize,
    phase: Phase,
    smooth_loss: f32,
    last_sample: Option<String>,
    rng: ChaCha8Rng,
    tape: Tape,
}

impl TrainingSession {
    pub fn new(corpus: Corpus, config: TrainConfig) -> Result<Self> {
        config.validate()?;
        if corpus.vocab().is_empty() {
            return Err(RnnError::EmptyCorpus);
        }
        if corpus.len() < config.window + 2 {
            return Err(RnnError::CorpusTooShort {
                len: corpus.len(),
                window: config.window,
            });
        }

        let mut rng = config
            .seed
            .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        let vocab_size = corpus.vocab().len();
        let params = Parameters::init(vocab_size, config.hidden_size, config.init_scale, &mut rng);
        let optimizer = Adam::new(&params, &config);
        info!(
            vocab = vocab_size,
            corpus_len = corpus.len(),
            hidden = config.hidden_size,
            window = config.window,
            params = params.count(),
            "initialised session"
        );

        Ok(Self {
            hidden: vec![0.0; config.hidden_size],
            smooth_loss: (vocab_size as f32).ln(),
            corpus,
            config,
            params,
            optimizer,
            cursor: 0,
            iteration: 0,
            passes: 0,
            phase: Phase::Running,
            last_sample: None,
            rng,
            tape: Tape::new(),
        })
    }

    #[must_use]
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    #[must_use]
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Direct access for warm starts and diagnostics.
    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    #[must_use]
    pub fn hidden(&self) -> &[f32] {
        &self.hidden
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Completed window updates.
    #[must_use]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Times the cursor has wrapped back to the start.
    #[must_use]
    pub fn passes(&self) -> usize {
        self.passes
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn smooth_loss(&self) -> f32 {
        self.smooth_loss
    }

    #[must_use]
    pub fn last_sample(&self) -> Option<&str> {
        self.last_sample.as_deref()
    }

    /// One teacher-forced update on the window at the cursor.
    ///
    /// A non-finite loss aborts before the parameters are touched.
    pub fn step(&mut self) -> Result<StepReport> {
        let l = self.config.window;
        self.phase = Phase::Running;
        let mut wrapped = false;
        if self.cursor + l + 1 >= self.corpus.len() {
            self.cursor = 0;
            self.hidden.fill(0.0);
            self.passes += 1;
            wrapped = true;
            debug!(passes = self.passes, "cursor wrapped, hidden state reset");
        }

        let window = self
            .corpus
            .window(self.cursor, l)
            .ok_or(RnnError::CorpusTooShort {
                len: self.corpus.len(),
                window: l,
            })?;

        self.tape.clear();
        let fwd = self.params.forward(&mut self.tape, window.inputs, &self.hidden)?;
        let loss = cross_entropy(&mut self.tape, &fwd.logits, window.targets);
        let loss_val = self.tape.data(loss)[0];
        if !loss_val.is_finite() {
            return Err(RnnError::NonFiniteLoss {
                step: self.iteration + 1,
                loss: loss_val,
            });
        }

        self.tape.backward(loss);
        let mut grads = fwd.params.gradients(&self.tape);
        let norm = grad_norm(&grads);
        let clipped = clip_gradients(&mut grads, self.config.clip);
        self.optimizer.step(&mut self.params, &grads);

        self.hidden = fwd.final_hidden;
        self.cursor += l;
        self.iteration += 1;
        self.smooth_loss = self.smooth_loss * SMOOTHING + loss_val * (1.0 - SMOOTHING);

        if self.iteration % self.config.log_every == 0 {
            info!(
                iteration = self.iteration,
                loss = loss_val,
                smooth_loss = self.smooth_loss,
                grad_norm = norm,
                clipped,
                passes = self.passes,
                "training"
            );
        }

        let sample = if self.iteration % self.config.sample_every == 0 {
            let text = self.sample(self.config.sample_len)?;
            self.last_sample = Some(text.clone());
            Some(text)
        } else {
            None
        };

        Ok(StepReport {
            iteration: self.iteration,
            loss: loss_val,
            smooth_loss: self.smooth_loss,
            grad_norm: norm,
            clipped,
            wrapped,
            phase: self.phase,
            sample,
        })
    }

    /// Generates `len` symbols from a random seed window, starting each
    /// rollout step from the current hidden state. Leaves the parameters,
    /// hidden state and cursor untouched.
    pub fn sample(&mut self, len: usize) -> Result<String> {
        let seed = self.corpus.random_span(self.config.window, &mut self.rng);
        let indices = generate(
            &self.params,
            seed,
            &self.hidden,
            len,
            self.config.temperature,
            &mut self.rng,
        )?;
        let text = self.corpus.vocab().decode(&indices);
        self.phase = Phase::Sampling;
        debug!(iteration = self.iteration, chars = len, "sampled");
        Ok(text)
    }

    /// Steps until `budget` runs out, passing the latest sample to
    /// `on_sample` every `print_every` steps.
    pub fn run<F>(&mut self, budget: Budget, mut on_sample: F) -> Result<RunSummary>
    where
        F: FnMut(SampleEvent<'_>),
    {
        let start = Instant::now();
        let mut steps = 0usize;
        let mut last_loss = f32::NAN;
        let mut best_loss = f32::INFINITY;
        info!(?budget, "training started");

        while !budget.exhausted(steps, start.elapsed()) {
            let report = self.step()?;
            steps += 1;
            last_loss = report.loss;
            best_loss = best_loss.min(report.loss);

            if self.iteration % self.config.print_every == 0 {
                if let Some(text) = self.last_sample.as_deref() {
                    on_sample(SampleEvent {
                        iteration: self.iteration,
                        smooth_loss: self.smooth_loss,
                        text,
                    });
                }
            }
        }

        let summary = RunSummary {
            steps,
            passes: self.passes,
            last_loss,
            best_loss,
            smooth_loss: self.smooth_loss,
            elapsed: start.elapsed(),
        };
        info!(
            steps,
            passes = summary.passes,
            best_loss,
            smooth_loss = summary.smooth_loss,
            secs = summary.elapsed.as_secs_f64(),
            "training finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LYRIC: &str = "we will we will rock you\nbuddy you're a boy make a big noise\n";

    fn session(config: TrainConfig) -> TrainingSession {
        TrainingSession::new(Corpus::from_text(LYRIC).unwrap(), config).unwrap()
    }

    fn small_config() -> TrainConfig {
        TrainConfig::new()
            .with_hidden_size(8)
            .with_window(5)
            .with_learning_rate(0.01)
            .with_init_scale(0.1)
            .with_sample_every(1_000)
            .with_seed(1)
    }

    fn window_loss(
        params: &Parameters,
        corpus: &Corpus,
        cursor: usize,
        l: usize,
        h0: &[f32],
    ) -> f32 {
        let w = corpus.window(cursor, l).unwrap();
        let mut tape = Tape::new();
        let fwd = params.forward(&mut tape, w.inputs, h0).unwrap();
        let loss = cross_entropy(&mut tape, &fwd.logits, w.targets);
        tape.data(loss)[0]
    }

    #[test]
    fn test_rejects_short_corpus() {
        let corpus = Corpus::from_text("abcdef").unwrap();
        let err = TrainingSession::new(corpus, TrainConfig::new().with_window(5))
            .err()
            .unwrap();
        assert!(matches!(err, RnnError::CorpusTooShort { len: 6, window: 5 }));

        let corpus = Corpus::from_text("abcdefg").unwrap();
        assert!(TrainingSession::new(corpus, TrainConfig::new().with_window(5)).is_ok());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let corpus = Corpus::from_text(LYRIC).unwrap();
        assert!(matches!(
            TrainingSession::new(corpus, TrainConfig::new().with_window(0)),
            Err(RnnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_cursor_advances_by_window() {
        let mut s = session(small_config());
        assert_eq!(s.cursor(), 0);
        s.step().unwrap();
        assert_eq!(s.cursor(), 5);
        s.step().unwrap();
        assert_eq!(s.cursor(), 10);
        assert_eq!(s.iteration(), 2);
        assert_eq!(s.passes(), 0);
    }

    #[test]
    fn test_hidden_carried_within_pass() {
        let mut s = session(small_config());
        s.step().unwrap();
        let carried = s.hidden().to_vec();
        assert!(carried.iter().any(|&h| h != 0.0));

        let params = s.parameters().clone();
        let expected = window_loss(&params, s.corpus(), s.cursor(), 5, &carried);
        let report = s.step().unwrap();
        assert!(!report.wrapped);
        assert!((report.loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_wrap_resets_hidden_state() {
        let mut s = session(small_config());
        let len = s.corpus().len();
        let l = 5;
        while s.cursor() + l + 1 < len {
            s.step().unwrap();
        }
        assert!(s.hidden().iter().any(|&h| h != 0.0));

        let params = s.parameters().clone();
        let expected = window_loss(&params, s.corpus(), 0, l, &[0.0; 8]);
        let report = s.step().unwrap();
        assert!(report.wrapped);
        assert_eq!(s.passes(), 1);
        assert_eq!(s.cursor(), l);
        assert!((report.loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_sample_is_read_only() {
        let mut s = session(small_config());
        for _ in 0..3 {
            s.step().unwrap();
        }
        let params = s.parameters().clone();
        let hidden = s.hidden().to_vec();
        let cursor = s.cursor();

        let text = s.sample(40).unwrap();
        assert_eq!(text.chars().count(), 40);
        assert!(text.chars().all(|c| s.corpus().vocab().index_of(c).is_some()));
        assert_eq!(s.parameters(), &params);
        assert_eq!(s.hidden(), hidden.as_slice());
        assert_eq!(s.cursor(), cursor);
        assert_eq!(s.phase(), Phase::Sampling);

        s.step().unwrap();
        assert_eq!(s.phase(), Phase::Running);
    }

    #[test]
    fn test_periodic_sampling() {
        let mut s = session(small_config().with_sample_every(3).with_sample_len(20));
        let reports: Vec<StepReport> = (0..6).map(|_| s.step().unwrap()).collect();
        for r in &reports {
            let sampled = r.iteration % 3 == 0;
            assert_eq!(r.sample.is_some(), sampled, "iteration {}", r.iteration);
            let expected = if sampled { Phase::Sampling } else { Phase::Running };
            assert_eq!(r.phase, expected, "iteration {}", r.iteration);
        }
        assert_eq!(s.phase(), Phase::Sampling);
        s.step().unwrap();
        assert_eq!(s.phase(), Phase::Running);
        assert_eq!(reports[5].sample.as_ref().unwrap().chars().count(), 20);
        assert_eq!(s.last_sample(), reports[5].sample.as_deref());
    }

    #[test]
    fn test_same_seed_same_run() {
        let mut a = session(small_config().with_sample_every(4).with_sample_len(30));
        let mut b = session(small_config().with_sample_every(4).with_sample_len(30));
        for _ in 0..8 {
            let (ra, rb) = (a.step().unwrap(), b.step().unwrap());
            assert_eq!(ra.loss, rb.loss);
            assert_eq!(ra.sample, rb.sample);
        }
        assert_eq!(a.parameters(), b.parameters());
    }

    #[test]
    fn test_non_finite_loss_aborts() {
        let mut s = session(small_config());
        s.parameters_mut().output_bias[0] = f32::NAN;
        let before = s.parameters().clone();
        let err = s.step().err().unwrap();
        assert!(matches!(err, RnnError::NonFiniteLoss { step: 1, .. }));
        assert_eq!(s.iteration(), 0);
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.parameters().hidden_hidden, before.hidden_hidden);
    }

    #[test]
    fn test_run_budget_and_callback() {
        let config = small_config()
            .with_sample_every(2)
            .with_print_every(4)
            .with_sample_len(10);
        let mut s = session(config);
        let mut events = Vec::new();
        let summary = s
            .run(Budget::steps(12), |e| events.push((e.iteration, e.text.to_string())))
            .unwrap();
        assert_eq!(summary.steps, 12);
        assert_eq!(s.iteration(), 12);
        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().map(|e| e.0).collect::<Vec<_>>(), vec![4, 8, 12]);
        assert!(events.iter().all(|e| e.1.chars().count() == 10));
        assert!(summary.best_loss <= summary.last_loss);
    }

    #[test]
    fn test_budget_exhausted() {
        assert!(!Budget::default().exhausted(1_000_000, Duration::from_secs(3600)));
        assert!(Budget::steps(3).exhausted(3, Duration::ZERO));
        assert!(!Budget::steps(3).exhausted(2, Duration::ZERO));
        let timed = Budget::default().with_time_limit(Duration::from_millis(10));
        assert!(timed.exhausted(0, Duration::from_millis(10)));
        assert!(Budget::steps(0).exhausted(0, Duration::ZERO));
    }

    #[test]
    fn test_loss_decreases_on_repetitive_text() {
        let corpus = Corpus::from_text("hello ".repeat(60)).unwrap();
        let config = TrainConfig::new()
            .with_hidden_size(16)
            .with_window(8)
            .with_learning_rate(0.01)
            .with_init_scale(0.1)
            .with_sample_every(10_000)
            .with_seed(3);
        let mut s = TrainingSession::new(corpus, config).unwrap();
        let losses: Vec<f32> = (0..300).map(|_| s.step().unwrap().loss).collect();
        let head: f32 = losses[..5].iter().sum::<f32>() / 5.0;
        let tail: f32 = losses[280..].iter().sum::<f32>() / 20.0;
        assert!(tail < head * 0.5, "head {head} tail {tail}");
        assert!(s.passes() > 0);
    }
}
