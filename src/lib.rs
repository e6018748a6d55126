//! Character-level vanilla RNN trained on song lyrics.
//!
//! A [`Corpus`] is read from CSV or text files and encoded against its own
//! sorted [`Vocabulary`]. A [`TrainingSession`] then walks it in fixed-length
//! windows with truncated backpropagation through time, clips gradients, and
//! applies Adam, pausing at a fixed cadence to free-run the model and produce
//! a lyric sample.
//!
//! ```no_run
//! use lyric_rnn::{Budget, Corpus, TrainConfig, TrainingSession};
//!
//! # fn main() -> lyric_rnn::Result<()> {
//! let corpus = Corpus::load_csv("lyrics.csv", "lyrics", lyric_rnn::DEFAULT_SEPARATOR)?;
//! let mut session = TrainingSession::new(corpus, TrainConfig::new().with_seed(7))?;
//! session.run(Budget::steps(10_000), |event| println!("{}", event.text))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod corpus;
pub mod error;
pub mod model;
pub mod optim;
pub mod sample;
pub mod tape;
pub mod train;
pub mod vocab;

pub use config::TrainConfig;
pub use corpus::{read_csv_column, Corpus, Window, DEFAULT_SEPARATOR};
pub use error::{Result, RnnError};
pub use model::{one_hot, Parameters};
pub use sample::{generate, sample_categorical, softmax};
pub use train::{Budget, Phase, RunSummary, SampleEvent, StepReport, TrainingSession};
pub use vocab::Vocabulary;
