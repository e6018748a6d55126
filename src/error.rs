use thiserror::Error;

#[derive(Error, Debug)]
pub enum RnnError {
    #[error("corpus is empty: nothing to build a vocabulary from")]
    EmptyCorpus,

    #[error("corpus has {len} symbols but a window of {window} needs at least {}", .window + 2)]
    CorpusTooShort { len: usize, window: usize },

    #[error("symbol {0:?} is not in the vocabulary")]
    UnknownSymbol(char),

    #[error("index {index} out of range for vocabulary of size {vocab_size}")]
    IndexOutOfRange { index: usize, vocab_size: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("column {0:?} not found in CSV header")]
    MissingColumn(String),

    #[error("loss became non-finite ({loss}) at step {step}")]
    NonFiniteLoss { step: usize, loss: f32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RnnError>;
