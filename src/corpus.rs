//! Training text: records joined into one string, pre-encoded against its
//! own vocabulary so every index the driver touches is valid.

use std::{fs, path::Path};

use rand::Rng;
use tracing::{debug, info};

use crate::error::{Result, RnnError};
use crate::vocab::Vocabulary;

pub const DEFAULT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct Corpus {
    text: String,
    indices: Vec<usize>,
    vocab: Vocabulary,
}

/// One training example: `targets[t]` is the symbol following `inputs[t]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window<'a> {
    pub inputs: &'a [usize],
    pub targets: &'a [usize],
}

/// The values of `column` in a headed CSV file, in row order. Rows too short
/// to reach the column are skipped.
pub fn read_csv_column(path: impl AsRef<Path>, column: &str) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let col = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| RnnError::MissingColumn(column.to_string()))?;

    let mut values = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(field) = row.get(col) {
            values.push(field.to_string());
        }
    }
    info!(path = %path.display(), column, rows = values.len(), "loaded csv");
    Ok(values)
}

impl Corpus {
    pub fn from_text(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(RnnError::EmptyCorpus);
        }
        let vocab = Vocabulary::from_text(&text);
        let indices = vocab.encode(&text)?;
        Ok(Self {
            text,
            indices,
            vocab,
        })
    }

    /// Joins records with `separator`; record boundaries become ordinary symbols.
    pub fn from_records<I, S>(records: I, separator: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let mut count = 0usize;
        for record in records {
            let record = record.as_ref();
            if record.trim().is_empty() {
                continue;
            }
            if count > 0 {
                text.push_str(separator);
            }
            text.push_str(record);
            count += 1;
        }
        debug!(records = count, chars = text.chars().count(), "assembled corpus");
        Self::from_text(text)
    }

    /// Reads each file as one record.
    pub fn load_text_files<P: AsRef<Path>>(paths: &[P], separator: &str) -> Result<Self> {
        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let content = fs::read_to_string(path)?;
            info!(path = %path.as_ref().display(), chars = content.len(), "loaded text file");
            records.push(content);
        }
        Self::from_records(records, separator)
    }

    /// Reads one free-text `column` from a headed CSV file, one record per row.
    pub fn load_csv(path: impl AsRef<Path>, column: &str, separator: &str) -> Result<Self> {
        Self::from_records(read_csv_column(path, column)?, separator)
    }

    /// Length in symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[must_use]
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// The window of `len` symbols at `cursor`, or `None` when its targets
    /// would run past the end.
    #[must_use]
    pub fn window(&self, cursor: usize, len: usize) -> Option<Window<'_>> {
        let end = cursor.checked_add(len)?.checked_add(1)?;
        if len == 0 || end > self.indices.len() {
            return None;
        }
        Some(Window {
            inputs: &self.indices[cursor..cursor + len],
            targets: &self.indices[cursor + 1..end],
        })
    }

    /// A uniformly chosen run of `len` symbols, used to seed sampling.
    #[must_use]
    pub fn random_span(&self, len: usize, rng: &mut impl Rng) -> &[usize] {
        let len = len.min(self.indices.len());
        let start = rng.gen_range(0..=self.indices.len() - len);
        &self.indices[start..start + len]
    }
}
