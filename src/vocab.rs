//! Character vocabulary built from the corpus itself.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Result, RnnError};

/// Sorted set of the symbols seen in a corpus, with lookups both ways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    symbols: Vec<char>,
    char_to_idx: HashMap<char, usize>,
}

impl Vocabulary {
    /// Collects the distinct characters of `text` in lexicographic order.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let symbols: Vec<char> = text.chars().collect::<BTreeSet<_>>().into_iter().collect();
        let char_to_idx = symbols.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        Self {
            symbols,
            char_to_idx,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    #[must_use]
    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    #[must_use]
    pub fn index_of(&self, c: char) -> Option<usize> {
        self.char_to_idx.get(&c).copied()
    }

    #[must_use]
    pub fn symbol_at(&self, idx: usize) -> Option<char> {
        self.symbols.get(idx).copied()
    }

    pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
        text.chars()
            .map(|c| self.index_of(c).ok_or(RnnError::UnknownSymbol(c)))
            .collect()
    }

    /// Indices outside the vocabulary are skipped.
    #[must_use]
    pub fn decode(&self, indices: &[usize]) -> String {
        indices.iter().filter_map(|&i| self.symbol_at(i)).collect()
    }
}
