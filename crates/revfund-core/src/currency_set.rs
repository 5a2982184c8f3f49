//! Insertion-ordered currency set
//!
//! Membership and removal are O(1); removal moves the last element into the
//! vacated slot, so indices of the remaining currencies may change.

use crate::error::{CoreError, Result};
use crate::types::Currency;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Set of currencies with indexed range retrieval
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencySet {
    currencies: IndexSet<Currency>,
}

impl CurrencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a currency; returns false if already present
    pub fn add(&mut self, currency: Currency) -> bool {
        self.currencies.insert(currency)
    }

    /// Remove a currency; returns false if absent
    pub fn remove(&mut self, currency: &Currency) -> bool {
        self.currencies.swap_remove(currency)
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.currencies.contains(currency)
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Currency> {
        self.currencies.get_index(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.iter()
    }

    /// Currencies at indices `[low, up]`, with `up` clamped to the last index
    pub fn by_indices(&self, low: usize, up: usize) -> Result<Vec<Currency>> {
        if low > up {
            return Err(CoreError::InvalidRange {
                low: low as u64,
                up: up as u64,
            });
        }
        if self.currencies.is_empty() || low >= self.currencies.len() {
            return Ok(Vec::new());
        }
        let up = up.min(self.currencies.len() - 1);
        Ok((low..=up)
            .filter_map(|i| self.currencies.get_index(i).copied())
            .collect())
    }
}
