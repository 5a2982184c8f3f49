//! # Accrual Period Manager
//!
//! Owns the open period's per-currency accumulation and the append-only
//! history of closed accruals.
//!
//! ## Partition invariant
//!
//! Per currency, closed accruals partition the block axis without gaps:
//!
//! | Accrual | start_block | end_block |
//! |---------|-------------|-----------|
//! | 0 | baseline | close block 0 |
//! | i > 0 | end_block(i-1) + 1 | close block i |
//!
//! Closing a currency whose period amount is not strictly positive still
//! appends an accrual, but neither resets the accumulator nor drops the
//! currency from the open period.

use crate::error::{FundError, Result};
use revfund_core::{Amount, BlockNumber, BlockSpan, Currency, CurrencySet, FungibleBalance};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One closed revenue epoch of one currency
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accrual {
    pub start_block: BlockNumber,
    pub end_block: BlockNumber,
    pub amount: Amount,
}

impl Accrual {
    pub fn span(&self) -> BlockSpan {
        BlockSpan {
            start_block: self.start_block,
            end_block: self.end_block,
        }
    }

    /// Only strictly positive accruals can be claimed from
    pub fn is_claimable(&self) -> bool {
        self.amount > 0
    }
}

/// Outcome of closing one currency's period
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedAccrual {
    pub currency: Currency,
    pub index: usize,
    pub accrual: Accrual,
    /// Aggregate balance of the currency at the close block
    pub aggregate_amount: Amount,
}

/// Period accumulators plus closed accrual history
#[derive(Clone, Debug)]
pub struct AccrualPeriodManager {
    baseline_block: BlockNumber,
    period_balance: FungibleBalance,
    aggregate_balance: FungibleBalance,
    period_currencies: CurrencySet,
    aggregate_currencies: CurrencySet,
    accruals: HashMap<Currency, Vec<Accrual>>,
    aggregate_snapshots: HashMap<(Currency, BlockNumber), Amount>,
}

impl AccrualPeriodManager {
    pub fn new(baseline_block: BlockNumber) -> Self {
        Self {
            baseline_block,
            period_balance: FungibleBalance::new(),
            aggregate_balance: FungibleBalance::new(),
            period_currencies: CurrencySet::new(),
            aggregate_currencies: CurrencySet::new(),
            accruals: HashMap::new(),
            aggregate_snapshots: HashMap::new(),
        }
    }

    /// Book funds received during the open period
    pub fn record_receipt(&mut self, currency: Currency, amount: Amount) {
        self.period_balance.add(currency, amount);
        self.aggregate_balance.add(currency, amount);
        self.period_currencies.add(currency);
        self.aggregate_currencies.add(currency);
    }

    /// Start block of the next accrual of `currency`
    ///
    /// `None` once an accrual has ended at `BlockNumber::MAX`.
    pub fn next_start_block(&self, currency: &Currency) -> Option<BlockNumber> {
        match self.accruals.get(currency).and_then(|accruals| accruals.last()) {
            Some(last) => last.end_block.checked_add(1),
            None => Some(self.baseline_block),
        }
    }

    /// Start block of the accrual closing `currency` at `block`
    fn closable_start_block(&self, currency: &Currency, block: BlockNumber) -> Result<BlockNumber> {
        match self.next_start_block(currency) {
            Some(start_block) if start_block <= block => Ok(start_block),
            start_block => Err(FundError::PeriodNotAdvanced {
                currency: *currency,
                start_block: start_block.unwrap_or(BlockNumber::MAX),
                block_number: block,
            }),
        }
    }

    /// Refuse the close if any currency's next accrual would start after `block`
    pub fn check_closable(&self, currencies: &[Currency], block: BlockNumber) -> Result<()> {
        for currency in currencies {
            self.closable_start_block(currency, block)?;
        }
        Ok(())
    }

    /// Close the open period of each currency at `block`
    pub fn close_period(
        &mut self,
        currencies: &[Currency],
        block: BlockNumber,
    ) -> Result<Vec<ClosedAccrual>> {
        let mut unique = CurrencySet::new();
        for currency in currencies {
            unique.add(*currency);
        }
        let currencies: Vec<Currency> = unique.iter().copied().collect();
        self.check_closable(&currencies, block)?;

        let mut closed = Vec::with_capacity(currencies.len());
        for currency in &currencies {
            let accrual = Accrual {
                start_block: self.closable_start_block(currency, block)?,
                end_block: block,
                amount: self.period_balance.get(currency),
            };
            let history = self.accruals.entry(*currency).or_default();
            history.push(accrual);
            let index = history.len() - 1;

            let aggregate_amount = self.aggregate_balance.get(currency);
            self.aggregate_snapshots
                .insert((*currency, block), aggregate_amount);

            if accrual.amount > 0 {
                self.period_balance.set(*currency, 0);
                self.period_currencies.remove(currency);
            }

            closed.push(ClosedAccrual {
                currency: *currency,
                index,
                accrual,
                aggregate_amount,
            });
        }
        Ok(closed)
    }

    /// Index of the last accrual starting at or before `block`
    ///
    /// `None` when every accrual starts after `block`. Accrual start blocks
    /// increase strictly, so this is a binary search.
    pub fn index_at_or_before_block(
        &self,
        currency: &Currency,
        block: BlockNumber,
    ) -> Option<usize> {
        let accruals = self.accruals(currency);
        let pos = accruals.partition_point(|a| a.start_block <= block);
        pos.checked_sub(1)
    }

    pub fn accruals(&self, currency: &Currency) -> &[Accrual] {
        self.accruals
            .get(currency)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn accrual(&self, currency: &Currency, index: usize) -> Option<&Accrual> {
        self.accruals(currency).get(index)
    }

    pub fn closed_count(&self, currency: &Currency) -> usize {
        self.accruals(currency).len()
    }

    pub fn period_balance(&self, currency: &Currency) -> Amount {
        self.period_balance.get(currency)
    }

    pub fn aggregate_balance(&self, currency: &Currency) -> Amount {
        self.aggregate_balance.get(currency)
    }

    /// Aggregate balance snapshotted when a period closed at `block`
    pub fn aggregate_at_close(&self, currency: &Currency, block: BlockNumber) -> Amount {
        self.aggregate_snapshots
            .get(&(*currency, block))
            .copied()
            .unwrap_or(0)
    }

    pub fn period_currencies(&self) -> &CurrencySet {
        &self.period_currencies
    }

    pub fn aggregate_currencies(&self) -> &CurrencySet {
        &self.aggregate_currencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revfund_core::Address;

    fn currency() -> Currency {
        Currency::fungible(Address::repeat_byte(0x70))
    }

    #[test]
    fn test_first_accrual_starts_at_baseline() {
        let mut manager = AccrualPeriodManager::new(5);
        manager.record_receipt(currency(), 100);

        let closed = manager.close_period(&[currency()], 20).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(
            closed[0].accrual,
            Accrual {
                start_block: 5,
                end_block: 20,
                amount: 100
            }
        );
        assert_eq!(closed[0].aggregate_amount, 100);
        assert_eq!(manager.period_balance(&currency()), 0);
        assert!(!manager.period_currencies().contains(&currency()));
        assert!(manager.aggregate_currencies().contains(&currency()));
    }

    #[test]
    fn test_accruals_are_contiguous() {
        let mut manager = AccrualPeriodManager::new(0);
        manager.record_receipt(currency(), 50);
        manager.close_period(&[currency()], 10).unwrap();
        manager.record_receipt(currency(), 70);
        manager.close_period(&[currency()], 25).unwrap();

        let accruals = manager.accruals(&currency());
        assert_eq!(accruals[0].span(), BlockSpan::new(0, 10).unwrap());
        assert_eq!(accruals[1].span(), BlockSpan::new(11, 25).unwrap());
        assert_eq!(accruals[1].amount, 70);
        assert_eq!(manager.aggregate_balance(&currency()), 120);
        assert_eq!(manager.aggregate_at_close(&currency(), 10), 50);
        assert_eq!(manager.aggregate_at_close(&currency(), 25), 120);
        assert_eq!(manager.aggregate_at_close(&currency(), 11), 0);
    }

    #[test]
    fn test_non_positive_close_keeps_accumulator() {
        let mut manager = AccrualPeriodManager::new(0);
        manager.record_receipt(currency(), 40);
        manager.close_period(&[currency()], 5).unwrap();

        // Nothing new received: a zero accrual is appended and the currency
        // stays out of the open period since it was dropped by the first close
        manager.close_period(&[currency()], 8).unwrap();
        manager.close_period(&[currency()], 9).unwrap();

        let accruals = manager.accruals(&currency());
        assert_eq!(accruals.len(), 3);
        assert_eq!(accruals[1].amount, 0);
        assert_eq!(accruals[2].span(), BlockSpan::new(9, 9).unwrap());
    }

    #[test]
    fn test_negative_period_is_not_reset() {
        let mut manager = AccrualPeriodManager::new(0);
        manager.record_receipt(currency(), -30);
        manager.close_period(&[currency()], 5).unwrap();
        manager.close_period(&[currency()], 6).unwrap();

        let accruals = manager.accruals(&currency());
        assert_eq!(accruals[0].amount, -30);
        assert_eq!(accruals[1].amount, -30);
        assert_eq!(manager.period_balance(&currency()), -30);
        assert!(manager.period_currencies().contains(&currency()));
    }

    #[test]
    fn test_close_refused_without_advancing_clock() {
        let mut manager = AccrualPeriodManager::new(0);
        manager.record_receipt(currency(), 10);
        manager.close_period(&[currency()], 5).unwrap();

        let result = manager.close_period(&[currency()], 5);
        assert!(matches!(
            result,
            Err(FundError::PeriodNotAdvanced {
                start_block: 6,
                block_number: 5,
                ..
            })
        ));
        assert_eq!(manager.closed_count(&currency()), 1);
    }

    #[test]
    fn test_close_at_end_of_block_axis() {
        let mut manager = AccrualPeriodManager::new(0);
        manager.record_receipt(currency(), 10);
        let closed = manager.close_period(&[currency()], u64::MAX).unwrap();
        assert_eq!(closed[0].accrual.span().len(), u128::from(u64::MAX) + 1);
        assert_eq!(manager.next_start_block(&currency()), None);

        let result = manager.close_period(&[currency()], u64::MAX);
        assert!(matches!(result, Err(FundError::PeriodNotAdvanced { .. })));
        assert_eq!(manager.closed_count(&currency()), 1);
    }

    #[test]
    fn test_duplicate_currencies_close_once() {
        let mut manager = AccrualPeriodManager::new(0);
        manager.record_receipt(currency(), 10);

        let closed = manager.close_period(&[currency(), currency()], 5).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(manager.closed_count(&currency()), 1);
    }

    #[test]
    fn test_index_at_or_before_block() {
        let mut manager = AccrualPeriodManager::new(10);
        assert_eq!(manager.index_at_or_before_block(&currency(), 50), None);

        manager.close_period(&[currency()], 20).unwrap();
        manager.close_period(&[currency()], 30).unwrap();

        assert_eq!(manager.index_at_or_before_block(&currency(), 9), None);
        assert_eq!(manager.index_at_or_before_block(&currency(), 10), Some(0));
        assert_eq!(manager.index_at_or_before_block(&currency(), 20), Some(0));
        assert_eq!(manager.index_at_or_before_block(&currency(), 21), Some(1));
        assert_eq!(manager.index_at_or_before_block(&currency(), 500), Some(1));
    }
}
