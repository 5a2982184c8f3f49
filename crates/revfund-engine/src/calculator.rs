//! # Claimable-Amount Policy
//!
//! The fund never decides on its own how much of an accrual a wallet is
//! entitled to; it asks a pluggable [`ClaimableAmountCalculator`].
//!
//! ## Provided calculators
//!
//! | Calculator | Entitlement |
//! |------------|-------------|
//! | [`ShareCalculator`] | fixed basis-point share per wallet, pro-rated by span length |
//! | [`BalanceBlocksCalculator`] | wallet balance-blocks over supply balance-blocks |

use parking_lot::RwLock;
use revfund_core::{Address, Amount, BlockNumber, BlockSpan};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Basis points making up 100%
pub const BASIS_POINTS: u32 = 10_000;

/// Policy deciding how much of an accrual a wallet may claim
pub trait ClaimableAmountCalculator: Send + Sync {
    /// Wallets categorically excluded from claiming
    fn is_non_claimer(&self, wallet: &Address) -> bool;

    /// Entitlement to a whole accrual of `total` spanning `epoch`
    fn calculate(&self, wallet: &Address, total: Amount, epoch: BlockSpan) -> Amount;

    /// Entitlement to the `sub` part of an accrual of `total` spanning `epoch`
    fn calculate_in_span(
        &self,
        wallet: &Address,
        total: Amount,
        epoch: BlockSpan,
        sub: BlockSpan,
    ) -> Amount;
}

/// One wallet's share in a [`ShareCalculator`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletShare {
    pub wallet: Address,
    pub basis_points: u32,
}

/// Fixed-share calculator
///
/// Each wallet owns a basis-point share of every accrual. A sub-span claim
/// gets the share scaled by `sub.len() / epoch.len()`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShareCalculator {
    #[serde(default)]
    shares: Vec<WalletShare>,

    #[serde(default)]
    non_claimers: Vec<Address>,
}

impl ShareCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a wallet's share, replacing any previous one
    pub fn with_share(mut self, wallet: Address, basis_points: u32) -> Self {
        self.shares.retain(|s| s.wallet != wallet);
        self.shares.push(WalletShare {
            wallet,
            basis_points,
        });
        self
    }

    pub fn with_non_claimer(mut self, wallet: Address) -> Self {
        if !self.non_claimers.contains(&wallet) {
            self.non_claimers.push(wallet);
        }
        self
    }

    pub fn share_of(&self, wallet: &Address) -> u32 {
        self.shares
            .iter()
            .find(|s| &s.wallet == wallet)
            .map(|s| s.basis_points)
            .unwrap_or(0)
    }
}

impl ClaimableAmountCalculator for ShareCalculator {
    fn is_non_claimer(&self, wallet: &Address) -> bool {
        self.non_claimers.contains(wallet)
    }

    fn calculate(&self, wallet: &Address, total: Amount, epoch: BlockSpan) -> Amount {
        self.calculate_in_span(wallet, total, epoch, epoch)
    }

    fn calculate_in_span(
        &self,
        wallet: &Address,
        total: Amount,
        epoch: BlockSpan,
        sub: BlockSpan,
    ) -> Amount {
        if total <= 0 || self.is_non_claimer(wallet) {
            return 0;
        }
        let share = total * self.share_of(wallet) as Amount / BASIS_POINTS as Amount;
        share * sub.len() as Amount / epoch.len() as Amount
    }
}

/// Source of balance-blocks: the integral of a balance over a block range
pub trait BalanceBlocksSource: Send + Sync {
    /// Balance-blocks held by `wallet` over `span`
    fn balance_blocks_in(&self, wallet: &Address, span: BlockSpan) -> u128;

    /// Balance-blocks of the whole supply over `span`
    fn supply_blocks_in(&self, span: BlockSpan) -> u128;
}

/// Holder-weighted calculator
///
/// A wallet's entitlement is the accrual total weighted by its balance-blocks
/// within the claimed span, relative to the supply balance-blocks of the
/// whole epoch.
pub struct BalanceBlocksCalculator<S: BalanceBlocksSource> {
    source: Arc<S>,
    non_claimers: HashSet<Address>,
}

impl<S: BalanceBlocksSource> BalanceBlocksCalculator<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            non_claimers: HashSet::new(),
        }
    }

    /// Exclude a wallet, typically the fund's own custody address
    pub fn with_non_claimer(mut self, wallet: Address) -> Self {
        self.non_claimers.insert(wallet);
        self
    }
}

impl<S: BalanceBlocksSource> ClaimableAmountCalculator for BalanceBlocksCalculator<S> {
    fn is_non_claimer(&self, wallet: &Address) -> bool {
        self.non_claimers.contains(wallet)
    }

    fn calculate(&self, wallet: &Address, total: Amount, epoch: BlockSpan) -> Amount {
        self.calculate_in_span(wallet, total, epoch, epoch)
    }

    fn calculate_in_span(
        &self,
        wallet: &Address,
        total: Amount,
        epoch: BlockSpan,
        sub: BlockSpan,
    ) -> Amount {
        if total <= 0 || self.is_non_claimer(wallet) {
            return 0;
        }
        let supply_blocks = self.source.supply_blocks_in(epoch);
        if supply_blocks == 0 {
            return 0;
        }
        let wallet_blocks = self.source.balance_blocks_in(wallet, sub);
        let amount = mul_div(total as u128, wallet_blocks, supply_blocks);
        Amount::try_from(amount).unwrap_or(Amount::MAX)
    }
}

/// `a * b / c` falling back to divide-first when the product overflows
fn mul_div(a: u128, b: u128, c: u128) -> u128 {
    match a.checked_mul(b) {
        Some(product) => product / c,
        None => (a / c).saturating_mul(b),
    }
}

/// In-memory balance history of token holders
///
/// Balances are step functions over the block axis: a value recorded at
/// block `b` holds from `b` until the next record.
#[derive(Default)]
pub struct BalanceHistory {
    holders: RwLock<HashMap<Address, Vec<(BlockNumber, u128)>>>,
    supply: RwLock<Vec<(BlockNumber, u128)>>,
}

impl BalanceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `wallet`'s balance as of `block`; supply follows the delta
    ///
    /// Blocks must be recorded in non-decreasing order per wallet.
    pub fn set_balance(&self, wallet: Address, block: BlockNumber, balance: u128) {
        let previous = {
            let mut holders = self.holders.write();
            let records = holders.entry(wallet).or_default();
            let previous = records.last().map(|&(_, v)| v).unwrap_or(0);
            push_record(records, block, balance);
            previous
        };

        let mut supply = self.supply.write();
        let current = supply.last().map(|&(_, v)| v).unwrap_or(0);
        let next = (current + balance).saturating_sub(previous);
        push_record(&mut supply, block, next);
    }

    /// Move `amount` between holders at `block`
    pub fn transfer(&self, from: Address, to: Address, amount: u128, block: BlockNumber) {
        let from_balance = self.balance_at(&from, block);
        let to_balance = self.balance_at(&to, block);
        self.set_balance(from, block, from_balance.saturating_sub(amount));
        self.set_balance(to, block, to_balance + amount);
    }

    /// Balance of `wallet` as of `block`
    pub fn balance_at(&self, wallet: &Address, block: BlockNumber) -> u128 {
        self.holders
            .read()
            .get(wallet)
            .map(|records| value_at(records, block))
            .unwrap_or(0)
    }
}

impl BalanceBlocksSource for BalanceHistory {
    fn balance_blocks_in(&self, wallet: &Address, span: BlockSpan) -> u128 {
        self.holders
            .read()
            .get(wallet)
            .map(|records| integrate(records, span))
            .unwrap_or(0)
    }

    fn supply_blocks_in(&self, span: BlockSpan) -> u128 {
        integrate(&self.supply.read(), span)
    }
}

fn push_record(records: &mut Vec<(BlockNumber, u128)>, block: BlockNumber, value: u128) {
    match records.last_mut() {
        Some(last) if last.0 == block => last.1 = value,
        _ => records.push((block, value)),
    }
}

fn value_at(records: &[(BlockNumber, u128)], block: BlockNumber) -> u128 {
    let pos = records.partition_point(|&(b, _)| b <= block);
    if pos == 0 {
        0
    } else {
        records[pos - 1].1
    }
}

/// Sum of `value * blocks` of every step intersecting `span`
fn integrate(records: &[(BlockNumber, u128)], span: BlockSpan) -> u128 {
    records
        .iter()
        .enumerate()
        .filter_map(|(i, &(from, value))| {
            let until = records
                .get(i + 1)
                .map(|&(next, _)| next.saturating_sub(1))
                .unwrap_or(BlockNumber::MAX);
            let step = BlockSpan {
                start_block: from,
                end_block: until,
            };
            step.clamp_to(&span)
                .map(|overlap| value.saturating_mul(overlap.len()))
        })
        .fold(0u128, u128::saturating_add)
}
