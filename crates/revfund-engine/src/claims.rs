//! # Claim Tracking
//!
//! Per (wallet, currency, accrual) claim state plus the planning logic that
//! turns a claim request into an amount and a list of record updates.
//!
//! ## Two-phase claims
//!
//! Planning only reads state. The resulting [`ClaimPlan`] is applied to the
//! [`ClaimTracker`] once every collaborator involved in the operation has
//! succeeded, so a failed forward leaves no claim behind.
//!
//! ## Claim modes
//!
//! | Mode | Recorded as | Blocked by |
//! |------|-------------|------------|
//! | Full accrual | `Completed` | `Completed`, any recorded span |
//! | Block sub-range | span in `Partial` | `Completed`, either endpoint inside a recorded span |
//!
//! Marking an accrual `Completed` discards its spans; a completed accrual
//! never records spans again.

use crate::accrual::AccrualPeriodManager;
use crate::calculator::ClaimableAmountCalculator;
use crate::error::{FundError, Result};
use indexmap::IndexSet;
use revfund_core::{Address, Amount, BlockNumber, BlockSpan, Currency};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Claim state of one wallet on one accrual
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimState {
    #[default]
    Unclaimed,
    /// Claimed as a whole
    Completed,
    /// Block spans already paid out, in claim order
    Partial(Vec<BlockSpan>),
}

static UNCLAIMED: ClaimState = ClaimState::Unclaimed;

impl ClaimState {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn spans(&self) -> &[BlockSpan] {
        match self {
            Self::Partial(spans) => spans,
            _ => &[],
        }
    }

    pub fn has_spans(&self) -> bool {
        !self.spans().is_empty()
    }

    /// Whether either endpoint of `span` falls inside a recorded span
    ///
    /// A span strictly containing a recorded span is not detected.
    pub fn endpoint_overlaps(&self, span: &BlockSpan) -> bool {
        self.spans()
            .iter()
            .any(|s| s.contains(span.start_block) || s.contains(span.end_block))
    }

    fn complete(&mut self) {
        *self = Self::Completed;
    }

    fn record_span(&mut self, span: BlockSpan) {
        match self {
            Self::Completed => {}
            Self::Unclaimed => *self = Self::Partial(vec![span]),
            Self::Partial(spans) => spans.push(span),
        }
    }
}

/// Composite key of a claim record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimKey {
    pub wallet: Address,
    pub currency: Currency,
    pub accrual_index: usize,
}

impl ClaimKey {
    pub fn new(wallet: Address, currency: Currency, accrual_index: usize) -> Self {
        Self {
            wallet,
            currency,
            accrual_index,
        }
    }
}

/// Range a claim was requested over
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimRange {
    Accruals {
        start_index: usize,
        end_index: usize,
    },
    Blocks {
        start_block: BlockNumber,
        end_block: BlockNumber,
    },
}

/// A single mutation of the claim tracker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimUpdate {
    Complete(ClaimKey),
    RecordSpan(ClaimKey, BlockSpan),
    /// Append to the wallet's fully-claimed accrual index ledger
    MarkAccrualClaimed(ClaimKey),
    AdvanceMaxClaimedBlock(ClaimKey, BlockNumber),
}

/// Amount a claim pays out plus the record updates it implies
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimPlan {
    pub amount: Amount,
    pub range: ClaimRange,
    pub updates: Vec<ClaimUpdate>,
}

impl ClaimPlan {
    fn new(range: ClaimRange) -> Self {
        Self {
            amount: 0,
            range,
            updates: Vec::new(),
        }
    }
}

/// Persistent claim records
#[derive(Clone, Debug, Default)]
pub struct ClaimTracker {
    records: HashMap<ClaimKey, ClaimState>,
    claimed_indices: HashMap<(Address, Currency), IndexSet<usize>>,
    max_claimed_blocks: HashMap<ClaimKey, BlockNumber>,
}

impl ClaimTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &ClaimKey) -> &ClaimState {
        self.records.get(key).unwrap_or(&UNCLAIMED)
    }

    pub fn fully_claimed(&self, key: &ClaimKey) -> bool {
        self.state(key).is_completed()
    }

    pub fn partially_claimed(&self, key: &ClaimKey) -> bool {
        self.state(key).has_spans()
    }

    pub fn spans(&self, key: &ClaimKey) -> &[BlockSpan] {
        self.state(key).spans()
    }

    /// Accrual indices fully claimed through claim-next, in claim order
    pub fn claimed_indices(&self, wallet: &Address, currency: &Currency) -> Vec<usize> {
        self.claimed_indices
            .get(&(*wallet, *currency))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn last_claimed_index(&self, wallet: &Address, currency: &Currency) -> Option<usize> {
        self.claimed_indices
            .get(&(*wallet, *currency))
            .and_then(|set| set.last().copied())
    }

    pub fn max_claimed_block(&self, key: &ClaimKey) -> Option<BlockNumber> {
        self.max_claimed_blocks.get(key).copied()
    }

    pub fn apply(&mut self, plan: &ClaimPlan) {
        for update in &plan.updates {
            match update {
                ClaimUpdate::Complete(key) => self.records.entry(*key).or_default().complete(),
                ClaimUpdate::RecordSpan(key, span) => {
                    self.records.entry(*key).or_default().record_span(*span)
                }
                ClaimUpdate::MarkAccrualClaimed(key) => {
                    self.claimed_indices
                        .entry((key.wallet, key.currency))
                        .or_default()
                        .insert(key.accrual_index);
                }
                ClaimUpdate::AdvanceMaxClaimedBlock(key, block) => {
                    let max = self.max_claimed_blocks.entry(*key).or_insert(*block);
                    *max = (*max).max(*block);
                }
            }
        }
    }
}

/// Read-only claim computation over accruals, claim records and policy
pub struct ClaimPlanner<'a> {
    accruals: &'a AccrualPeriodManager,
    tracker: &'a ClaimTracker,
    calculator: &'a dyn ClaimableAmountCalculator,
}

impl<'a> ClaimPlanner<'a> {
    pub fn new(
        accruals: &'a AccrualPeriodManager,
        tracker: &'a ClaimTracker,
        calculator: &'a dyn ClaimableAmountCalculator,
    ) -> Self {
        Self {
            accruals,
            tracker,
            calculator,
        }
    }

    /// Entitlement to a whole accrual
    pub fn claimable_amount(&self, wallet: &Address, currency: &Currency, index: usize) -> Amount {
        let Some(accrual) = self.accruals.accrual(currency, index) else {
            return 0;
        };
        let state = self.tracker.state(&ClaimKey::new(*wallet, *currency, index));
        if !accrual.is_claimable() || state.is_completed() || state.has_spans() {
            return 0;
        }
        self.calculator
            .calculate(wallet, accrual.amount, accrual.span())
    }

    /// Entitlement to the `sub` blocks of an accrual
    pub fn claimable_amount_in_span(
        &self,
        wallet: &Address,
        currency: &Currency,
        index: usize,
        sub: BlockSpan,
    ) -> Amount {
        let Some(accrual) = self.accruals.accrual(currency, index) else {
            return 0;
        };
        let state = self.tracker.state(&ClaimKey::new(*wallet, *currency, index));
        if !accrual.is_claimable() || state.is_completed() || state.endpoint_overlaps(&sub) {
            return 0;
        }
        self.calculator
            .calculate_in_span(wallet, accrual.amount, accrual.span(), sub)
    }

    /// Claim whole accruals `[start_index, min(end_index, last)]`
    ///
    /// Every visited accrual is marked completed, even when it paid nothing.
    pub fn by_accruals(
        &self,
        wallet: &Address,
        currency: &Currency,
        start_index: usize,
        end_index: usize,
    ) -> Result<ClaimPlan> {
        if start_index > end_index {
            return Err(FundError::InvalidRange {
                low: start_index as u64,
                up: end_index as u64,
            });
        }
        let count = self.accruals.closed_count(currency);
        if count == 0 {
            return Err(FundError::NoClosedAccruals(*currency));
        }

        let mut plan = ClaimPlan::new(ClaimRange::Accruals {
            start_index,
            end_index,
        });
        for index in start_index..=end_index.min(count - 1) {
            plan.amount += self.claimable_amount(wallet, currency, index);
            plan.updates
                .push(ClaimUpdate::Complete(ClaimKey::new(*wallet, *currency, index)));
        }
        Ok(plan)
    }

    /// Claim blocks `[start_block, end_block]` across accruals
    ///
    /// The accruals holding the two ends are claimed partially (one span
    /// each, or a single span when both ends share an accrual); accruals in
    /// between are claimed whole.
    pub fn by_blocks(
        &self,
        wallet: &Address,
        currency: &Currency,
        start_block: BlockNumber,
        end_block: BlockNumber,
    ) -> Result<ClaimPlan> {
        let requested = BlockSpan::new(start_block, end_block)?;
        if self.accruals.closed_count(currency) == 0 {
            return Err(FundError::NoClosedAccruals(*currency));
        }
        let out_of_scope = || FundError::BlockRangeOutOfScope {
            currency: *currency,
            start_block,
            end_block,
        };

        let end_index = self
            .accruals
            .index_at_or_before_block(currency, end_block)
            .ok_or_else(out_of_scope)?;
        let end_accrual = self
            .accruals
            .accrual(currency, end_index)
            .ok_or_else(out_of_scope)?;
        if start_block > end_accrual.end_block {
            return Err(out_of_scope());
        }
        let start_index = self
            .accruals
            .index_at_or_before_block(currency, start_block)
            .unwrap_or(0);

        let mut plan = ClaimPlan::new(ClaimRange::Blocks {
            start_block,
            end_block,
        });
        if start_index < end_index {
            self.plan_partial(wallet, currency, start_index, requested, &mut plan);
        }
        for index in (start_index + 1)..end_index {
            plan.amount += self.claimable_amount(wallet, currency, index);
            plan.updates
                .push(ClaimUpdate::Complete(ClaimKey::new(*wallet, *currency, index)));
        }
        self.plan_partial(wallet, currency, end_index, requested, &mut plan);
        Ok(plan)
    }

    fn plan_partial(
        &self,
        wallet: &Address,
        currency: &Currency,
        index: usize,
        requested: BlockSpan,
        plan: &mut ClaimPlan,
    ) {
        let Some(accrual) = self.accruals.accrual(currency, index) else {
            return;
        };
        let Some(sub) = requested.clamp_to(&accrual.span()) else {
            return;
        };
        let key = ClaimKey::new(*wallet, *currency, index);
        let state = self.tracker.state(&key);
        if state.is_completed() || state.endpoint_overlaps(&sub) {
            return;
        }
        plan.amount += self.claimable_amount_in_span(wallet, currency, index, sub);
        plan.updates.push(ClaimUpdate::RecordSpan(key, sub));
    }

    /// Claim the wallet's next accrual, whole or one block batch at a time
    ///
    /// Resumes after the last index in the wallet's claimed-accrual ledger.
    /// With a batch size, the window starts after the accrual's max claimed
    /// block and the accrual joins the ledger once the window reaches its end.
    pub fn next(
        &self,
        wallet: &Address,
        currency: &Currency,
        batch_size: Option<u64>,
    ) -> Result<ClaimPlan> {
        if self.accruals.closed_count(currency) == 0 {
            return Err(FundError::NoClosedAccruals(*currency));
        }
        let index = self
            .tracker
            .last_claimed_index(wallet, currency)
            .map(|i| i + 1)
            .unwrap_or(0);
        let accrual = self
            .accruals
            .accrual(currency, index)
            .ok_or(FundError::NoUnclaimedAccrual {
                wallet: *wallet,
                currency: *currency,
            })?;
        let key = ClaimKey::new(*wallet, *currency, index);

        let Some(batch_size) = batch_size else {
            let mut plan = self.by_accruals(wallet, currency, index, index)?;
            plan.updates.push(ClaimUpdate::MarkAccrualClaimed(key));
            return Ok(plan);
        };

        let start_block = self
            .tracker
            .max_claimed_block(&key)
            .map(|b| b + 1)
            .unwrap_or(accrual.start_block);
        let end_block = start_block
            .saturating_add(batch_size.max(1) - 1)
            .min(accrual.end_block);

        let mut plan = self.by_blocks(wallet, currency, start_block, end_block)?;
        plan.updates
            .push(ClaimUpdate::AdvanceMaxClaimedBlock(key, end_block));
        if end_block == accrual.end_block {
            plan.updates.push(ClaimUpdate::MarkAccrualClaimed(key));
        }
        Ok(plan)
    }
}
