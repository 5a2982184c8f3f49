//! # Revenue Fund
//!
//! The aggregate root: receives revenue, closes accrual periods, turns
//! claims into staged balances or forwards them to beneficiaries, and pays
//! staged balances out on withdrawal.
//!
//! ## Atomicity
//!
//! All state lives behind one mutex held for the whole of each entry point,
//! collaborator calls included. Every mutating operation runs as
//!
//! ```text
//! validate ──► plan (read-only) ──► collaborators ──► apply
//! ```
//!
//! so a refused precondition or a failing collaborator leaves the fund
//! untouched.

use crate::accrual::{Accrual, AccrualPeriodManager, ClosedAccrual};
use crate::beneficiary::Beneficiary;
use crate::calculator::ClaimableAmountCalculator;
use crate::claims::{ClaimKey, ClaimPlan, ClaimPlanner, ClaimTracker};
use crate::config::FundConfig;
use crate::error::{FundError, Result};
use crate::events::FundEvent;
use crate::gate::{ServiceGate, CLOSE_ACCRUAL_PERIOD_ACTION};
use crate::transfer::{ControllerResolver, NativeTransfer};
use parking_lot::Mutex;
use revfund_core::{Address, Amount, BalanceLedger, BlockClock, BlockNumber, BlockSpan, Currency};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SET_CALCULATOR_ACTION: &str = "set_calculator";
const SET_BATCH_SIZE_ACTION: &str = "set_claim_block_batch_size";

/// Host capabilities the fund is wired to at construction
#[derive(Clone)]
pub struct FundCollaborators {
    pub clock: Arc<dyn BlockClock>,
    pub resolver: Arc<dyn ControllerResolver>,
    pub native: Arc<dyn NativeTransfer>,
    pub gate: Arc<dyn ServiceGate>,
    pub calculator: Arc<dyn ClaimableAmountCalculator>,
}

/// Where a forwarded claim goes
#[derive(Clone)]
pub struct ForwardTarget {
    pub beneficiary: Arc<dyn Beneficiary>,
    /// Wallet credited at the beneficiary
    pub destination: Address,
    /// Falls back to the configured default balance type
    pub balance_type: Option<String>,
    /// Falls back to the configured default standard
    pub standard: Option<String>,
}

impl ForwardTarget {
    pub fn new(beneficiary: Arc<dyn Beneficiary>, destination: Address) -> Self {
        Self {
            beneficiary,
            destination,
            balance_type: None,
            standard: None,
        }
    }

    pub fn with_balance_type(mut self, balance_type: impl Into<String>) -> Self {
        self.balance_type = Some(balance_type.into());
        self
    }

    pub fn with_standard(mut self, standard: impl Into<String>) -> Self {
        self.standard = Some(standard.into());
        self
    }
}

struct FundState {
    calculator: Arc<dyn ClaimableAmountCalculator>,
    claim_block_batch_size: Option<u64>,
    accruals: AccrualPeriodManager,
    claims: ClaimTracker,
    staged: BalanceLedger,
    events: Vec<FundEvent>,
}

impl FundState {
    fn planner(&self) -> ClaimPlanner<'_> {
        ClaimPlanner::new(&self.accruals, &self.claims, self.calculator.as_ref())
    }

    fn ensure_claimer(&self, wallet: &Address) -> Result<()> {
        if self.calculator.is_non_claimer(wallet) {
            return Err(FundError::NonClaimer(*wallet));
        }
        Ok(())
    }

    fn emit(&mut self, event: FundEvent) {
        debug!(event = event.name(), "Fund event: {:?}", event);
        self.events.push(event);
    }
}

/// Multi-currency revenue accrual fund
pub struct RevenueFund {
    config: FundConfig,
    clock: Arc<dyn BlockClock>,
    resolver: Arc<dyn ControllerResolver>,
    native: Arc<dyn NativeTransfer>,
    gate: Arc<dyn ServiceGate>,
    state: Mutex<FundState>,
}

impl RevenueFund {
    pub fn new(config: FundConfig, collaborators: FundCollaborators) -> Result<Self> {
        config.validate()?;
        info!(
            "Revenue fund initialized: address={}, baseline_block={}, batch_size={:?}",
            config.fund_address, config.baseline_block, config.claim_block_batch_size
        );
        let state = FundState {
            calculator: collaborators.calculator,
            claim_block_batch_size: config.claim_block_batch_size,
            accruals: AccrualPeriodManager::new(config.baseline_block),
            claims: ClaimTracker::new(),
            staged: BalanceLedger::new(),
            events: Vec::new(),
        };
        Ok(Self {
            config,
            clock: collaborators.clock,
            resolver: collaborators.resolver,
            native: collaborators.native,
            gate: collaborators.gate,
            state: Mutex::new(state),
        })
    }

    pub fn config(&self) -> &FundConfig {
        &self.config
    }

    pub fn block_number(&self) -> BlockNumber {
        self.clock.block_number()
    }

    // ========================================================================
    // Receiving and period closing
    // ========================================================================

    /// Book revenue from `wallet` using the default controller standard
    pub fn receive(&self, wallet: &Address, amount: Amount, currency: &Currency) -> Result<()> {
        let standard = self.config.default_standard.clone();
        self.receive_with_standard(wallet, amount, currency, &standard)
    }

    /// Book revenue from `wallet`
    ///
    /// Native value is already in custody when this is called. Any other
    /// currency is pulled from `wallet` into the fund first.
    pub fn receive_with_standard(
        &self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        standard: &str,
    ) -> Result<()> {
        if amount <= 0 {
            return Err(FundError::NonPositiveAmount(amount));
        }
        let mut state = self.state.lock();

        if !self.config.is_native(currency) {
            let controller = self.resolver.resolve(currency, standard)?;
            controller
                .pull(wallet, &self.config.fund_address, amount, currency)
                .map_err(|e| {
                    warn!("Pull of {} {} from {} failed: {}", amount, currency, wallet, e);
                    e
                })?;
        }

        let block_number = self.clock.block_number();
        state.accruals.record_receipt(*currency, amount);
        info!(%wallet, %currency, amount = %amount, block_number, "Revenue received");
        state.emit(FundEvent::Received {
            wallet: *wallet,
            currency: *currency,
            amount,
            block_number,
        });
        Ok(())
    }

    /// Close the open period of each currency at the current block
    pub fn close_accrual_period(
        &self,
        caller: &Address,
        currencies: &[Currency],
    ) -> Result<Vec<ClosedAccrual>> {
        self.ensure_gate(caller)?;
        let mut state = self.state.lock();
        self.close_locked(&mut state, currencies)
    }

    /// Close the open period of every currency with open-period activity
    pub fn close_period_for_all(&self, caller: &Address) -> Result<Vec<ClosedAccrual>> {
        self.ensure_gate(caller)?;
        let mut state = self.state.lock();
        let currencies: Vec<Currency> = state.accruals.period_currencies().iter().copied().collect();
        self.close_locked(&mut state, &currencies)
    }

    fn ensure_gate(&self, caller: &Address) -> Result<()> {
        if !self.gate.is_enabled(CLOSE_ACCRUAL_PERIOD_ACTION, caller) {
            return Err(FundError::Unauthorized {
                caller: *caller,
                action: CLOSE_ACCRUAL_PERIOD_ACTION.to_string(),
            });
        }
        Ok(())
    }

    fn close_locked(
        &self,
        state: &mut FundState,
        currencies: &[Currency],
    ) -> Result<Vec<ClosedAccrual>> {
        let block_number = self.clock.block_number();
        let closed = state.accruals.close_period(currencies, block_number)?;
        for c in &closed {
            if c.accrual.amount <= 0 {
                warn!(
                    "Closed non-positive period of {} at block {}: accumulator kept at {}",
                    c.currency, block_number, c.accrual.amount
                );
            }
            info!(
                "Closed accrual {} of {}: [{}, {}] amount={} aggregate={}",
                c.index,
                c.currency,
                c.accrual.start_block,
                c.accrual.end_block,
                c.accrual.amount,
                c.aggregate_amount
            );
            state.emit(FundEvent::PeriodClosed {
                currency: c.currency,
                accrual_index: c.index,
                period_amount: c.accrual.amount,
                aggregate_amount: c.aggregate_amount,
                start_block: c.accrual.start_block,
                end_block: c.accrual.end_block,
            });
        }
        Ok(closed)
    }

    // ========================================================================
    // Claimable-amount queries
    // ========================================================================

    /// Entitlement to one whole accrual; 0 for unknown indices
    pub fn claimable_amount(&self, wallet: &Address, currency: &Currency, index: usize) -> Amount {
        self.state.lock().planner().claimable_amount(wallet, currency, index)
    }

    /// Entitlement to blocks `[start_block, end_block]` of one accrual
    pub fn claimable_amount_in_span(
        &self,
        wallet: &Address,
        currency: &Currency,
        index: usize,
        start_block: BlockNumber,
        end_block: BlockNumber,
    ) -> Result<Amount> {
        let requested = BlockSpan::new(start_block, end_block)?;
        let state = self.state.lock();
        let Some(sub) = state
            .accruals
            .accrual(currency, index)
            .and_then(|a| requested.clamp_to(&a.span()))
        else {
            return Ok(0);
        };
        Ok(state
            .planner()
            .claimable_amount_in_span(wallet, currency, index, sub))
    }

    /// What [`Self::stage_by_accruals`] would claim right now
    pub fn claimable_amount_by_accruals(
        &self,
        wallet: &Address,
        currency: &Currency,
        start_index: usize,
        end_index: usize,
    ) -> Result<Amount> {
        let state = self.state.lock();
        let planned = state
            .planner()
            .by_accruals(wallet, currency, start_index, end_index);
        Self::query_amount(&state, wallet, planned)
    }

    /// What [`Self::stage_by_blocks`] would claim right now
    pub fn claimable_amount_by_blocks(
        &self,
        wallet: &Address,
        currency: &Currency,
        start_block: BlockNumber,
        end_block: BlockNumber,
    ) -> Result<Amount> {
        let state = self.state.lock();
        let planned = state
            .planner()
            .by_blocks(wallet, currency, start_block, end_block);
        Self::query_amount(&state, wallet, planned)
    }

    /// Queries only fail on reversed bounds
    fn query_amount(
        state: &FundState,
        wallet: &Address,
        planned: Result<ClaimPlan>,
    ) -> Result<Amount> {
        match planned {
            Ok(_) if state.calculator.is_non_claimer(wallet) => Ok(0),
            Ok(plan) => Ok(plan.amount),
            Err(FundError::NoClosedAccruals(_)) | Err(FundError::BlockRangeOutOfScope { .. }) => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Claim and stage
    // ========================================================================

    /// Claim whole accruals into the wallet's staged balance
    pub fn stage_by_accruals(
        &self,
        wallet: &Address,
        currency: &Currency,
        start_index: usize,
        end_index: usize,
    ) -> Result<Amount> {
        self.stage(wallet, currency, |state| {
            state.planner().by_accruals(wallet, currency, start_index, end_index)
        })
    }

    /// Claim a block range into the wallet's staged balance
    pub fn stage_by_blocks(
        &self,
        wallet: &Address,
        currency: &Currency,
        start_block: BlockNumber,
        end_block: BlockNumber,
    ) -> Result<Amount> {
        self.stage(wallet, currency, |state| {
            state.planner().by_blocks(wallet, currency, start_block, end_block)
        })
    }

    /// Claim the wallet's next accrual (or next block batch) into staging
    pub fn stage_next(&self, wallet: &Address, currency: &Currency) -> Result<Amount> {
        self.stage(wallet, currency, |state| {
            state
                .planner()
                .next(wallet, currency, state.claim_block_batch_size)
        })
    }

    fn stage<F>(&self, wallet: &Address, currency: &Currency, plan: F) -> Result<Amount>
    where
        F: FnOnce(&FundState) -> Result<ClaimPlan>,
    {
        let mut state = self.state.lock();
        state.ensure_claimer(wallet)?;
        let plan = plan(&*state)?;
        debug!("Claim plan for {} in {}: {:?}", wallet, currency, plan);

        state.claims.apply(&plan);
        if plan.amount > 0 {
            state.staged.add(*wallet, *currency, plan.amount);
        }
        info!(%wallet, %currency, amount = %plan.amount, range = ?plan.range, "Claimed and staged");
        state.emit(FundEvent::ClaimedAndStaged {
            wallet: *wallet,
            currency: *currency,
            amount: plan.amount,
            range: plan.range,
        });
        Ok(plan.amount)
    }

    // ========================================================================
    // Claim and forward
    // ========================================================================

    /// Claim whole accruals and hand them straight to a beneficiary
    pub fn forward_by_accruals(
        &self,
        wallet: &Address,
        currency: &Currency,
        start_index: usize,
        end_index: usize,
        target: &ForwardTarget,
    ) -> Result<Amount> {
        self.forward(wallet, currency, target, |state| {
            state.planner().by_accruals(wallet, currency, start_index, end_index)
        })
    }

    /// Claim a block range and hand it straight to a beneficiary
    pub fn forward_by_blocks(
        &self,
        wallet: &Address,
        currency: &Currency,
        start_block: BlockNumber,
        end_block: BlockNumber,
        target: &ForwardTarget,
    ) -> Result<Amount> {
        self.forward(wallet, currency, target, |state| {
            state.planner().by_blocks(wallet, currency, start_block, end_block)
        })
    }

    /// Claim the wallet's next accrual (or next block batch) and forward it
    pub fn forward_next(
        &self,
        wallet: &Address,
        currency: &Currency,
        target: &ForwardTarget,
    ) -> Result<Amount> {
        self.forward(wallet, currency, target, |state| {
            state
                .planner()
                .next(wallet, currency, state.claim_block_batch_size)
        })
    }

    fn forward<F>(
        &self,
        wallet: &Address,
        currency: &Currency,
        target: &ForwardTarget,
        plan: F,
    ) -> Result<Amount>
    where
        F: FnOnce(&FundState) -> Result<ClaimPlan>,
    {
        let mut state = self.state.lock();
        state.ensure_claimer(wallet)?;
        let plan = plan(&*state)?;

        let balance_type = target
            .balance_type
            .clone()
            .unwrap_or_else(|| self.config.default_balance_type.clone());
        if plan.amount > 0 {
            self.deliver(currency, plan.amount, target, &balance_type)
                .map_err(|e| {
                    warn!(
                        "Forward of {} {} for {} failed: {}",
                        plan.amount, currency, wallet, e
                    );
                    e
                })?;
        }

        state.claims.apply(&plan);
        let beneficiary = target.beneficiary.address();
        info!(
            %wallet, %currency, %beneficiary, amount = %plan.amount, range = ?plan.range,
            "Claimed and forwarded"
        );
        state.emit(FundEvent::ClaimedAndForwarded {
            wallet: *wallet,
            currency: *currency,
            amount: plan.amount,
            range: plan.range,
            beneficiary,
            balance_type,
        });
        Ok(plan.amount)
    }

    /// Push `amount` to the beneficiary, undoing the push if it refuses
    fn deliver(
        &self,
        currency: &Currency,
        amount: Amount,
        target: &ForwardTarget,
        balance_type: &str,
    ) -> Result<()> {
        let beneficiary = target.beneficiary.as_ref();
        let fund = &self.config.fund_address;
        let recipient = beneficiary.address();

        if self.config.is_native(currency) {
            self.native.send(fund, &recipient, amount)?;
            if let Err(e) = beneficiary.receive_native(&target.destination, balance_type, amount) {
                if let Err(refund) = self.native.send(&recipient, fund, amount) {
                    warn!("Refund of {} native from {} failed: {}", amount, recipient, refund);
                }
                return Err(e.into());
            }
            return Ok(());
        }

        let standard = target
            .standard
            .as_deref()
            .unwrap_or(&self.config.default_standard);
        let controller = self.resolver.resolve(currency, standard)?;
        controller.approve(fund, &recipient, amount, currency)?;
        let received = beneficiary.receive_tokens(
            fund,
            &target.destination,
            balance_type,
            amount,
            currency,
            standard,
        );
        if let Err(e) = received {
            if let Err(revoke) = controller.approve(fund, &recipient, 0, currency) {
                warn!("Revoking approval of {} to {} failed: {}", currency, recipient, revoke);
            }
            return Err(e.into());
        }
        Ok(())
    }

    // ========================================================================
    // Withdrawal
    // ========================================================================

    /// Pay out up to `amount` of the wallet's staged balance
    pub fn withdraw(&self, wallet: &Address, amount: Amount, currency: &Currency) -> Result<Amount> {
        let standard = self.config.default_standard.clone();
        self.withdraw_with_standard(wallet, amount, currency, &standard)
    }

    /// Pay out up to `amount` of the wallet's staged balance
    ///
    /// Returns the amount actually paid, clamped to the staged balance.
    pub fn withdraw_with_standard(
        &self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        standard: &str,
    ) -> Result<Amount> {
        if amount <= 0 {
            return Err(FundError::NonPositiveAmount(amount));
        }
        let mut state = self.state.lock();
        let staged = state.staged.get(wallet, currency);
        let amount = amount.min(staged).max(0);

        if amount > 0 {
            let fund = &self.config.fund_address;
            let dispatched = if self.config.is_native(currency) {
                self.native.send(fund, wallet, amount)
            } else {
                self.resolver
                    .resolve(currency, standard)
                    .and_then(|controller| controller.dispatch(fund, wallet, amount, currency))
            };
            dispatched.map_err(|e| {
                warn!("Withdrawal of {} {} to {} failed: {}", amount, currency, wallet, e);
                e
            })?;
        }

        state.staged.sub(*wallet, *currency, amount);
        info!(%wallet, %currency, amount = %amount, "Withdrawn");
        state.emit(FundEvent::Withdrawn {
            wallet: *wallet,
            currency: *currency,
            amount,
        });
        Ok(amount)
    }

    // ========================================================================
    // Deployer-gated settings
    // ========================================================================

    pub fn set_calculator(
        &self,
        caller: &Address,
        calculator: Arc<dyn ClaimableAmountCalculator>,
    ) -> Result<()> {
        self.ensure_deployer(caller, SET_CALCULATOR_ACTION)?;
        let mut state = self.state.lock();
        state.calculator = calculator;
        info!("Claimable-amount calculator replaced by {}", caller);
        state.emit(FundEvent::CalculatorReplaced { by: *caller });
        Ok(())
    }

    pub fn set_claim_block_batch_size(&self, caller: &Address, batch_size: Option<u64>) -> Result<()> {
        self.ensure_deployer(caller, SET_BATCH_SIZE_ACTION)?;
        if batch_size == Some(0) {
            return Err(FundError::InvalidConfig(
                "claim_block_batch_size must be non-zero when set".to_string(),
            ));
        }
        let mut state = self.state.lock();
        state.claim_block_batch_size = batch_size;
        info!("Claim block batch size set to {:?} by {}", batch_size, caller);
        state.emit(FundEvent::BatchSizeChanged {
            by: *caller,
            batch_size,
        });
        Ok(())
    }

    fn ensure_deployer(&self, caller: &Address, action: &str) -> Result<()> {
        if caller != &self.config.deployer {
            return Err(FundError::Unauthorized {
                caller: *caller,
                action: action.to_string(),
            });
        }
        Ok(())
    }

    pub fn claim_block_batch_size(&self) -> Option<u64> {
        self.state.lock().claim_block_batch_size
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    pub fn is_non_claimer(&self, wallet: &Address) -> bool {
        self.state.lock().calculator.is_non_claimer(wallet)
    }

    pub fn period_accrual_balance(&self, currency: &Currency) -> Amount {
        self.state.lock().accruals.period_balance(currency)
    }

    pub fn aggregate_accrual_balance(&self, currency: &Currency) -> Amount {
        self.state.lock().accruals.aggregate_balance(currency)
    }

    /// Aggregate balance recorded when a period closed at `block_number`
    pub fn aggregate_accrual_amount_at(&self, currency: &Currency, block_number: BlockNumber) -> Amount {
        self.state
            .lock()
            .accruals
            .aggregate_at_close(currency, block_number)
    }

    pub fn period_currencies_count(&self) -> usize {
        self.state.lock().accruals.period_currencies().len()
    }

    pub fn period_currencies_by_indices(&self, low: usize, up: usize) -> Result<Vec<Currency>> {
        Ok(self
            .state
            .lock()
            .accruals
            .period_currencies()
            .by_indices(low, up)?)
    }

    pub fn aggregate_currencies_count(&self) -> usize {
        self.state.lock().accruals.aggregate_currencies().len()
    }

    pub fn aggregate_currencies_by_indices(&self, low: usize, up: usize) -> Result<Vec<Currency>> {
        Ok(self
            .state
            .lock()
            .accruals
            .aggregate_currencies()
            .by_indices(low, up)?)
    }

    pub fn closed_accruals_count(&self, currency: &Currency) -> usize {
        self.state.lock().accruals.closed_count(currency)
    }

    pub fn closed_accrual_by_index(&self, currency: &Currency, index: usize) -> Option<Accrual> {
        self.state.lock().accruals.accrual(currency, index).copied()
    }

    /// Index of the last accrual starting at or before `block_number`
    pub fn closed_accrual_index_by_block(
        &self,
        currency: &Currency,
        block_number: BlockNumber,
    ) -> Option<usize> {
        self.state
            .lock()
            .accruals
            .index_at_or_before_block(currency, block_number)
    }

    pub fn closed_accruals(&self, currency: &Currency) -> Vec<Accrual> {
        self.state.lock().accruals.accruals(currency).to_vec()
    }

    pub fn fully_claimed(&self, wallet: &Address, currency: &Currency, index: usize) -> bool {
        self.state
            .lock()
            .claims
            .fully_claimed(&ClaimKey::new(*wallet, *currency, index))
    }

    pub fn partially_claimed(&self, wallet: &Address, currency: &Currency, index: usize) -> bool {
        self.state
            .lock()
            .claims
            .partially_claimed(&ClaimKey::new(*wallet, *currency, index))
    }

    pub fn claimed_spans(&self, wallet: &Address, currency: &Currency, index: usize) -> Vec<BlockSpan> {
        self.state
            .lock()
            .claims
            .spans(&ClaimKey::new(*wallet, *currency, index))
            .to_vec()
    }

    /// Accrual indices fully claimed through the claim-next entry points
    pub fn claimed_accrual_indices(&self, wallet: &Address, currency: &Currency) -> Vec<usize> {
        self.state.lock().claims.claimed_indices(wallet, currency)
    }

    pub fn max_claimed_block(
        &self,
        wallet: &Address,
        currency: &Currency,
        index: usize,
    ) -> Option<BlockNumber> {
        self.state
            .lock()
            .claims
            .max_claimed_block(&ClaimKey::new(*wallet, *currency, index))
    }

    pub fn staged_balance(&self, wallet: &Address, currency: &Currency) -> Amount {
        self.state.lock().staged.get(wallet, currency)
    }

    /// Wallets with a staged balance record, in no particular order
    pub fn staged_wallets(&self) -> Vec<Address> {
        self.state.lock().staged.owners().copied().collect()
    }

    pub fn events(&self) -> Vec<FundEvent> {
        self.state.lock().events.clone()
    }

    pub fn drain_events(&self) -> Vec<FundEvent> {
        std::mem::take(&mut self.state.lock().events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beneficiary::RecordingBeneficiary;
    use crate::calculator::{ShareCalculator, BASIS_POINTS};
    use crate::gate::{OpenGate, ServiceRegistry};
    use crate::error::TransferError;
    use crate::transfer::{NativeVault, StaticResolver, TokenLedger, TransferController};
    use revfund_core::ManualClock;

    struct Harness {
        fund: RevenueFund,
        clock: Arc<ManualClock>,
        tokens: Arc<TokenLedger>,
        vault: Arc<NativeVault>,
    }

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn token() -> Currency {
        Currency::fungible(Address::repeat_byte(0x70))
    }

    fn harness(calculator: ShareCalculator) -> Harness {
        let clock = Arc::new(ManualClock::new(0));
        let tokens = Arc::new(TokenLedger::new());
        let vault = Arc::new(NativeVault::new());
        let resolver = StaticResolver::new();
        let controller: Arc<dyn TransferController> = tokens.clone();
        resolver.register(token(), "erc20", controller);

        let fund = RevenueFund::new(
            FundConfig::default(),
            FundCollaborators {
                clock: clock.clone(),
                resolver: Arc::new(resolver),
                native: vault.clone(),
                gate: Arc::new(OpenGate),
                calculator: Arc::new(calculator),
            },
        )
        .unwrap();
        Harness {
            fund,
            clock,
            tokens,
            vault,
        }
    }

    fn full_share() -> ShareCalculator {
        ShareCalculator::new().with_share(alice(), BASIS_POINTS)
    }

    #[test]
    fn test_receive_native_updates_balances() {
        let h = harness(full_share());
        h.clock.advance_to(3);
        h.fund.receive(&alice(), 40, &Currency::NATIVE).unwrap();

        assert_eq!(h.fund.period_accrual_balance(&Currency::NATIVE), 40);
        assert_eq!(h.fund.aggregate_accrual_balance(&Currency::NATIVE), 40);
        assert_eq!(h.fund.period_currencies_count(), 1);
        assert_eq!(h.fund.aggregate_currencies_count(), 1);
        assert!(matches!(
            h.fund.events()[0],
            FundEvent::Received { amount: 40, block_number: 3, .. }
        ));
    }

    #[test]
    fn test_receive_rejects_non_positive() {
        let h = harness(full_share());
        assert!(matches!(
            h.fund.receive(&alice(), 0, &Currency::NATIVE),
            Err(FundError::NonPositiveAmount(0))
        ));
        assert!(h.fund.events().is_empty());
    }

    #[test]
    fn test_failed_pull_books_nothing() {
        let h = harness(full_share());
        h.tokens.mint(alice(), token(), 10);

        let result = h.fund.receive(&alice(), 10, &token());
        assert!(matches!(result, Err(FundError::Transfer(_))));
        assert_eq!(h.fund.aggregate_accrual_balance(&token()), 0);
        assert_eq!(h.fund.period_currencies_count(), 0);
        assert_eq!(h.tokens.balance_of(&alice(), &token()), 10);
    }

    #[test]
    fn test_receive_token_pulls_into_custody() {
        let h = harness(full_share());
        let fund_address = h.fund.config().fund_address;
        h.tokens.mint(alice(), token(), 10);
        h.tokens.approve(&alice(), &fund_address, 10, &token()).unwrap();

        h.fund.receive(&alice(), 10, &token()).unwrap();
        assert_eq!(h.tokens.balance_of(&fund_address, &token()), 10);
        assert_eq!(h.fund.period_accrual_balance(&token()), 10);
    }

    #[test]
    fn test_close_requires_gate() {
        let h = harness(full_share());
        let registry = ServiceRegistry::new();
        let fund = RevenueFund::new(
            FundConfig::default(),
            FundCollaborators {
                clock: h.clock.clone(),
                resolver: Arc::new(StaticResolver::new()),
                native: h.vault.clone(),
                gate: Arc::new(registry),
                calculator: Arc::new(full_share()),
            },
        )
        .unwrap();

        let result = fund.close_accrual_period(&alice(), &[Currency::NATIVE]);
        assert!(matches!(result, Err(FundError::Unauthorized { .. })));
        assert_eq!(fund.closed_accruals_count(&Currency::NATIVE), 0);
    }

    #[test]
    fn test_stage_and_withdraw_native() {
        let h = harness(full_share());
        let fund_address = h.fund.config().fund_address;
        h.clock.advance_to(10);
        h.vault.credit(fund_address, 100);
        h.fund.receive(&alice(), 100, &Currency::NATIVE).unwrap();
        h.clock.advance_to(20);
        h.fund.close_period_for_all(&alice()).unwrap();

        assert_eq!(h.fund.stage_by_accruals(&alice(), &Currency::NATIVE, 0, 0).unwrap(), 100);
        assert_eq!(h.fund.staged_balance(&alice(), &Currency::NATIVE), 100);

        assert_eq!(h.fund.withdraw(&alice(), 500, &Currency::NATIVE).unwrap(), 100);
        assert_eq!(h.fund.staged_balance(&alice(), &Currency::NATIVE), 0);
        assert_eq!(h.vault.balance_of(&alice()), 100);

        assert_eq!(h.fund.withdraw(&alice(), 5, &Currency::NATIVE).unwrap(), 0);
    }

    #[test]
    fn test_non_claimer_queries_zero_but_stage_fails() {
        let h = harness(full_share().with_non_claimer(alice()));
        h.fund.receive(&alice(), 100, &Currency::NATIVE).unwrap();
        h.clock.advance_to(5);
        h.fund.close_period_for_all(&alice()).unwrap();

        assert_eq!(
            h.fund
                .claimable_amount_by_accruals(&alice(), &Currency::NATIVE, 0, 0)
                .unwrap(),
            0
        );
        assert!(matches!(
            h.fund.stage_by_accruals(&alice(), &Currency::NATIVE, 0, 0),
            Err(FundError::NonClaimer(_))
        ));
    }

    #[test]
    fn test_queries_fail_only_on_reversed_bounds() {
        let h = harness(full_share());
        assert_eq!(
            h.fund
                .claimable_amount_by_blocks(&alice(), &Currency::NATIVE, 0, 10)
                .unwrap(),
            0
        );
        assert!(h
            .fund
            .claimable_amount_by_blocks(&alice(), &Currency::NATIVE, 10, 0)
            .is_err());
        assert!(h
            .fund
            .claimable_amount_by_accruals(&alice(), &Currency::NATIVE, 1, 0)
            .is_err());
    }

    #[test]
    fn test_deployer_gated_settings() {
        let h = harness(full_share());
        let deployer = h.fund.config().deployer;

        assert!(matches!(
            h.fund.set_claim_block_batch_size(&alice(), Some(5)),
            Err(FundError::Unauthorized { .. })
        ));
        assert!(h.fund.set_claim_block_batch_size(&deployer, Some(0)).is_err());
        h.fund.set_claim_block_batch_size(&deployer, Some(5)).unwrap();
        assert_eq!(h.fund.claim_block_batch_size(), Some(5));

        h.fund
            .set_calculator(&deployer, Arc::new(ShareCalculator::new()))
            .unwrap();
        let names: Vec<_> = h.fund.drain_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["batch_size_changed", "calculator_replaced"]);
        assert!(h.fund.events().is_empty());
    }

    #[test]
    fn test_forward_native_moves_custody_to_beneficiary() {
        let h = harness(full_share());
        let fund_address = h.fund.config().fund_address;
        let beneficiary_address = Address::repeat_byte(0xbe);
        h.vault.credit(fund_address, 80);
        h.fund.receive(&alice(), 80, &Currency::NATIVE).unwrap();
        h.clock.advance_to(9);
        h.fund.close_period_for_all(&alice()).unwrap();

        let beneficiary = Arc::new(RecordingBeneficiary::new(beneficiary_address));
        let target = ForwardTarget::new(beneficiary.clone(), alice()).with_balance_type("deposited");
        let amount = h
            .fund
            .forward_by_blocks(&alice(), &Currency::NATIVE, 0, 4, &target)
            .unwrap();

        assert_eq!(amount, 40);
        assert_eq!(h.vault.balance_of(&fund_address), 40);
        assert_eq!(h.vault.balance_of(&beneficiary_address), 40);
        assert_eq!(beneficiary.received(&alice(), &Currency::NATIVE), 40);
        assert_eq!(beneficiary.deliveries()[0].balance_type, "deposited");
        assert_eq!(h.fund.staged_balance(&alice(), &Currency::NATIVE), 0);
        assert!(h.fund.partially_claimed(&alice(), &Currency::NATIVE, 0));
    }

    #[test]
    fn test_forward_native_without_custody_fails() {
        let h = harness(full_share());
        // booked without the value ever reaching the fund
        h.fund.receive(&alice(), 100, &Currency::NATIVE).unwrap();
        h.clock.advance_to(9);
        h.fund.close_period_for_all(&alice()).unwrap();

        let beneficiary = Arc::new(RecordingBeneficiary::new(Address::repeat_byte(0xbe)));
        let target = ForwardTarget::new(beneficiary.clone(), alice());
        let result = h.fund.forward_by_accruals(&alice(), &Currency::NATIVE, 0, 0, &target);

        assert!(matches!(
            result,
            Err(FundError::Transfer(TransferError::InsufficientBalance { .. }))
        ));
        assert!(beneficiary.deliveries().is_empty());
        assert!(!h.fund.fully_claimed(&alice(), &Currency::NATIVE, 0));
    }

    #[test]
    fn test_refused_native_forward_is_refunded() {
        let h = harness(full_share());
        let fund_address = h.fund.config().fund_address;
        let beneficiary_address = Address::repeat_byte(0xbe);
        h.vault.credit(fund_address, 100);
        h.fund.receive(&alice(), 100, &Currency::NATIVE).unwrap();
        h.clock.advance_to(9);
        h.fund.close_period_for_all(&alice()).unwrap();

        let beneficiary = Arc::new(RecordingBeneficiary::new(beneficiary_address));
        beneficiary.set_rejecting(true);
        let target = ForwardTarget::new(beneficiary, alice());
        assert!(h
            .fund
            .forward_by_accruals(&alice(), &Currency::NATIVE, 0, 0, &target)
            .is_err());

        assert_eq!(h.vault.balance_of(&fund_address), 100);
        assert_eq!(h.vault.balance_of(&beneficiary_address), 0);
    }

    #[test]
    fn test_refused_token_forward_revokes_approval() {
        let h = harness(full_share());
        let fund_address = h.fund.config().fund_address;
        let beneficiary_address = Address::repeat_byte(0xbe);
        h.tokens.mint(alice(), token(), 60);
        h.tokens.approve(&alice(), &fund_address, 60, &token()).unwrap();
        h.fund.receive(&alice(), 60, &token()).unwrap();
        h.clock.advance_to(9);
        h.fund.close_period_for_all(&alice()).unwrap();

        let controller: Arc<dyn TransferController> = h.tokens.clone();
        let beneficiary = Arc::new(
            RecordingBeneficiary::new(beneficiary_address).with_token_controller(controller),
        );
        beneficiary.set_rejecting(true);
        let target = ForwardTarget::new(beneficiary, alice());
        assert!(h.fund.forward_by_accruals(&alice(), &token(), 0, 0, &target).is_err());

        assert_eq!(h.tokens.allowance(&fund_address, &beneficiary_address, &token()), 0);
        assert_eq!(h.tokens.balance_of(&fund_address, &token()), 60);
        assert!(!h.fund.fully_claimed(&alice(), &token(), 0));
    }

    #[test]
    fn test_claim_next_follows_batch_size_changes() {
        let h = harness(full_share());
        let deployer = h.fund.config().deployer;
        h.vault.credit(h.fund.config().fund_address, 100);
        h.fund.receive(&alice(), 100, &Currency::NATIVE).unwrap();
        h.clock.advance_to(9);
        h.fund.close_period_for_all(&alice()).unwrap();

        h.fund.set_claim_block_batch_size(&deployer, Some(2)).unwrap();
        assert_eq!(h.fund.stage_next(&alice(), &Currency::NATIVE).unwrap(), 20);
        h.fund.set_claim_block_batch_size(&deployer, Some(8)).unwrap();
        assert_eq!(h.fund.stage_next(&alice(), &Currency::NATIVE).unwrap(), 80);
        assert_eq!(h.fund.max_claimed_block(&alice(), &Currency::NATIVE, 0), Some(9));
        assert_eq!(h.fund.claimed_accrual_indices(&alice(), &Currency::NATIVE), vec![0]);
    }
}
