//! Scripted fund scenarios and their replay against in-memory collaborators

use anyhow::Context;
use revfund_core::{Address, Amount, BlockClock, BlockNumber, Currency, ManualClock};
use revfund_engine::{
    Accrual, Delivery, ForwardTarget, FundCollaborators, FundConfig, FundError, FundEvent,
    NativeTransfer, NativeVault, OpenGate, RecordingBeneficiary, RevenueFund, ShareCalculator,
    StaticResolver, TokenLedger, TransferController,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// A scenario file
#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    /// Caller used for period closing
    #[serde(default = "default_operator")]
    pub operator: Address,

    /// Address of the recording beneficiary forwarded claims go to
    #[serde(default = "default_beneficiary")]
    pub beneficiary: Address,

    #[serde(default)]
    pub calculator: ShareCalculator,

    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_operator() -> Address {
    Address::repeat_byte(0x0c)
}

fn default_beneficiary() -> Address {
    Address::repeat_byte(0xbe)
}

/// One scripted operation
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Advance {
        blocks: u64,
    },
    /// Credit a wallet out of thin air on the host side
    Mint {
        wallet: Address,
        currency: Currency,
        amount: i64,
    },
    Receive {
        wallet: Address,
        currency: Currency,
        amount: i64,
    },
    Close {
        currencies: Vec<Currency>,
    },
    CloseAll,
    StageAccruals {
        wallet: Address,
        currency: Currency,
        start_index: usize,
        end_index: usize,
    },
    StageBlocks {
        wallet: Address,
        currency: Currency,
        start_block: BlockNumber,
        end_block: BlockNumber,
    },
    StageNext {
        wallet: Address,
        currency: Currency,
    },
    ForwardAccruals {
        wallet: Address,
        currency: Currency,
        start_index: usize,
        end_index: usize,
        #[serde(default)]
        balance_type: Option<String>,
    },
    ForwardBlocks {
        wallet: Address,
        currency: Currency,
        start_block: BlockNumber,
        end_block: BlockNumber,
        #[serde(default)]
        balance_type: Option<String>,
    },
    Withdraw {
        wallet: Address,
        currency: Currency,
        amount: i64,
    },
}

impl Step {
    fn currencies(&self) -> Vec<Currency> {
        match self {
            Self::Advance { .. } | Self::CloseAll => Vec::new(),
            Self::Close { currencies } => currencies.clone(),
            Self::Mint { currency, .. }
            | Self::Receive { currency, .. }
            | Self::StageAccruals { currency, .. }
            | Self::StageBlocks { currency, .. }
            | Self::StageNext { currency, .. }
            | Self::ForwardAccruals { currency, .. }
            | Self::ForwardBlocks { currency, .. }
            | Self::Withdraw { currency, .. } => vec![*currency],
        }
    }
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing scenario {}", path.display()))
    }
}

/// Result of one replayed step
#[derive(Clone, Debug, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub block_number: BlockNumber,
    pub step: Step,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Numeric code when the failure came from the fund
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CurrencySummary {
    pub currency: Currency,
    pub period_balance: Amount,
    pub aggregate_balance: Amount,
    pub accruals: Vec<Accrual>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StagedEntry {
    pub wallet: Address,
    pub currency: Currency,
    pub amount: Amount,
}

/// JSON summary printed after a replay
#[derive(Clone, Debug, Serialize)]
pub struct ReplaySummary {
    pub block_number: BlockNumber,
    pub outcomes: Vec<StepOutcome>,
    pub currencies: Vec<CurrencySummary>,
    pub staged: Vec<StagedEntry>,
    pub deliveries: Vec<Delivery>,
    pub events: Vec<FundEvent>,
}

impl ReplaySummary {
    pub fn failed_steps(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }
}

/// A fund wired to in-memory host collaborators
pub struct Replay {
    fund: RevenueFund,
    clock: Arc<ManualClock>,
    tokens: Arc<TokenLedger>,
    vault: Arc<NativeVault>,
    beneficiary: Arc<RecordingBeneficiary>,
}

impl Replay {
    pub fn new(config: FundConfig, scenario: &Scenario) -> anyhow::Result<Self> {
        let clock = Arc::new(ManualClock::new(config.baseline_block));
        let tokens = Arc::new(TokenLedger::new());
        let vault = Arc::new(NativeVault::new());
        let resolver = StaticResolver::new();

        let mut registered = HashSet::new();
        for currency in scenario.steps.iter().flat_map(Step::currencies) {
            if !config.is_native(&currency) && registered.insert(currency) {
                let controller: Arc<dyn TransferController> = tokens.clone();
                resolver.register(currency, config.default_standard.clone(), controller);
            }
        }

        let fund = RevenueFund::new(
            config,
            FundCollaborators {
                clock: clock.clone(),
                resolver: Arc::new(resolver),
                native: vault.clone(),
                gate: Arc::new(OpenGate),
                calculator: Arc::new(scenario.calculator.clone()),
            },
        )?;
        let controller: Arc<dyn TransferController> = tokens.clone();
        let beneficiary =
            RecordingBeneficiary::new(scenario.beneficiary).with_token_controller(controller);
        Ok(Self {
            fund,
            clock,
            tokens,
            vault,
            beneficiary: Arc::new(beneficiary),
        })
    }

    pub fn run(self, scenario: &Scenario, fail_fast: bool) -> anyhow::Result<ReplaySummary> {
        let mut outcomes = Vec::with_capacity(scenario.steps.len());
        for (index, step) in scenario.steps.iter().enumerate() {
            let result = self.apply(scenario, step);
            let outcome = StepOutcome {
                index,
                block_number: self.clock.block_number(),
                step: step.clone(),
                amount: result.as_ref().ok().copied().flatten(),
                error: result.as_ref().err().map(|e| e.to_string()),
                error_code: result
                    .as_ref()
                    .err()
                    .and_then(|e| e.downcast_ref::<FundError>())
                    .map(FundError::code),
            };
            if let Err(e) = result {
                tracing::warn!("Step {} failed: {}", index, e);
                if fail_fast {
                    return Err(e.context(format!("step {}", index)));
                }
            }
            outcomes.push(outcome);
        }
        Ok(self.summarize(outcomes))
    }

    fn apply(&self, scenario: &Scenario, step: &Step) -> anyhow::Result<Option<Amount>> {
        let fund = &self.fund;
        let amount = match step {
            Step::Advance { blocks } => {
                self.clock.advance(*blocks);
                None
            }
            Step::Mint {
                wallet,
                currency,
                amount,
            } => {
                if fund.config().is_native(currency) {
                    self.vault.credit(*wallet, Amount::from(*amount));
                } else {
                    self.tokens.mint(*wallet, *currency, Amount::from(*amount));
                }
                Some(Amount::from(*amount))
            }
            Step::Receive {
                wallet,
                currency,
                amount,
            } => {
                let amount = Amount::from(*amount);
                let fund_address = fund.config().fund_address;
                if amount > 0 {
                    // native value travels with the call; tokens need an allowance
                    if fund.config().is_native(currency) {
                        self.vault.send(wallet, &fund_address, amount)?;
                    } else {
                        self.tokens.approve(wallet, &fund_address, amount, currency)?;
                    }
                }
                fund.receive(wallet, amount, currency)?;
                Some(amount)
            }
            Step::Close { currencies } => {
                let closed = fund.close_accrual_period(&scenario.operator, currencies)?;
                Some(closed.iter().map(|c| c.accrual.amount).sum())
            }
            Step::CloseAll => {
                let closed = fund.close_period_for_all(&scenario.operator)?;
                Some(closed.iter().map(|c| c.accrual.amount).sum())
            }
            Step::StageAccruals {
                wallet,
                currency,
                start_index,
                end_index,
            } => Some(fund.stage_by_accruals(wallet, currency, *start_index, *end_index)?),
            Step::StageBlocks {
                wallet,
                currency,
                start_block,
                end_block,
            } => Some(fund.stage_by_blocks(wallet, currency, *start_block, *end_block)?),
            Step::StageNext { wallet, currency } => Some(fund.stage_next(wallet, currency)?),
            Step::ForwardAccruals {
                wallet,
                currency,
                start_index,
                end_index,
                balance_type,
            } => {
                let target = self.target(*wallet, balance_type.as_deref());
                Some(fund.forward_by_accruals(wallet, currency, *start_index, *end_index, &target)?)
            }
            Step::ForwardBlocks {
                wallet,
                currency,
                start_block,
                end_block,
                balance_type,
            } => {
                let target = self.target(*wallet, balance_type.as_deref());
                Some(fund.forward_by_blocks(wallet, currency, *start_block, *end_block, &target)?)
            }
            Step::Withdraw {
                wallet,
                currency,
                amount,
            } => Some(fund.withdraw(wallet, Amount::from(*amount), currency)?),
        };
        Ok(amount)
    }

    fn target(&self, destination: Address, balance_type: Option<&str>) -> ForwardTarget {
        let target = ForwardTarget::new(self.beneficiary.clone(), destination);
        match balance_type {
            Some(balance_type) => target.with_balance_type(balance_type),
            None => target,
        }
    }

    fn summarize(&self, outcomes: Vec<StepOutcome>) -> ReplaySummary {
        let fund = &self.fund;
        let currencies: Vec<Currency> = fund
            .aggregate_currencies_by_indices(0, usize::MAX)
            .unwrap_or_default();

        let mut wallets = fund.staged_wallets();
        wallets.sort();
        let staged = wallets
            .iter()
            .flat_map(|wallet| {
                currencies.iter().map(move |currency| StagedEntry {
                    wallet: *wallet,
                    currency: *currency,
                    amount: fund.staged_balance(wallet, currency),
                })
            })
            .filter(|entry| entry.amount != 0)
            .collect();

        ReplaySummary {
            block_number: self.clock.block_number(),
            outcomes,
            currencies: currencies
                .iter()
                .map(|currency| CurrencySummary {
                    currency: *currency,
                    period_balance: fund.period_accrual_balance(currency),
                    aggregate_balance: fund.aggregate_accrual_balance(currency),
                    accruals: fund.closed_accruals(currency),
                })
                .collect(),
            staged,
            deliveries: self.beneficiary.deliveries(),
            events: fund.events(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = include_str!("../../../scenarios/basic.toml");

    #[test]
    fn test_basic_scenario_replays() {
        let scenario = Scenario::from_toml_str(BASIC).unwrap();
        let summary = Replay::new(FundConfig::default(), &scenario)
            .unwrap()
            .run(&scenario, true)
            .unwrap();

        assert_eq!(summary.failed_steps(), 0);
        assert!(!summary.currencies.is_empty());
        assert!(summary.currencies.iter().all(|c| !c.accruals.is_empty()));
        assert!(!summary.events.is_empty());
        serde_json::to_string(&summary).unwrap();
    }

    #[test]
    fn test_failing_step_is_reported() {
        let scenario = Scenario::from_toml_str(
            r#"
            [[steps]]
            op = "stage_next"
            wallet = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1"
            currency = { contract = "0x0000000000000000000000000000000000000000" }
            "#,
        )
        .unwrap();

        let summary = Replay::new(FundConfig::default(), &scenario)
            .unwrap()
            .run(&scenario, false)
            .unwrap();
        assert_eq!(summary.failed_steps(), 1);
        assert_eq!(summary.outcomes[0].error_code, Some(2003));

        let fail_fast = Replay::new(FundConfig::default(), &scenario)
            .unwrap()
            .run(&scenario, true);
        assert!(fail_fast.is_err());
    }
}
