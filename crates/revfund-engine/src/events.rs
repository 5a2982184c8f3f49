//! Audit events emitted by the fund, one per state-changing operation

use crate::claims::ClaimRange;
use revfund_core::{Address, Amount, BlockNumber, Currency};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FundEvent {
    Received {
        wallet: Address,
        currency: Currency,
        amount: Amount,
        block_number: BlockNumber,
    },
    PeriodClosed {
        currency: Currency,
        accrual_index: usize,
        period_amount: Amount,
        aggregate_amount: Amount,
        start_block: BlockNumber,
        end_block: BlockNumber,
    },
    ClaimedAndStaged {
        wallet: Address,
        currency: Currency,
        amount: Amount,
        range: ClaimRange,
    },
    ClaimedAndForwarded {
        wallet: Address,
        currency: Currency,
        amount: Amount,
        range: ClaimRange,
        beneficiary: Address,
        balance_type: String,
    },
    Withdrawn {
        wallet: Address,
        currency: Currency,
        amount: Amount,
    },
    CalculatorReplaced {
        by: Address,
    },
    BatchSizeChanged {
        by: Address,
        batch_size: Option<u64>,
    },
}

impl FundEvent {
    /// Short name, matching the serialized tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::Received { .. } => "received",
            Self::PeriodClosed { .. } => "period_closed",
            Self::ClaimedAndStaged { .. } => "claimed_and_staged",
            Self::ClaimedAndForwarded { .. } => "claimed_and_forwarded",
            Self::Withdrawn { .. } => "withdrawn",
            Self::CalculatorReplaced { .. } => "calculator_replaced",
            Self::BatchSizeChanged { .. } => "batch_size_changed",
        }
    }
}
