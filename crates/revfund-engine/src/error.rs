//! Error types for revenue fund operations
//!
//! Every mutating entry point either completes or fails with one of these
//! before any fund state is touched.

use revfund_core::{Address, Amount, BlockNumber, CoreError, Currency};
use thiserror::Error;

/// Result type alias for fund operations
pub type Result<T> = std::result::Result<T, FundError>;

/// Failures reported by external value-transfer collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient balance of {currency} for {owner}: have {available}, need {required}")]
    InsufficientBalance {
        owner: Address,
        currency: Currency,
        available: Amount,
        required: Amount,
    },

    #[error("Insufficient allowance of {currency} from {owner} to {spender}: have {available}, need {required}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        currency: Currency,
        available: Amount,
        required: Amount,
    },

    #[error("No transfer controller for {currency} with standard {standard}")]
    NoController { currency: Currency, standard: String },

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

/// Errors that can occur in revenue fund operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FundError {
    // === Preconditions ===
    /// Amount was required to be strictly positive
    #[error("Amount must be strictly positive, got {0}")]
    NonPositiveAmount(Amount),

    /// Reversed range bounds
    #[error("Invalid range: low {low} exceeds up {up}")]
    InvalidRange { low: u64, up: u64 },

    /// Claim attempted before any accrual was closed
    #[error("No closed accruals for {0}")]
    NoClosedAccruals(Currency),

    /// Block range lies entirely outside the closed accruals
    #[error("Block range [{start_block}, {end_block}] is outside the closed accruals of {currency}")]
    BlockRangeOutOfScope {
        currency: Currency,
        start_block: BlockNumber,
        end_block: BlockNumber,
    },

    /// Closing would produce an accrual ending before it starts
    #[error("Period of {currency} cannot close at block {block_number}: next accrual starts at {start_block}")]
    PeriodNotAdvanced {
        currency: Currency,
        start_block: BlockNumber,
        block_number: BlockNumber,
    },

    /// Claim-next found every closed accrual already claimed
    #[error("No unclaimed accrual of {currency} left for {wallet}")]
    NoUnclaimedAccrual { wallet: Address, currency: Currency },

    // === Authorization ===
    /// Caller is not allowed to perform the action
    #[error("Caller {caller} is not authorized for {action}")]
    Unauthorized { caller: Address, action: String },

    /// Wallet is excluded from claiming by the claimable-amount policy
    #[error("Wallet {0} is a non-claimer")]
    NonClaimer(Address),

    // === Collaborators ===
    /// Transfer controller, native transfer or beneficiary failed
    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    // === Configuration ===
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CoreError> for FundError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidRange { low, up } => Self::InvalidRange { low, up },
            CoreError::InvalidAddress(msg) => Self::InvalidConfig(msg),
        }
    }
}

impl FundError {
    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::NonPositiveAmount(_) => 2001,
            Self::InvalidRange { .. } => 2002,
            Self::NoClosedAccruals(_) => 2003,
            Self::BlockRangeOutOfScope { .. } => 2004,
            Self::PeriodNotAdvanced { .. } => 2005,
            Self::NoUnclaimedAccrual { .. } => 2006,
            Self::Unauthorized { .. } => 3001,
            Self::NonClaimer(_) => 3002,
            Self::Transfer(_) => 4001,
            Self::InvalidConfig(_) => 9001,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(FundError::NonPositiveAmount(0).code(), 2001);
        assert_eq!(FundError::NonClaimer(Address::ZERO).code(), 3002);

        let err: FundError = TransferError::Rejected("paused".into()).into();
        assert_eq!(err.code(), 4001);
    }

    #[test]
    fn test_core_errors_flatten() {
        let err: FundError = CoreError::InvalidRange { low: 4, up: 2 }.into();
        assert_eq!(err, FundError::InvalidRange { low: 4, up: 2 });

        let err: FundError = CoreError::InvalidAddress("0x12".into()).into();
        assert!(matches!(err, FundError::InvalidConfig(_)));
    }

    #[test]
    fn test_error_display() {
        let err = FundError::NoClosedAccruals(Currency::NATIVE);
        assert!(format!("{}", err).contains("No closed accruals"));
    }
}
