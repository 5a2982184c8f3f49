//! # Revenue Fund Engine
//!
//! Period-based revenue accrual with per-wallet claim tracking.
//!
//! ## Key Features
//!
//! - **Accrual periods**: revenue per currency closes into immutable epochs
//!   that partition the block axis
//! - **Pluggable entitlement**: a [`ClaimableAmountCalculator`] decides each
//!   wallet's share, whole epoch or any block sub-range
//! - **Double-claim protection**: full and partial claims are tracked per
//!   (wallet, currency, accrual)
//! - **Stage, forward, withdraw**: claims land in a staged balance or go
//!   straight to a beneficiary
//!
//! ## Claim lifecycle
//!
//! ```text
//!  receive ──► open period ──close──► accrual ──claim──┬──► staged ──withdraw──► wallet
//!                                                      └──► beneficiary
//! ```

pub mod accrual;
pub mod beneficiary;
pub mod calculator;
pub mod claims;
pub mod config;
pub mod error;
pub mod events;
pub mod fund;
pub mod gate;
pub mod transfer;

// Re-exports
pub use accrual::{Accrual, AccrualPeriodManager, ClosedAccrual};
pub use beneficiary::{Beneficiary, Delivery, RecordingBeneficiary};
pub use calculator::{
    BalanceBlocksCalculator, BalanceBlocksSource, BalanceHistory, ClaimableAmountCalculator,
    ShareCalculator, WalletShare, BASIS_POINTS,
};
pub use claims::{ClaimKey, ClaimPlan, ClaimPlanner, ClaimRange, ClaimState, ClaimTracker, ClaimUpdate};
pub use config::FundConfig;
pub use error::{FundError, Result, TransferError};
pub use events::FundEvent;
pub use fund::{ForwardTarget, FundCollaborators, RevenueFund};
pub use gate::{OpenGate, ServiceGate, ServiceRegistry, CLOSE_ACCRUAL_PERIOD_ACTION};
pub use transfer::{
    ControllerResolver, NativeTransfer, NativeVault, StaticResolver, TokenLedger,
    TransferController,
};
