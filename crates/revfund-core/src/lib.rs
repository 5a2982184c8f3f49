//! # Revenue Fund Core
//!
//! Ledger primitives shared by the revenue fund engine:
//! - `Address` / `Currency` - participant and asset identifiers
//! - `CurrencySet` - insertion-ordered currency set with O(1) membership and removal
//! - `FungibleBalance` / `BalanceLedger` - signed per-currency balance accumulators
//! - `BlockClock` - read-only view of the host's monotonic block number
//!
//! ## Block axis
//!
//! Everything in the fund is positioned on the external block-number axis,
//! never on wall-clock time.
//!
//! ```text
//!   baseline                                                  clock
//!      │                                                        │
//!      ▼                                                        ▼
//!      ├──── accrual 0 ────┼──── accrual 1 ────┼── open period ──┤
//!      start          end  end+1          end  end+1
//! ```

pub mod balance;
pub mod clock;
pub mod currency_set;
pub mod error;
pub mod types;

pub use balance::*;
pub use clock::*;
pub use currency_set::*;
pub use error::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::balance::{BalanceLedger, FungibleBalance};
    pub use crate::clock::{BlockClock, ManualClock};
    pub use crate::currency_set::CurrencySet;
    pub use crate::error::{CoreError, Result};
    pub use crate::types::*;
}
