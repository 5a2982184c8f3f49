//! Block-number clock
//!
//! The host environment owns the clock; the fund only ever reads it. Unlike
//! wall time, block numbers never go backwards.

use crate::types::BlockNumber;
use std::sync::atomic::{AtomicU64, Ordering};

/// Read-only access to the host's monotonically increasing block number
pub trait BlockClock: Send + Sync {
    fn block_number(&self) -> BlockNumber;
}

/// Manually driven clock for hosts that replay blocks and for tests
#[derive(Debug, Default)]
pub struct ManualClock {
    block: AtomicU64,
}

impl ManualClock {
    pub fn new(start: BlockNumber) -> Self {
        Self {
            block: AtomicU64::new(start),
        }
    }

    /// Advance by `blocks` and return the new block number
    pub fn advance(&self, blocks: u64) -> BlockNumber {
        self.block.fetch_add(blocks, Ordering::SeqCst) + blocks
    }

    /// Jump forward to `block`; earlier values are ignored
    pub fn advance_to(&self, block: BlockNumber) -> BlockNumber {
        self.block.fetch_max(block, Ordering::SeqCst).max(block)
    }
}

impl BlockClock for ManualClock {
    fn block_number(&self) -> BlockNumber {
        self.block.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advance() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.block_number(), 10);
        assert_eq!(clock.advance(5), 15);
        assert_eq!(clock.block_number(), 15);
    }

    #[test]
    fn test_clock_never_goes_backwards() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.advance_to(20), 20);
        assert_eq!(clock.advance_to(3), 20);
        assert_eq!(clock.block_number(), 20);
    }
}
