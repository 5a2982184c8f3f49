//! Fungible balance accumulators
//!
//! `FungibleBalance` is a signed, per-currency accumulator. `BalanceLedger`
//! layers one of those per owner.

use crate::types::{Address, Amount, Currency};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Signed balance per currency
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FungibleBalance {
    amounts: HashMap<Currency, Amount>,
}

impl FungibleBalance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance, zero for unknown currencies
    pub fn get(&self, currency: &Currency) -> Amount {
        self.amounts.get(currency).copied().unwrap_or(0)
    }

    pub fn add(&mut self, currency: Currency, amount: Amount) {
        *self.amounts.entry(currency).or_insert(0) += amount;
    }

    pub fn sub(&mut self, currency: Currency, amount: Amount) {
        *self.amounts.entry(currency).or_insert(0) -= amount;
    }

    pub fn set(&mut self, currency: Currency, amount: Amount) {
        self.amounts.insert(currency, amount);
    }
}

/// Per-owner fungible balances
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BalanceLedger {
    owners: HashMap<Address, FungibleBalance>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner: &Address, currency: &Currency) -> Amount {
        self.owners
            .get(owner)
            .map(|b| b.get(currency))
            .unwrap_or(0)
    }

    pub fn add(&mut self, owner: Address, currency: Currency, amount: Amount) {
        self.owners.entry(owner).or_default().add(currency, amount);
    }

    pub fn sub(&mut self, owner: Address, currency: Currency, amount: Amount) {
        self.owners.entry(owner).or_default().sub(currency, amount);
    }

    pub fn owners(&self) -> impl Iterator<Item = &Address> {
        self.owners.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn currency() -> Currency {
        Currency::fungible(Address::repeat_byte(9))
    }

    #[test]
    fn test_add_sub_get() {
        let mut balance = FungibleBalance::new();
        assert_eq!(balance.get(&currency()), 0);

        balance.add(currency(), 100);
        balance.sub(currency(), 130);
        assert_eq!(balance.get(&currency()), -30);

        balance.set(currency(), 0);
        assert_eq!(balance.get(&currency()), 0);
        assert_eq!(balance.get(&Currency::NATIVE), 0);
    }

    #[test]
    fn test_ledger_is_per_owner() {
        let mut ledger = BalanceLedger::new();
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);

        ledger.add(alice, currency(), 50);
        assert_eq!(ledger.get(&alice, &currency()), 50);
        assert_eq!(ledger.get(&bob, &currency()), 0);

        ledger.sub(alice, currency(), 20);
        assert_eq!(ledger.get(&alice, &currency()), 30);
        assert_eq!(ledger.owners().count(), 1);
    }
}
