//! # Value Transfer Collaborators
//!
//! The fund never holds value itself; moving funds is delegated to
//! transfer controllers resolved per (currency, standard), and to a native
//! transfer primitive for the host's native asset.
//!
//! ```text
//!   receive:   wallet ──pull──────► fund custody
//!   withdraw:  fund custody ──dispatch──► wallet
//!   forward:   fund ──approve──► beneficiary ──pull──► beneficiary custody
//!              fund custody ──send──► beneficiary (native)
//! ```
//!
//! Any failure here aborts the enclosing fund operation.

use crate::error::TransferError;
use parking_lot::RwLock;
use revfund_core::{Address, Amount, Currency};
use std::collections::HashMap;
use std::sync::Arc;

/// Moves one standard of non-native currency
pub trait TransferController: Send + Sync {
    /// Pull `amount` from `from` into `to` using `from`'s allowance to `to`
    fn pull(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
        currency: &Currency,
    ) -> Result<(), TransferError>;

    /// Push `amount` held by `from` to `to`
    fn dispatch(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
        currency: &Currency,
    ) -> Result<(), TransferError>;

    /// Let `spender` pull up to `amount` of `owner`'s funds
    fn approve(
        &self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
        currency: &Currency,
    ) -> Result<(), TransferError>;
}

/// Resolves the controller for a currency and standard tag (e.g. `"erc20"`)
pub trait ControllerResolver: Send + Sync {
    fn resolve(
        &self,
        currency: &Currency,
        standard: &str,
    ) -> Result<Arc<dyn TransferController>, TransferError>;
}

/// Native-asset transfer primitive of the host
pub trait NativeTransfer: Send + Sync {
    fn send(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError>;
}

/// Resolver backed by an explicit registration table
#[derive(Default)]
pub struct StaticResolver {
    controllers: RwLock<HashMap<(Currency, String), Arc<dyn TransferController>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        currency: Currency,
        standard: impl Into<String>,
        controller: Arc<dyn TransferController>,
    ) {
        self.controllers
            .write()
            .insert((currency, standard.into()), controller);
    }
}

impl ControllerResolver for StaticResolver {
    fn resolve(
        &self,
        currency: &Currency,
        standard: &str,
    ) -> Result<Arc<dyn TransferController>, TransferError> {
        self.controllers
            .read()
            .get(&(*currency, standard.to_string()))
            .cloned()
            .ok_or_else(|| TransferError::NoController {
                currency: *currency,
                standard: standard.to_string(),
            })
    }
}

/// In-memory fungible token ledger with allowances
#[derive(Default)]
pub struct TokenLedger {
    balances: RwLock<HashMap<(Address, Currency), Amount>>,
    allowances: RwLock<HashMap<(Address, Address, Currency), Amount>>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` out of thin air (host-side minting)
    pub fn mint(&self, owner: Address, currency: Currency, amount: Amount) {
        *self.balances.write().entry((owner, currency)).or_insert(0) += amount;
    }

    pub fn balance_of(&self, owner: &Address, currency: &Currency) -> Amount {
        self.balances
            .read()
            .get(&(*owner, *currency))
            .copied()
            .unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address, currency: &Currency) -> Amount {
        self.allowances
            .read()
            .get(&(*owner, *spender, *currency))
            .copied()
            .unwrap_or(0)
    }

    fn move_balance(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
        currency: &Currency,
    ) -> Result<(), TransferError> {
        let mut balances = self.balances.write();
        let available = balances.get(&(*from, *currency)).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                owner: *from,
                currency: *currency,
                available,
                required: amount,
            });
        }
        balances.insert((*from, *currency), available - amount);
        *balances.entry((*to, *currency)).or_insert(0) += amount;
        Ok(())
    }
}

impl TransferController for TokenLedger {
    fn pull(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
        currency: &Currency,
    ) -> Result<(), TransferError> {
        let available = self.allowance(from, to, currency);
        if available < amount {
            return Err(TransferError::InsufficientAllowance {
                owner: *from,
                spender: *to,
                currency: *currency,
                available,
                required: amount,
            });
        }
        self.move_balance(from, to, amount, currency)?;
        self.allowances
            .write()
            .insert((*from, *to, *currency), available - amount);
        Ok(())
    }

    fn dispatch(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
        currency: &Currency,
    ) -> Result<(), TransferError> {
        self.move_balance(from, to, amount, currency)
    }

    fn approve(
        &self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
        currency: &Currency,
    ) -> Result<(), TransferError> {
        self.allowances
            .write()
            .insert((*owner, *spender, *currency), amount);
        Ok(())
    }
}

/// In-memory native-asset balances
#[derive(Default)]
pub struct NativeVault {
    balances: RwLock<HashMap<Address, Amount>>,
}

impl NativeVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit native value arriving with a call
    pub fn credit(&self, owner: Address, amount: Amount) {
        *self.balances.write().entry(owner).or_insert(0) += amount;
    }

    pub fn balance_of(&self, owner: &Address) -> Amount {
        self.balances.read().get(owner).copied().unwrap_or(0)
    }
}

impl NativeTransfer for NativeVault {
    fn send(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
        let mut balances = self.balances.write();
        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                owner: *from,
                currency: Currency::NATIVE,
                available,
                required: amount,
            });
        }
        balances.insert(*from, available - amount);
        *balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Currency {
        Currency::fungible(Address::repeat_byte(0x70))
    }

    #[test]
    fn test_pull_requires_allowance() {
        let ledger = TokenLedger::new();
        let alice = Address::repeat_byte(1);
        let fund = Address::repeat_byte(2);
        ledger.mint(alice, token(), 100);

        let result = ledger.pull(&alice, &fund, 60, &token());
        assert!(matches!(
            result,
            Err(TransferError::InsufficientAllowance { available: 0, .. })
        ));

        ledger.approve(&alice, &fund, 60, &token()).unwrap();
        ledger.pull(&alice, &fund, 60, &token()).unwrap();
        assert_eq!(ledger.balance_of(&alice, &token()), 40);
        assert_eq!(ledger.balance_of(&fund, &token()), 60);
        assert_eq!(ledger.allowance(&alice, &fund, &token()), 0);
    }

    #[test]
    fn test_dispatch_rejects_overdraw() {
        let ledger = TokenLedger::new();
        let fund = Address::repeat_byte(2);
        let bob = Address::repeat_byte(3);
        ledger.mint(fund, token(), 10);

        assert!(ledger.dispatch(&fund, &bob, 11, &token()).is_err());
        assert_eq!(ledger.balance_of(&fund, &token()), 10);

        ledger.dispatch(&fund, &bob, 10, &token()).unwrap();
        assert_eq!(ledger.balance_of(&bob, &token()), 10);
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticResolver::new();
        let ledger: Arc<dyn TransferController> = Arc::new(TokenLedger::new());
        resolver.register(token(), "erc20", ledger);

        assert!(resolver.resolve(&token(), "erc20").is_ok());
        assert!(matches!(
            resolver.resolve(&token(), "erc721"),
            Err(TransferError::NoController { .. })
        ));
    }

    #[test]
    fn test_native_vault() {
        let vault = NativeVault::new();
        let fund = Address::repeat_byte(2);
        let bob = Address::repeat_byte(3);
        vault.credit(fund, 5);

        assert!(vault.send(&fund, &bob, 6).is_err());
        vault.send(&fund, &bob, 5).unwrap();
        assert_eq!(vault.balance_of(&bob), 5);
        assert_eq!(vault.balance_of(&fund), 0);
    }
}
