//! Beneficiaries receiving forwarded claims

use crate::error::TransferError;
use crate::transfer::TransferController;
use parking_lot::RwLock;
use revfund_core::{Address, Amount, Currency};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// External recipient of claimed funds forwarded by the fund
pub trait Beneficiary: Send + Sync {
    /// Address the fund approves before handing over tokens
    fn address(&self) -> Address;

    /// Native value has already been sent to [`Self::address`]
    fn receive_native(
        &self,
        destination: &Address,
        balance_type: &str,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Tokens are pulled by the beneficiary from `sender`'s approval
    fn receive_tokens(
        &self,
        sender: &Address,
        destination: &Address,
        balance_type: &str,
        amount: Amount,
        currency: &Currency,
        standard: &str,
    ) -> Result<(), TransferError>;
}

/// A delivery observed by [`RecordingBeneficiary`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub destination: Address,
    pub balance_type: String,
    pub amount: Amount,
    pub currency: Currency,
    pub standard: Option<String>,
}

/// Beneficiary that records what it receives and can be told to refuse
///
/// With a token controller attached, token deliveries pull the approved
/// amount into the beneficiary's own address before being recorded.
pub struct RecordingBeneficiary {
    address: Address,
    tokens: Option<Arc<dyn TransferController>>,
    deliveries: RwLock<Vec<Delivery>>,
    rejecting: RwLock<bool>,
}

impl RecordingBeneficiary {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            tokens: None,
            deliveries: RwLock::new(Vec::new()),
            rejecting: RwLock::new(false),
        }
    }

    /// Pull forwarded tokens through `controller`
    pub fn with_token_controller(mut self, controller: Arc<dyn TransferController>) -> Self {
        self.tokens = Some(controller);
        self
    }

    /// Make subsequent deliveries fail
    pub fn set_rejecting(&self, rejecting: bool) {
        *self.rejecting.write() = rejecting;
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.read().clone()
    }

    /// Sum delivered to `destination` in `currency`
    pub fn received(&self, destination: &Address, currency: &Currency) -> Amount {
        self.deliveries
            .read()
            .iter()
            .filter(|d| &d.destination == destination && &d.currency == currency)
            .map(|d| d.amount)
            .sum()
    }

    fn ensure_accepting(&self) -> Result<(), TransferError> {
        if *self.rejecting.read() {
            return Err(TransferError::Rejected(format!(
                "beneficiary {} refused delivery",
                self.address
            )));
        }
        Ok(())
    }

    fn record(&self, delivery: Delivery) {
        self.deliveries.write().push(delivery);
    }
}

impl Beneficiary for RecordingBeneficiary {
    fn address(&self) -> Address {
        self.address
    }

    fn receive_native(
        &self,
        destination: &Address,
        balance_type: &str,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.ensure_accepting()?;
        self.record(Delivery {
            destination: *destination,
            balance_type: balance_type.to_string(),
            amount,
            currency: Currency::NATIVE,
            standard: None,
        });
        Ok(())
    }

    fn receive_tokens(
        &self,
        sender: &Address,
        destination: &Address,
        balance_type: &str,
        amount: Amount,
        currency: &Currency,
        standard: &str,
    ) -> Result<(), TransferError> {
        self.ensure_accepting()?;
        if let Some(tokens) = &self.tokens {
            tokens.pull(sender, &self.address, amount, currency)?;
        }
        self.record(Delivery {
            destination: *destination,
            balance_type: balance_type.to_string(),
            amount,
            currency: *currency,
            standard: Some(standard.to_string()),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TokenLedger;

    #[test]
    fn test_records_deliveries() {
        let beneficiary = RecordingBeneficiary::new(Address::repeat_byte(0xbe));
        let dest = Address::repeat_byte(1);
        let token = Currency::fungible(Address::repeat_byte(0x70));

        beneficiary.receive_native(&dest, "staged", 5).unwrap();
        beneficiary
            .receive_tokens(&Address::repeat_byte(2), &dest, "staged", 7, &token, "erc20")
            .unwrap();

        assert_eq!(beneficiary.deliveries().len(), 2);
        assert_eq!(beneficiary.received(&dest, &Currency::NATIVE), 5);
        assert_eq!(beneficiary.received(&dest, &token), 7);
    }

    #[test]
    fn test_rejecting_beneficiary() {
        let beneficiary = RecordingBeneficiary::new(Address::repeat_byte(0xbe));
        beneficiary.set_rejecting(true);

        let result = beneficiary.receive_native(&Address::repeat_byte(1), "staged", 5);
        assert!(matches!(result, Err(TransferError::Rejected(_))));
        assert!(beneficiary.deliveries().is_empty());
    }

    #[test]
    fn test_token_delivery_pulls_from_sender() {
        let ledger = Arc::new(TokenLedger::new());
        let sender = Address::repeat_byte(2);
        let token = Currency::fungible(Address::repeat_byte(0x70));
        let controller: Arc<dyn TransferController> = ledger.clone();
        let beneficiary =
            RecordingBeneficiary::new(Address::repeat_byte(0xbe)).with_token_controller(controller);
        ledger.mint(sender, token, 10);

        // nothing approved yet
        let result = beneficiary.receive_tokens(&sender, &sender, "staged", 7, &token, "erc20");
        assert!(matches!(result, Err(TransferError::InsufficientAllowance { .. })));
        assert!(beneficiary.deliveries().is_empty());

        ledger.approve(&sender, &beneficiary.address(), 7, &token).unwrap();
        beneficiary
            .receive_tokens(&sender, &sender, "staged", 7, &token, "erc20")
            .unwrap();
        assert_eq!(ledger.balance_of(&sender, &token), 3);
        assert_eq!(ledger.balance_of(&beneficiary.address(), &token), 7);
        assert_eq!(ledger.allowance(&sender, &beneficiary.address(), &token), 0);
    }
}
