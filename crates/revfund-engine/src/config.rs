//! Fund configuration types

use crate::error::{FundError, Result};
use revfund_core::{Address, BlockNumber, Currency};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete fund configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundConfig {
    /// Custody address funds are pulled into and dispatched from
    #[serde(default = "default_fund_address")]
    pub fund_address: Address,

    /// Address allowed to replace the calculator and batch size
    #[serde(default = "default_deployer")]
    pub deployer: Address,

    /// Start block of every currency's first accrual
    #[serde(default)]
    pub baseline_block: BlockNumber,

    /// Block window per claim-next call; whole accruals when unset
    #[serde(default)]
    pub claim_block_batch_size: Option<u64>,

    /// Currency treated as the host's native asset
    #[serde(default)]
    pub native_currency: Currency,

    /// Controller standard used when a call names none
    #[serde(default = "default_standard")]
    pub default_standard: String,

    /// Balance-type label used when forwarding without one
    #[serde(default = "default_balance_type")]
    pub default_balance_type: String,
}

fn default_fund_address() -> Address {
    Address::repeat_byte(0xfd)
}

fn default_deployer() -> Address {
    Address::repeat_byte(0xde)
}

fn default_standard() -> String {
    "erc20".to_string()
}

fn default_balance_type() -> String {
    "staged".to_string()
}

impl Default for FundConfig {
    fn default() -> Self {
        Self {
            fund_address: default_fund_address(),
            deployer: default_deployer(),
            baseline_block: 0,
            claim_block_batch_size: None,
            native_currency: Currency::NATIVE,
            default_standard: default_standard(),
            default_balance_type: default_balance_type(),
        }
    }
}

impl FundConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| FundError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| FundError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FundError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.fund_address.is_zero() {
            return Err(FundError::InvalidConfig(
                "fund_address must not be the zero address".to_string(),
            ));
        }
        if self.claim_block_batch_size == Some(0) {
            return Err(FundError::InvalidConfig(
                "claim_block_batch_size must be non-zero when set".to_string(),
            ));
        }
        if self.default_standard.is_empty() {
            return Err(FundError::InvalidConfig(
                "default_standard must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_native(&self, currency: &Currency) -> bool {
        currency == &self.native_currency
    }
}
