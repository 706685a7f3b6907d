/// EVM-specific types and utilities for the presale SDK
///
/// Payment-token descriptors, JSON-RPC quantity encoding, and base-unit
/// conversion helpers shared by the wallet and presale modules.
use crate::error::Error;
use alloy_primitives::{Address, U256};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Decimals of the presale token itself
pub const SALE_TOKEN_DECIMALS: u8 = 18;

/// A currency the presale contract accepts as payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentToken {
    /// Display symbol (e.g. "ETH", "USDT")
    pub symbol: String,
    /// ERC-20 contract address; `None` for the chain's native asset
    pub address: Option<Address>,
    /// Decimal count of the smallest unit (varies by chain for the same stablecoin)
    pub decimals: u8,
    /// Whether one unit is worth one US dollar
    pub usd_pegged: bool,
}

impl PaymentToken {
    /// Native asset of a chain (always 18 decimals on supported EVM chains)
    pub fn native(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            address: None,
            decimals: 18,
            usd_pegged: false,
        }
    }

    /// USD-pegged ERC-20 stablecoin
    pub fn stablecoin(symbol: &str, address: Address, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            address: Some(address),
            decimals,
            usd_pegged: true,
        }
    }

    pub fn is_native(&self) -> bool {
        self.address.is_none()
    }

    /// Address passed to the presale contract (zero address selects the native asset)
    pub fn contract_argument(&self) -> Address {
        self.address.unwrap_or(Address::ZERO)
    }
}

/// Gas limit headroom applied on top of `eth_estimateGas`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasFeeTier {
    Low,
    Standard,
    High,
}

impl GasFeeTier {
    pub fn buffer_percent(&self) -> u64 {
        match self {
            GasFeeTier::Low => 20,
            GasFeeTier::Standard => 30,
            GasFeeTier::High => 50,
        }
    }

    /// Apply the buffer to a gas estimate
    pub fn apply(&self, estimate: u64) -> u64 {
        estimate.saturating_add(estimate.saturating_mul(self.buffer_percent()) / 100)
    }
}

/// Utility functions for EVM operations
pub mod utils {
    use super::*;

    /// Encode a number as a JSON-RPC quantity (`0x`-prefixed, no leading zeros)
    pub fn to_quantity(value: u64) -> String {
        format!("{:#x}", value)
    }

    /// Encode a U256 as a JSON-RPC quantity
    pub fn u256_to_quantity(value: U256) -> String {
        format!("{:#x}", value)
    }

    /// Parse a JSON-RPC quantity string into a U256
    pub fn parse_quantity(raw: &str) -> Result<U256, Error> {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| Error::Rpc(format!("Expected hex quantity, got '{}'", raw)))?;
        if digits.is_empty() {
            return Ok(U256::ZERO);
        }
        U256::from_str_radix(digits, 16)
            .map_err(|e| Error::Rpc(format!("Invalid hex quantity '{}': {}", raw, e)))
    }

    /// Parse a JSON-RPC quantity that must fit in a u64 (chain ids, block numbers)
    pub fn parse_u64_quantity(raw: &str) -> Result<u64, Error> {
        let value = parse_quantity(raw)?;
        u64::try_from(value).map_err(|_| Error::Rpc(format!("Quantity '{}' overflows u64", raw)))
    }

    /// Convert a decimal string amount into base units with `decimals` precision.
    ///
    /// Integer arithmetic only; extra fractional digits beyond `decimals` are truncated.
    pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, Error> {
        let amount = amount.trim();
        let multiplier = U256::from(10u64).pow(U256::from(decimals));

        let (integer_part, fraction_part) = match amount.find('.') {
            Some(dot) => (&amount[..dot], &amount[dot + 1..]),
            None => (amount, ""),
        };
        let fraction_part = if fraction_part.len() > decimals as usize {
            &fraction_part[..decimals as usize]
        } else {
            fraction_part
        };

        let int_value = if integer_part.is_empty() {
            U256::ZERO
        } else {
            U256::from_str(integer_part)
                .map_err(|_| Error::Config(format!("Invalid amount: {}", amount)))?
        };
        let frac_value = if fraction_part.is_empty() {
            U256::ZERO
        } else {
            U256::from_str(fraction_part)
                .map_err(|_| Error::Config(format!("Invalid amount: {}", amount)))?
        };
        let frac_multiplier =
            U256::from(10u64).pow(U256::from(decimals as usize - fraction_part.len()));

        int_value
            .checked_mul(multiplier)
            .and_then(|v| v.checked_add(frac_value * frac_multiplier))
            .ok_or_else(|| Error::Config(format!("Amount overflows uint256: {}", amount)))
    }

    /// Render base units as a decimal string, trimming trailing zeros
    pub fn format_units(value: U256, decimals: u8) -> String {
        let multiplier = U256::from(10u64).pow(U256::from(decimals));
        let whole = value / multiplier;
        let fraction = value % multiplier;
        if fraction.is_zero() {
            return whole.to_string();
        }
        let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
        format!("{}.{}", whole, fraction.trim_end_matches('0'))
    }

    /// Convert an exact decimal amount into base units (truncating sub-unit dust)
    pub fn decimal_to_units(amount: &BigDecimal, decimals: u8) -> Result<U256, Error> {
        if amount < &BigDecimal::from(0) {
            return Err(Error::Pricing(format!("Negative amount: {}", amount)));
        }
        let scaled = amount * BigDecimal::from_str(&format!("1e{}", decimals))
            .map_err(|e| Error::Pricing(e.to_string()))?;
        let (integral, _) = scaled.with_scale(0).into_bigint_and_exponent();
        U256::from_str(&integral.to_string())
            .map_err(|e| Error::Pricing(format!("Amount {} out of range: {}", amount, e)))
    }

    /// Convert base units into an exact decimal amount
    pub fn units_to_decimal(value: U256, decimals: u8) -> BigDecimal {
        BigDecimal::from_str(&format_units(value, decimals)).unwrap_or_default()
    }
}
