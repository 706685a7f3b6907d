//! Chain registry
//!
//! Static table of every chain the presale runs on. Descriptors are built once
//! at startup and never mutated; chain-specific behaviour elsewhere in the SDK
//! is a lookup into this table rather than a comparison against literal ids.

use crate::error::Error;
use crate::evm::types::{GasFeeTier, PaymentToken};
use alloy_primitives::{address, Address};
use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::str::FromStr;

pub const ETHEREUM: u64 = 1;
pub const BSC: u64 = 56;
pub const POLYGON: u64 = 137;
pub const BASE: u64 = 8453;

/// Everything the client needs to know about one presale chain
#[derive(Debug, Clone)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub display_name: String,
    pub native_symbol: String,
    pub rpc_urls: Vec<String>,
    pub block_explorer_url: Option<String>,
    pub presale_contract_address: Address,
    pub token_contract_address: Address,
    pub usdt_address: Option<Address>,
    /// Genesis NFT collection whose holders get the purchase discount
    pub genesis_nft_address: Option<Address>,
    pub supported_payment_tokens: Vec<PaymentToken>,
    pub gas_fee_tier: GasFeeTier,
    /// Static USD price of the native asset used for advisory quotes
    pub native_usd_estimate: BigDecimal,
}

impl ChainDescriptor {
    /// Look up a supported payment token by symbol (case-insensitive)
    pub fn payment_token(&self, symbol: &str) -> Option<&PaymentToken> {
        self.supported_payment_tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn native_token(&self) -> PaymentToken {
        PaymentToken::native(&self.native_symbol)
    }

    /// Resolve the payment token, failing if this chain doesn't accept it
    pub fn require_payment_token(&self, symbol: &str) -> Result<&PaymentToken, Error> {
        self.payment_token(symbol).ok_or_else(|| {
            Error::Config(format!(
                "{} is not accepted on {} (supported: {})",
                symbol,
                self.display_name,
                self.supported_payment_tokens
                    .iter()
                    .map(|t| t.symbol.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }
}

/// Chain id → descriptor lookup table
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<u64, ChainDescriptor>,
}

impl ChainRegistry {
    pub fn new(descriptors: Vec<ChainDescriptor>) -> Self {
        Self {
            chains: descriptors.into_iter().map(|d| (d.chain_id, d)).collect(),
        }
    }

    /// The chains the presale is deployed on
    pub fn builtin() -> Self {
        Self::new(vec![ethereum(), bsc(), polygon(), base()])
    }

    /// Replace RPC endpoint lists for the given chains (unknown ids are ignored)
    pub fn with_rpc_overrides(mut self, overrides: &HashMap<u64, Vec<String>>) -> Self {
        for (chain_id, urls) in overrides {
            if let Some(descriptor) = self.chains.get_mut(chain_id) {
                if !urls.is_empty() {
                    descriptor.rpc_urls = urls.clone();
                }
            }
        }
        self
    }

    /// Replace the static native-asset price estimates for the given chains
    pub fn with_native_usd_estimates(
        mut self,
        estimates: &HashMap<u64, String>,
    ) -> Result<Self, Error> {
        for (chain_id, price) in estimates {
            if let Some(descriptor) = self.chains.get_mut(chain_id) {
                descriptor.native_usd_estimate = BigDecimal::from_str(price).map_err(|e| {
                    Error::Config(format!(
                        "Invalid native USD estimate '{}' for chain {}: {}",
                        price, chain_id, e
                    ))
                })?;
            }
        }
        Ok(self)
    }

    pub fn get(&self, chain_id: u64) -> Result<&ChainDescriptor, Error> {
        self.chains
            .get(&chain_id)
            .ok_or(Error::UnknownChain(chain_id))
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }

    /// Registered chain ids in ascending order
    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainDescriptor> {
        let mut descriptors: Vec<&ChainDescriptor> = self.chains.values().collect();
        descriptors.sort_by_key(|d| d.chain_id);
        descriptors.into_iter()
    }
}

fn usd(price: &str) -> BigDecimal {
    BigDecimal::from_str(price).unwrap_or_default()
}

fn ethereum() -> ChainDescriptor {
    let usdt = address!("dAC17F958D2ee523a2206206994597C13D831ec7");
    let usdc = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    ChainDescriptor {
        chain_id: ETHEREUM,
        display_name: "Ethereum".to_string(),
        native_symbol: "ETH".to_string(),
        rpc_urls: vec![
            "https://eth.llamarpc.com".to_string(),
            "https://ethereum-rpc.publicnode.com".to_string(),
        ],
        block_explorer_url: Some("https://etherscan.io".to_string()),
        presale_contract_address: address!("4f3B1C6a2e8D6b2cA0d7fE3e9b5A1c8D2e7F9a01"),
        token_contract_address: address!("7A2c9E1b4D8f3a6C5e0B2d9F1a7C3e8B6d4F2a10"),
        usdt_address: Some(usdt),
        genesis_nft_address: Some(address!("9c1E4b7A2d5F8c3B6e0A9d2F5b8C1e4A7d0F3b20")),
        supported_payment_tokens: vec![
            PaymentToken::native("ETH"),
            PaymentToken::stablecoin("USDT", usdt, 6),
            PaymentToken::stablecoin("USDC", usdc, 6),
        ],
        gas_fee_tier: GasFeeTier::High,
        native_usd_estimate: usd("3000"),
    }
}

fn bsc() -> ChainDescriptor {
    let usdt = address!("55d398326f99059fF775485246999027B3197955");
    ChainDescriptor {
        chain_id: BSC,
        display_name: "BNB Smart Chain".to_string(),
        native_symbol: "BNB".to_string(),
        rpc_urls: vec![
            "https://bsc-dataseed.binance.org".to_string(),
            "https://bsc-rpc.publicnode.com".to_string(),
        ],
        block_explorer_url: Some("https://bscscan.com".to_string()),
        presale_contract_address: address!("2B8e5A1c7D4f9b3E6a0C8d2F5e1B7a4C9d3E6f31"),
        token_contract_address: address!("5D1a8C4e7B2f6A9d3C0e5B8a1D4f7C2e9A6b3d41"),
        usdt_address: Some(usdt),
        genesis_nft_address: None,
        supported_payment_tokens: vec![
            PaymentToken::native("BNB"),
            // BSC-peg USDT uses 18 decimals, unlike Ethereum's 6
            PaymentToken::stablecoin("USDT", usdt, 18),
        ],
        gas_fee_tier: GasFeeTier::Low,
        native_usd_estimate: usd("600"),
    }
}

fn polygon() -> ChainDescriptor {
    let usdt = address!("c2132D05D31c914a87C6611C10748AEb04B58e8F");
    ChainDescriptor {
        chain_id: POLYGON,
        display_name: "Polygon".to_string(),
        native_symbol: "POL".to_string(),
        rpc_urls: vec!["https://polygon-rpc.com".to_string()],
        block_explorer_url: Some("https://polygonscan.com".to_string()),
        presale_contract_address: address!("8E3b6D1f4A7c2E9b5D0a3F6c8B1e4D7a2C5f9e51"),
        token_contract_address: address!("3C7f1A9d5E2b8C4a6F0d3B7e1A5c9D2f8E4b6a61"),
        usdt_address: Some(usdt),
        genesis_nft_address: None,
        supported_payment_tokens: vec![
            PaymentToken::native("POL"),
            PaymentToken::stablecoin("USDT", usdt, 6),
        ],
        gas_fee_tier: GasFeeTier::Standard,
        native_usd_estimate: usd("0.5"),
    }
}

fn base() -> ChainDescriptor {
    let usdc = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
    ChainDescriptor {
        chain_id: BASE,
        display_name: "Base".to_string(),
        native_symbol: "ETH".to_string(),
        rpc_urls: vec!["https://mainnet.base.org".to_string()],
        block_explorer_url: Some("https://basescan.org".to_string()),
        presale_contract_address: address!("6A4d2F8b1C5e9A3d7B0f4E8c2A6d1F5b9C3e7a71"),
        token_contract_address: address!("1F8c5B2e6D9a4C7f3A0b8E5d1C4a7F2b6E9d3c81"),
        usdt_address: None,
        genesis_nft_address: None,
        supported_payment_tokens: vec![
            PaymentToken::native("ETH"),
            PaymentToken::stablecoin("USDC", usdc, 6),
        ],
        gas_fee_tier: GasFeeTier::Low,
        native_usd_estimate: usd("3000"),
    }
}
