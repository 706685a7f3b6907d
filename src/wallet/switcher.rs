//! Network switching in the connected wallet

use crate::config::chains::{ChainDescriptor, ChainRegistry};
use crate::error::Error;
use crate::evm::types::utils::to_quantity;
use crate::wallet::provider::{codes, ProviderClient, WalletProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Native currency block of `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Network registration shape expected by `wallet_addEthereumChain` (EIP-3085)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_explorer_urls: Option<Vec<String>>,
}

impl From<&ChainDescriptor> for AddChainParams {
    fn from(descriptor: &ChainDescriptor) -> Self {
        Self {
            chain_id: to_quantity(descriptor.chain_id),
            chain_name: descriptor.display_name.clone(),
            native_currency: NativeCurrency {
                name: descriptor.native_symbol.clone(),
                symbol: descriptor.native_symbol.clone(),
                decimals: 18,
            },
            rpc_urls: descriptor.rpc_urls.clone(),
            block_explorer_urls: descriptor
                .block_explorer_url
                .as_ref()
                .map(|url| vec![url.clone()]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The wallet already knew the chain and switched to it
    Switched,
    /// The chain was registered in the wallet through the add-chain fallback
    Added,
}

/// Requests (or registers) networks in the connected wallet
#[derive(Clone)]
pub struct ChainSwitcher {
    client: ProviderClient,
    registry: Arc<ChainRegistry>,
}

impl ChainSwitcher {
    pub fn new(provider: Arc<dyn WalletProvider>, registry: Arc<ChainRegistry>) -> Self {
        Self {
            client: ProviderClient::new(provider),
            registry,
        }
    }

    /// Switch the wallet to `chain_id`.
    ///
    /// An unrecognized-chain response triggers exactly one add-chain request;
    /// any other provider error is returned unchanged and nothing is retried.
    pub async fn switch_to(&self, chain_id: u64) -> Result<SwitchOutcome, Error> {
        let descriptor = self.registry.get(chain_id)?;

        match self.client.switch_chain(chain_id).await {
            Ok(()) => {
                info!(chain_id, "Switched wallet network");
                Ok(SwitchOutcome::Switched)
            }
            Err(Error::Provider(e)) if e.code == codes::UNRECOGNIZED_CHAIN => {
                warn!(chain_id, "Chain unknown to wallet, requesting add-chain");
                let params = serde_json::to_value(AddChainParams::from(descriptor))?;
                self.client.add_chain(params).await?;
                info!(chain_id, "Added network to wallet");
                Ok(SwitchOutcome::Added)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::chains::BSC;

    #[test]
    fn test_add_chain_params_shape() {
        let registry = ChainRegistry::builtin();
        let params = AddChainParams::from(registry.get(BSC).unwrap());
        let json = serde_json::to_value(&params).unwrap();

        assert_eq!(json["chainId"], "0x38");
        assert_eq!(json["chainName"], "BNB Smart Chain");
        assert_eq!(json["nativeCurrency"]["symbol"], "BNB");
        assert_eq!(json["nativeCurrency"]["decimals"], 18);
        assert_eq!(json["blockExplorerUrls"][0], "https://bscscan.com");
        assert!(json["rpcUrls"].as_array().unwrap().len() >= 1);
    }
}
