/// Presale purchase lifecycle
///
/// - `pricing`: tiered USD pricing and payment quotes
/// - `approval`: ERC-20 allowance checks and approvals
/// - `receipt`: confirmation polling and transaction tracking
/// - `executor`: purchase submission
/// - `ledger`: purchase history from event logs
/// - `progress`: aggregate sale progress
pub mod approval;
pub mod executor;
pub mod ledger;
pub mod pricing;
pub mod progress;
pub mod receipt;

pub use approval::{ApprovalManager, ApprovalOutcome, ApprovalState};
pub use executor::{PurchaseExecutor, PurchaseReceipt};
pub use ledger::{PurchaseEvent, PurchaseLedger, PurchaseSummary};
pub use pricing::{PricingEngine, PricingSchedule, PricingTier, Quote};
pub use progress::{SaleProgress, SaleProgressMonitor};
pub use receipt::{
    PendingTransaction, PollPolicy, ReceiptPoller, TransactionKind, TransactionStatus,
    TransactionTracker,
};

use crate::config::chains::ChainDescriptor;
use crate::error::Error;
use crate::evm::codec;
use crate::evm::types::PaymentToken;
use crate::wallet::provider::ProviderClient;
use alloy_primitives::{Address, U256};

/// Whether `owner` holds a genesis NFT on `chain` (ERC-721 `balanceOf > 0`).
///
/// Chains without a genesis collection never grant the discount.
pub async fn holder_discount_eligible(
    client: &ProviderClient,
    chain: &ChainDescriptor,
    owner: Address,
) -> Result<bool, Error> {
    let Some(collection) = chain.genesis_nft_address else {
        return Ok(false);
    };
    let raw = client
        .call(collection, codec::encode_nft_balance_of(owner))
        .await?;
    Ok(!codec::decode_uint256(&raw)?.is_zero())
}

/// Everything the purchase form needs about one buyer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyerSnapshot {
    pub buyer: Address,
    pub chain_id: u64,
    pub native_balance: U256,
    /// `None` for native payment
    pub payment_token_balance: Option<U256>,
    /// Allowance granted to the presale contract; `None` for native payment
    pub allowance: Option<U256>,
    pub holder_discount_eligible: bool,
}

impl BuyerSnapshot {
    /// Read balances, allowance and discount eligibility concurrently
    pub async fn fetch(
        client: &ProviderClient,
        chain: &ChainDescriptor,
        buyer: Address,
        payment_token: &PaymentToken,
    ) -> Result<Self, Error> {
        let spender = chain.presale_contract_address;

        let native = client.get_balance(buyer);
        let discount = holder_discount_eligible(client, chain, buyer);
        let token_balance = async {
            match payment_token.address {
                Some(token) => {
                    let raw = client.call(token, codec::encode_erc20_balance_of(buyer)).await?;
                    codec::decode_uint256(&raw).map(Some)
                }
                None => Ok(None),
            }
        };
        let allowance = async {
            match payment_token.address {
                Some(token) => {
                    let raw = client
                        .call(token, codec::encode_allowance(buyer, spender))
                        .await?;
                    codec::decode_uint256(&raw).map(Some)
                }
                None => Ok(None),
            }
        };

        let (native, discount, token_balance, allowance) =
            futures::join!(native, discount, token_balance, allowance);

        Ok(Self {
            buyer,
            chain_id: chain.chain_id,
            native_balance: native?,
            payment_token_balance: token_balance?,
            allowance: allowance?,
            holder_discount_eligible: discount?,
        })
    }
}
