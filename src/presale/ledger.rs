//! Purchase history reconstructed from `TokensPurchased` logs
//!
//! There is no off-chain store: a buyer's total is the sum of the token
//! amounts in every matching log. Queries go through a direct RPC reader,
//! never the wallet. By default every call rescans the configured block range;
//! with checkpointing enabled, each (chain, buyer) pair keeps the events seen
//! so far and only scans blocks after the last one covered.

use crate::config::chains::ChainRegistry;
use crate::config::LedgerSettings;
use crate::error::Error;
use crate::evm::client::ChainReader;
use crate::evm::codec;
use crate::evm::types::utils::units_to_decimal;
use crate::evm::types::SALE_TOKEN_DECIMALS;
use alloy_primitives::{Address, B256, U256};
use alloy_rpc_types_eth::{BlockNumberOrTag, Filter};
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One decoded `TokensPurchased` log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseEvent {
    pub buyer: Address,
    /// Sale-token base units
    pub token_amount: U256,
    pub cost_in_payment_units: U256,
    pub cost_usd: U256,
    pub phase: u8,
    pub is_genesis_discount: bool,
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl PurchaseEvent {
    /// Token amount in whole sale tokens
    pub fn tokens(&self) -> BigDecimal {
        units_to_decimal(self.token_amount, SALE_TOKEN_DECIMALS)
    }
}

/// Aggregate of a buyer's purchases on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseSummary {
    pub buyer: Address,
    pub chain_id: u64,
    /// Sale-token base units
    pub total_token_amount: U256,
    pub purchase_count: usize,
    pub events: Vec<PurchaseEvent>,
}

impl PurchaseSummary {
    pub fn from_events(buyer: Address, chain_id: u64, events: Vec<PurchaseEvent>) -> Result<Self, Error> {
        let total_token_amount = sum_token_amounts(&events)?;
        Ok(Self {
            buyer,
            chain_id,
            total_token_amount,
            purchase_count: events.len(),
            events,
        })
    }

    /// Total vesting-eligible tokens in whole sale tokens
    pub fn total_tokens(&self) -> BigDecimal {
        units_to_decimal(self.total_token_amount, SALE_TOKEN_DECIMALS)
    }
}

/// Sum token amounts; order-independent
pub fn sum_token_amounts(events: &[PurchaseEvent]) -> Result<U256, Error> {
    events.iter().try_fold(U256::ZERO, |acc, event| {
        acc.checked_add(event.token_amount)
            .ok_or_else(|| Error::LogQuery("Purchase total overflows uint256".to_string()))
    })
}

#[derive(Debug, Default)]
struct Checkpoint {
    next_block: u64,
    seen: HashSet<(Option<B256>, Option<u64>)>,
    events: Vec<PurchaseEvent>,
}

pub struct PurchaseLedger {
    registry: Arc<ChainRegistry>,
    readers: HashMap<u64, Arc<dyn ChainReader>>,
    settings: LedgerSettings,
    /// Outer lock only guards the map; each (chain, buyer) scan holds its own entry
    checkpoints: Mutex<HashMap<(u64, Address), Arc<Mutex<Checkpoint>>>>,
}

impl PurchaseLedger {
    pub fn new(registry: Arc<ChainRegistry>, settings: LedgerSettings) -> Self {
        Self {
            registry,
            readers: HashMap::new(),
            settings,
            checkpoints: Mutex::new(HashMap::new()),
        }
    }

    /// Register the log reader for a chain (keyed by its own chain id)
    pub fn with_reader(mut self, reader: Arc<dyn ChainReader>) -> Self {
        self.readers.insert(reader.chain_id(), reader);
        self
    }

    fn reader(&self, chain_id: u64) -> Result<&Arc<dyn ChainReader>, Error> {
        self.readers.get(&chain_id).ok_or_else(|| {
            Error::LogQuery(format!("No RPC reader configured for chain {}", chain_id))
        })
    }

    /// Log filter for `buyer`'s purchases on `presale`, from `from_block` onwards
    pub fn purchase_filter(presale: Address, buyer: Address, from_block: u64) -> Filter {
        let from = if from_block == 0 {
            BlockNumberOrTag::Earliest
        } else {
            BlockNumberOrTag::Number(from_block)
        };
        Filter::new()
            .address(presale)
            .event_signature(codec::purchase_topic())
            .topic1(codec::address_topic(buyer))
            .from_block(from)
    }

    /// Total tokens `buyer` purchased on `chain_id`, in whole sale tokens
    pub async fn fetch_purchase_total(&self, buyer: Address, chain_id: u64) -> Result<BigDecimal, Error> {
        Ok(self.fetch_summary(buyer, chain_id).await?.total_tokens())
    }

    /// Every purchase `buyer` made on `chain_id`, with the aggregate
    pub async fn fetch_summary(&self, buyer: Address, chain_id: u64) -> Result<PurchaseSummary, Error> {
        let descriptor = self.registry.get(chain_id)?;
        let reader = self.reader(chain_id)?;
        let presale = descriptor.presale_contract_address;

        let events = if self.settings.checkpointing {
            self.scan_incremental(reader.as_ref(), presale, buyer, chain_id).await?
        } else {
            let filter = Self::purchase_filter(presale, buyer, self.settings.from_block)
                .to_block(BlockNumberOrTag::Latest);
            decode_logs(reader.as_ref(), &filter).await?
        };

        let summary = PurchaseSummary::from_events(buyer, chain_id, events)?;
        info!(
            %buyer,
            chain_id,
            purchases = summary.purchase_count,
            total = %summary.total_tokens(),
            "Purchase history loaded"
        );
        Ok(summary)
    }

    /// Summaries across every chain with a reader; chains that fail are skipped
    pub async fn fetch_all_chains(&self, buyer: Address) -> Vec<PurchaseSummary> {
        let mut chain_ids: Vec<u64> = self.readers.keys().copied().collect();
        chain_ids.sort_unstable();

        let results = futures::future::join_all(
            chain_ids
                .iter()
                .map(|&chain_id| async move { (chain_id, self.fetch_summary(buyer, chain_id).await) }),
        )
        .await;

        results
            .into_iter()
            .filter_map(|(chain_id, result)| match result {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(chain_id, %buyer, error = %e, "Skipping chain in purchase history");
                    None
                }
            })
            .collect()
    }

    /// Forget checkpoints so the next read rescans from the configured block
    pub async fn reset_checkpoints(&self) {
        self.checkpoints.lock().await.clear();
    }

    async fn scan_incremental(
        &self,
        reader: &dyn ChainReader,
        presale: Address,
        buyer: Address,
        chain_id: u64,
    ) -> Result<Vec<PurchaseEvent>, Error> {
        let entry = self
            .checkpoints
            .lock()
            .await
            .entry((chain_id, buyer))
            .or_insert_with(|| {
                Arc::new(Mutex::new(Checkpoint {
                    next_block: self.settings.from_block,
                    ..Default::default()
                }))
            })
            .clone();
        let mut checkpoint = entry.lock().await;

        let head = reader.block_number().await?;
        if head >= checkpoint.next_block {
            let filter = Self::purchase_filter(presale, buyer, checkpoint.next_block)
                .to_block(BlockNumberOrTag::Number(head));
            let fresh = decode_logs(reader, &filter).await?;
            debug!(
                chain_id,
                %buyer,
                from = checkpoint.next_block,
                to = head,
                fresh = fresh.len(),
                "Incremental purchase scan"
            );
            for event in fresh {
                if checkpoint.seen.insert((event.tx_hash, event.log_index)) {
                    checkpoint.events.push(event);
                }
            }
            checkpoint.next_block = head + 1;
        }

        Ok(checkpoint.events.clone())
    }
}

async fn decode_logs(reader: &dyn ChainReader, filter: &Filter) -> Result<Vec<PurchaseEvent>, Error> {
    let logs = reader.get_logs(filter).await.map_err(|e| match e {
        Error::LogQuery(_) => e,
        other => Error::LogQuery(other.to_string()),
    })?;
    logs.iter().map(codec::decode_purchase_log).collect()
}
