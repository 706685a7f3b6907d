/// Presale SDK client
///
/// Main entry point: wires the chain registry, RPC readers, wallet session and
/// presale components together from a single [`PresaleConfig`].
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::config::chains::ChainRegistry;
use crate::config::PresaleConfig;
use crate::error::Error;
use crate::evm::abi::AbiRegistry;
use crate::evm::client::{ChainReader, EvmClient};
use crate::notify::WebhookNotifier;
use crate::presale::{
    ApprovalManager, PricingEngine, PurchaseExecutor, PurchaseLedger, ReceiptPoller,
    SaleProgressMonitor, TransactionTracker,
};
use crate::wallet::{ChainSwitcher, WalletProvider, WalletSession};

/// Presale client giving access to every purchase-lifecycle component
pub struct PresaleClient {
    config: PresaleConfig,

    registry: Arc<ChainRegistry>,

    /// Direct RPC readers keyed by chain id
    readers: HashMap<u64, Arc<dyn ChainReader>>,

    /// Wallet session, absent for read-only use
    session: Option<WalletSession>,

    /// Shared by every poller so timed-out transactions survive component rebuilds
    tracker: TransactionTracker,

    ledger: Arc<PurchaseLedger>,

    notifier: WebhookNotifier,
}

impl PresaleClient {
    pub fn config(&self) -> &PresaleConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    pub fn reader(&self, chain_id: u64) -> Result<Arc<dyn ChainReader>, Error> {
        self.readers
            .get(&chain_id)
            .cloned()
            .ok_or(Error::UnknownChain(chain_id))
    }

    pub fn session(&self) -> Result<&WalletSession, Error> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::Connection("No wallet provider detected".to_string()))
    }

    pub fn tracker(&self) -> &TransactionTracker {
        &self.tracker
    }

    pub fn switcher(&self) -> Result<ChainSwitcher, Error> {
        let session = self.session()?;
        Ok(ChainSwitcher::new(
            session.client().provider().clone(),
            self.registry.clone(),
        ))
    }

    pub fn pricing(&self) -> Result<PricingEngine, Error> {
        PricingEngine::from_settings(&self.config.pricing)
    }

    pub fn poller(&self) -> Result<ReceiptPoller, Error> {
        Ok(ReceiptPoller::new(
            self.session()?.client().clone(),
            self.config.polling.policy(),
            self.tracker.clone(),
        ))
    }

    pub fn approvals(&self) -> Result<ApprovalManager, Error> {
        Ok(ApprovalManager::new(
            self.session()?.clone(),
            self.poller()?,
            self.config.approval.ceiling_tokens,
        ))
    }

    /// Executor for the configured chain, quoting at the canonical sold counter
    /// and refreshing the shared ledger on success
    pub fn executor(&self) -> Result<PurchaseExecutor, Error> {
        Ok(PurchaseExecutor::new(
            self.session()?.clone(),
            self.registry.clone(),
            self.config.network.selected_chain_id,
            self.pricing()?,
            Arc::new(self.approvals()?),
            self.poller()?,
        )
        .with_progress(Arc::new(self.progress_monitor()?))
        .with_ledger(self.ledger.clone()))
    }

    pub fn ledger(&self) -> &Arc<PurchaseLedger> {
        &self.ledger
    }

    /// Progress monitor bound to the canonical chain
    pub fn progress_monitor(&self) -> Result<SaleProgressMonitor, Error> {
        Ok(SaleProgressMonitor::new(
            self.reader(self.config.network.canonical_chain_id)?,
            self.registry.clone(),
            self.config.progress.clone(),
        ))
    }

    pub fn notifier(&self) -> &WebhookNotifier {
        &self.notifier
    }

    /// Head-block probe of every configured chain
    pub async fn check_connectivity(&self) -> Vec<(u64, bool)> {
        let mut chain_ids: Vec<u64> = self.readers.keys().copied().collect();
        chain_ids.sort_unstable();

        let probes = chain_ids.into_iter().map(|chain_id| {
            let reader = self.readers[&chain_id].clone();
            async move {
                match reader.block_number().await {
                    Ok(block) => {
                        debug!(chain_id, block, "RPC reachable");
                        (chain_id, true)
                    }
                    Err(e) => {
                        warn!(chain_id, error = %e, "RPC unreachable");
                        (chain_id, false)
                    }
                }
            }
        });
        futures::future::join_all(probes).await
    }

    pub fn get_summary(&self) -> serde_json::Value {
        json!({
            "selected_chain_id": self.config.network.selected_chain_id,
            "canonical_chain_id": self.config.network.canonical_chain_id,
            "chains": self.registry.chain_ids(),
            "wallet_attached": self.session.is_some(),
            "ledger_checkpointing": self.config.ledger.checkpointing,
            "webhook_enabled": self.notifier.is_enabled(),
        })
    }
}

/// Builder for [`PresaleClient`]
pub struct PresaleClientBuilder {
    config: Option<PresaleConfig>,
    wallet: Option<Arc<dyn WalletProvider>>,
    readers: HashMap<u64, Arc<dyn ChainReader>>,
}

impl PresaleClientBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            wallet: None,
            readers: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: PresaleConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Attach the injected wallet provider
    pub fn with_wallet(mut self, wallet: Arc<dyn WalletProvider>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Use `reader` for its chain instead of an HTTP client
    pub fn with_reader(mut self, reader: Arc<dyn ChainReader>) -> Self {
        self.readers.insert(reader.chain_id(), reader);
        self
    }

    pub fn build(self) -> Result<PresaleClient, Error> {
        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => PresaleConfig::load()?,
        };
        AbiRegistry::from_settings(&config.abi)?.validate_codec()?;
        let registry = Arc::new(config.registry()?);

        let mut readers = self.readers;
        for descriptor in registry.iter() {
            if !readers.contains_key(&descriptor.chain_id) {
                let client = EvmClient::for_chain(descriptor)?.with_timeout(config.rpc_timeout());
                readers.insert(descriptor.chain_id, Arc::new(client));
            }
        }

        let ledger = readers.values().fold(
            PurchaseLedger::new(registry.clone(), config.ledger.clone()),
            |ledger, reader| ledger.with_reader(reader.clone()),
        );

        let session = match self.wallet {
            Some(provider) => Some(WalletSession::new(provider, config.security.blocklist()?)),
            None => None,
        };
        let notifier = WebhookNotifier::new(&config.webhook)?;

        Ok(PresaleClient {
            config,
            registry,
            readers,
            session,
            tracker: TransactionTracker::new(),
            ledger: Arc::new(ledger),
            notifier,
        })
    }
}

impl Default for PresaleClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
