//! Purchase submission
//!
//! A purchase is its own wallet confirmation, separate from any approval.
//! An approved-but-not-purchased state is valid; the buyer simply calls
//! [`PurchaseExecutor::buy`] again.

use crate::config::chains::ChainRegistry;
use crate::error::Error;
use crate::evm::codec;
use crate::evm::types::utils::parse_units;
use crate::evm::types::{PaymentToken, SALE_TOKEN_DECIMALS};
use crate::presale::approval::ApprovalManager;
use crate::presale::ledger::{PurchaseLedger, PurchaseSummary};
use crate::presale::pricing::{PricingEngine, Quote};
use crate::presale::progress::SaleProgressMonitor;
use crate::presale::receipt::{
    submission_error, PendingTransaction, ReceiptPoller, TransactionKind, TransactionStatus,
};
use crate::wallet::provider::TransactionCall;
use crate::wallet::WalletSession;
use alloy_primitives::{Address, B256, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a confirmed purchase
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub buyer: Address,
    pub transaction: PendingTransaction,
    pub quote: Quote,
    /// Refreshed history, when a ledger is attached and the refresh succeeded
    pub summary: Option<PurchaseSummary>,
}

pub struct PurchaseExecutor {
    session: WalletSession,
    registry: Arc<ChainRegistry>,
    selected_chain_id: u64,
    pricing: PricingEngine,
    approvals: Arc<ApprovalManager>,
    poller: ReceiptPoller,
    ledger: Option<Arc<PurchaseLedger>>,
    /// Canonical sold counter; without it quotes use the engine's own position
    progress: Option<Arc<SaleProgressMonitor>>,
}

impl PurchaseExecutor {
    pub fn new(
        session: WalletSession,
        registry: Arc<ChainRegistry>,
        selected_chain_id: u64,
        pricing: PricingEngine,
        approvals: Arc<ApprovalManager>,
        poller: ReceiptPoller,
    ) -> Self {
        Self {
            session,
            registry,
            selected_chain_id,
            pricing,
            approvals,
            poller,
            ledger: None,
            progress: None,
        }
    }

    /// Refresh this ledger after every confirmed purchase
    pub fn with_ledger(mut self, ledger: Arc<PurchaseLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Price every purchase at the tier for the current on-chain sold counter
    pub fn with_progress(mut self, progress: Arc<SaleProgressMonitor>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn selected_chain_id(&self) -> u64 {
        self.selected_chain_id
    }

    pub fn select_chain(&mut self, chain_id: u64) -> Result<(), Error> {
        self.registry.get(chain_id)?;
        self.selected_chain_id = chain_id;
        Ok(())
    }

    pub fn pricing_mut(&mut self) -> &mut PricingEngine {
        &mut self.pricing
    }

    /// Buy `token_amount` whole tokens paying with `payment_token`
    pub async fn buy(
        &self,
        token_amount: u128,
        payment_token: &PaymentToken,
        holder_discount_eligible: bool,
    ) -> Result<PurchaseReceipt, Error> {
        let chain = self.registry.get(self.selected_chain_id)?;
        let buyer = self.session.require_chain(chain.chain_id).await?;
        let epoch = self.session.epoch().await;

        let token = chain.require_payment_token(&payment_token.symbol)?.clone();
        let quote = self
            .current_pricing()
            .await?
            .quote(token_amount, holder_discount_eligible, &token, chain)?;
        let presale = chain.presale_contract_address;

        if let Some(token_address) = token.address {
            let current = self
                .approvals
                .check_allowance(buyer, presale, token_address)
                .await?;
            if current < quote.payment_amount {
                return Err(Error::InsufficientAllowance {
                    required: quote.payment_amount,
                    current,
                });
            }
        }

        self.session.select_payment_token(token.clone()).await;
        match self.session.refresh_balances(buyer).await {
            Ok(state) => {
                if let Some(available) = state.balance_of(&token) {
                    if available < quote.payment_amount {
                        return Err(Error::InsufficientBalance {
                            required: quote.payment_amount,
                            available,
                        });
                    }
                }
            }
            Err(e) => warn!(%buyer, error = %e, "Balance check skipped"),
        }

        let units = parse_units(&token_amount.to_string(), SALE_TOKEN_DECIMALS)?;
        let mut call = TransactionCall {
            from: buyer,
            to: presale,
            value: if token.is_native() {
                quote.payment_amount
            } else {
                U256::ZERO
            },
            data: codec::encode_purchase(token.contract_argument(), units),
            gas: None,
        };

        match self.session.client().estimate_gas(&call).await {
            Ok(estimate) => call.gas = Some(chain.gas_fee_tier.apply(estimate)),
            Err(e) => warn!(error = %e, "Gas estimation failed, leaving gas to the wallet"),
        }

        // the wallet may have moved while we were reading
        if epoch.is_cancelled() {
            self.session.require_chain(chain.chain_id).await?;
            return Err(Error::Connection(
                "Wallet account changed before submission".to_string(),
            ));
        }

        let hash = self
            .session
            .client()
            .send_transaction(&call)
            .await
            .map_err(submission_error)?;
        info!(
            %hash,
            %buyer,
            chain_id = chain.chain_id,
            tokens = token_amount,
            payment = %token.symbol,
            "Purchase submitted"
        );

        let pending = PendingTransaction::new(hash, TransactionKind::Purchase, chain.chain_id);
        self.poller.tracker().track(pending.clone());
        let transaction = self.poller.wait_for(pending, &epoch).await?;

        let summary = self.refresh_ledger(buyer, chain.chain_id).await;
        Ok(PurchaseReceipt {
            buyer,
            transaction,
            quote,
            summary,
        })
    }

    /// Poll again for a purchase whose confirmation previously timed out or was cancelled
    pub async fn resume_confirmation(&self, hash: B256) -> Result<PendingTransaction, Error> {
        let tx = self
            .poller
            .tracker()
            .get(&hash)
            .ok_or(Error::UntrackedTransaction { hash })?;
        if tx.status != TransactionStatus::TimedOut && tx.status != TransactionStatus::Pending {
            return Ok(tx);
        }

        info!(%hash, "Resuming confirmation polling");
        let epoch = self.session.epoch().await;
        let confirmed = self.poller.wait_for(tx, &epoch).await?;

        if confirmed.kind == TransactionKind::Purchase {
            if let Some(buyer) = self.session.address().await {
                self.refresh_ledger(buyer, confirmed.chain_id).await;
            }
        }
        Ok(confirmed)
    }

    /// Pricing engine positioned at the live sold counter
    async fn current_pricing(&self) -> Result<PricingEngine, Error> {
        let Some(progress) = &self.progress else {
            return Ok(self.pricing.clone());
        };
        let sold = progress.fetch_sold_position().await?;
        debug!(sold, "Quoting against on-chain sold position");
        Ok(self.pricing.clone().with_sold_position(sold))
    }

    pub fn unresolved_transactions(&self) -> Vec<PendingTransaction> {
        self.poller.tracker().unresolved()
    }

    async fn refresh_ledger(&self, buyer: Address, chain_id: u64) -> Option<PurchaseSummary> {
        let ledger = self.ledger.as_ref()?;
        match ledger.fetch_summary(buyer, chain_id).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(%buyer, chain_id, error = %e, "Ledger refresh after purchase failed");
                None
            }
        }
    }
}
