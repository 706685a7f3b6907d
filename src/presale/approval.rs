//! ERC-20 allowance checks and approvals
//!
//! Allowance is read fresh on every check; another dapp or the user may
//! change it at any time.

use crate::error::Error;
use crate::evm::codec;
use crate::evm::types::PaymentToken;
use crate::presale::receipt::{
    submission_error, PendingTransaction, ReceiptPoller, TransactionKind,
};
use crate::wallet::provider::TransactionCall;
use crate::wallet::WalletSession;
use alloy_primitives::{Address, U256};
use tracing::{debug, info, warn};

/// Allowance observed in one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalState {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    pub allowance: U256,
}

impl ApprovalState {
    pub fn sufficient_for(&self, amount: U256) -> bool {
        self.allowance >= amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Nothing was submitted
    AlreadySufficient(ApprovalState),
    Approved {
        state: ApprovalState,
        transaction: PendingTransaction,
    },
}

impl ApprovalOutcome {
    pub fn state(&self) -> &ApprovalState {
        match self {
            ApprovalOutcome::AlreadySufficient(state) => state,
            ApprovalOutcome::Approved { state, .. } => state,
        }
    }

    pub fn submitted(&self) -> bool {
        matches!(self, ApprovalOutcome::Approved { .. })
    }
}

pub struct ApprovalManager {
    session: WalletSession,
    poller: ReceiptPoller,
    /// Approval size in whole payment-token units
    ceiling_tokens: u64,
}

impl ApprovalManager {
    pub fn new(session: WalletSession, poller: ReceiptPoller, ceiling_tokens: u64) -> Self {
        Self {
            session,
            poller,
            ceiling_tokens,
        }
    }

    /// Current allowance of `spender` over `owner`'s `token`
    pub async fn check_allowance(
        &self,
        owner: Address,
        spender: Address,
        token: Address,
    ) -> Result<U256, Error> {
        let raw = self
            .session
            .client()
            .call(token, codec::encode_allowance(owner, spender))
            .await?;
        let allowance = codec::decode_uint256(&raw)?;
        debug!(%owner, %spender, %token, %allowance, "Allowance read");
        Ok(allowance)
    }

    pub async fn approval_state(
        &self,
        owner: Address,
        spender: Address,
        token: Address,
    ) -> Result<ApprovalState, Error> {
        Ok(ApprovalState {
            token,
            owner,
            spender,
            allowance: self.check_allowance(owner, spender, token).await?,
        })
    }

    /// Approval size: the configured ceiling, or `min_amount` if that is larger
    pub fn approval_amount(&self, token: &PaymentToken, min_amount: U256) -> U256 {
        let ceiling = U256::from(self.ceiling_tokens)
            .saturating_mul(U256::from(10u64).pow(U256::from(token.decimals)));
        ceiling.max(min_amount)
    }

    /// Make sure `spender` may pull at least `min_amount` of `token`.
    ///
    /// Submits at most one approval and waits for its confirmation. Native
    /// payment tokens need no approval. Failures are not retried.
    pub async fn ensure_approved(
        &self,
        owner: Address,
        spender: Address,
        token: &PaymentToken,
        min_amount: U256,
    ) -> Result<ApprovalOutcome, Error> {
        let Some(token_address) = token.address else {
            return Ok(ApprovalOutcome::AlreadySufficient(ApprovalState {
                token: Address::ZERO,
                owner,
                spender,
                allowance: U256::MAX,
            }));
        };

        let state = self.approval_state(owner, spender, token_address).await?;
        if state.sufficient_for(min_amount) {
            debug!(token = %token.symbol, "Allowance already sufficient");
            return Ok(ApprovalOutcome::AlreadySufficient(state));
        }

        let chain_id = self
            .session
            .chain_id()
            .await
            .ok_or_else(|| Error::Connection("Wallet is not connected".to_string()))?;
        let amount = self.approval_amount(token, min_amount);
        let call = TransactionCall {
            from: owner,
            to: token_address,
            value: U256::ZERO,
            data: codec::encode_approve(spender, amount),
            gas: None,
        };

        let hash = self
            .session
            .client()
            .send_transaction(&call)
            .await
            .map_err(submission_error)?;
        info!(%hash, token = %token.symbol, %amount, "Approval submitted");

        let pending = PendingTransaction::new(hash, TransactionKind::Approve, chain_id);
        self.poller.tracker().track(pending.clone());
        let epoch = self.session.epoch().await;
        let transaction = self.poller.wait_for(pending, &epoch).await?;

        let state = self.approval_state(owner, spender, token_address).await?;
        if !state.sufficient_for(min_amount) {
            warn!(
                %hash,
                token = %token.symbol,
                allowance = %state.allowance,
                "Confirmed approval left allowance short"
            );
            return Err(Error::InsufficientAllowance {
                required: min_amount,
                current: state.allowance,
            });
        }
        Ok(ApprovalOutcome::Approved { state, transaction })
    }
}
