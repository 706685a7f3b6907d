//! Transaction confirmation polling
//!
//! Receipts are polled at a fixed interval for a bounded number of attempts.
//! Running out of attempts only means confirmation was not observed; the
//! transaction stays tracked as `TimedOut` and can be polled again later.

use crate::error::Error;
use crate::wallet::provider::{codes, ProviderClient};
use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receipt polling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Longest time a single confirmation wait can take
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Approve,
    Purchase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Reverted,
    /// Confirmation budget exhausted; outcome unknown
    TimedOut,
}

/// A submitted transaction awaiting (or past) confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTransaction {
    pub hash: B256,
    pub kind: TransactionKind,
    pub chain_id: u64,
    pub submitted_at: DateTime<Utc>,
    pub status: TransactionStatus,
    pub block_number: Option<u64>,
}

impl PendingTransaction {
    pub fn new(hash: B256, kind: TransactionKind, chain_id: u64) -> Self {
        Self {
            hash,
            kind,
            chain_id,
            submitted_at: Utc::now(),
            status: TransactionStatus::Pending,
            block_number: None,
        }
    }

    /// Confirmed and reverted are final; timed-out is not
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Confirmed | TransactionStatus::Reverted
        )
    }
}

/// Transactions not yet known to be final
#[derive(Debug, Clone, Default)]
pub struct TransactionTracker {
    inner: Arc<Mutex<HashMap<B256, PendingTransaction>>>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, tx: PendingTransaction) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(tx.hash, tx);
    }

    /// Record a status; terminal transactions are dropped from tracking
    pub fn update(&self, tx: &PendingTransaction) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if tx.is_terminal() {
            map.remove(&tx.hash);
        } else {
            map.insert(tx.hash, tx.clone());
        }
    }

    pub fn get(&self, hash: &B256) -> Option<PendingTransaction> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(hash).cloned()
    }

    /// Tracked transactions, oldest first
    pub fn unresolved(&self) -> Vec<PendingTransaction> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut txs: Vec<PendingTransaction> = map.values().cloned().collect();
        txs.sort_by_key(|tx| tx.submitted_at);
        txs
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Polls the wallet provider for receipts
#[derive(Clone)]
pub struct ReceiptPoller {
    client: ProviderClient,
    policy: PollPolicy,
    tracker: TransactionTracker,
}

impl ReceiptPoller {
    pub fn new(client: ProviderClient, policy: PollPolicy, tracker: TransactionTracker) -> Self {
        Self {
            client,
            policy,
            tracker,
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn tracker(&self) -> &TransactionTracker {
        &self.tracker
    }

    /// Wait for `tx` to be mined.
    ///
    /// Each attempt sleeps one interval first, then looks the receipt up.
    /// Cancelling `cancel` aborts the wait and leaves the transaction pending.
    pub async fn wait_for(
        &self,
        mut tx: PendingTransaction,
        cancel: &CancellationToken,
    ) -> Result<PendingTransaction, Error> {
        let hash = tx.hash;
        tx.status = TransactionStatus::Pending;
        self.tracker.update(&tx);

        for attempt in 1..=self.policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(%hash, attempt, "Confirmation polling cancelled");
                    return Err(Error::Cancelled { hash });
                }
                _ = tokio::time::sleep(self.policy.interval) => {}
            }

            match self.client.transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    tx.block_number = receipt.block_number;
                    if receipt.success {
                        tx.status = TransactionStatus::Confirmed;
                        self.tracker.update(&tx);
                        info!(%hash, attempt, block = ?receipt.block_number, "Transaction confirmed");
                        return Ok(tx);
                    }
                    tx.status = TransactionStatus::Reverted;
                    self.tracker.update(&tx);
                    warn!(%hash, "Transaction reverted");
                    return Err(Error::TransactionReverted { hash });
                }
                Ok(None) => debug!(%hash, attempt, "Receipt not available yet"),
                Err(e) => debug!(%hash, attempt, error = %e, "Receipt lookup failed"),
            }
        }

        tx.status = TransactionStatus::TimedOut;
        self.tracker.update(&tx);
        warn!(
            %hash,
            attempts = self.policy.max_attempts,
            "Confirmation not observed within polling budget"
        );
        Err(Error::TransactionTimeout {
            hash,
            attempts: self.policy.max_attempts,
        })
    }
}

/// Map a submission failure; a user rejection becomes `TransactionRejected`
pub(crate) fn submission_error(err: Error) -> Error {
    match err {
        Error::Provider(e) if e.code == codes::USER_REJECTED => {
            Error::TransactionRejected(e.message)
        }
        other => other,
    }
}
