//! Wallet session management
//!
//! [`WalletSession`] is the connection state machine over an injected
//! [`WalletProvider`]: `Disconnected → Connecting → Connected`, back to
//! `Disconnected` on an empty `accountsChanged`, a provider `disconnect`, or an
//! explicit [`WalletSession::disconnect`].
//!
//! Each connection owns a listener task holding the provider subscriptions;
//! the task (and with it every subscription) ends when the session
//! disconnects or is dropped. A separate epoch [`CancellationToken`] is
//! replaced on every account or chain change so in-flight work started under
//! the old identity can be aborted.

pub mod blocklist;
pub mod provider;
pub mod switcher;

pub use blocklist::Blocklist;
pub use provider::{
    ListenerRegistry, ProviderClient, ProviderError, ProviderEvent, ProviderEventKind,
    Subscription, WalletProvider,
};
pub use switcher::{ChainSwitcher, SwitchOutcome};

use crate::error::Error;
use crate::evm::codec;
use crate::evm::types::PaymentToken;
use alloy_primitives::{Address, U256};
use provider::codes;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of the connected wallet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletState {
    pub address: Option<Address>,
    pub chain_id: Option<u64>,
    pub native_balance: U256,
    /// Token contract → balance in base units
    pub erc20_balances: HashMap<Address, U256>,
}

impl WalletState {
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.chain_id.is_none()
    }

    /// Balance of a payment token (native or ERC-20), if known
    pub fn balance_of(&self, token: &PaymentToken) -> Option<U256> {
        match token.address {
            None => Some(self.native_balance),
            Some(address) => self.erc20_balances.get(&address).copied(),
        }
    }
}

/// Notifications for the host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { address: Address, chain_id: u64 },
    AccountChanged { address: Address },
    /// The wallet moved to another chain; dependent state must be rebuilt
    ReloadRequired { chain_id: u64 },
    Disconnected,
}

struct SessionInner {
    status: ConnectionStatus,
    state: WalletState,
    payment_token: Option<PaymentToken>,
    epoch: CancellationToken,
    listener: Option<(CancellationToken, JoinHandle<()>)>,
}

struct Shared {
    client: ProviderClient,
    blocklist: Blocklist,
    inner: RwLock<SessionInner>,
    events: broadcast::Sender<SessionEvent>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        inner.epoch.cancel();
        if let Some((token, _)) = inner.listener.take() {
            token.cancel();
        }
    }
}

/// Connection state machine over an injected wallet provider
#[derive(Clone)]
pub struct WalletSession {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession").finish_non_exhaustive()
    }
}

impl WalletSession {
    pub fn new(provider: Arc<dyn WalletProvider>, blocklist: Blocklist) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                client: ProviderClient::new(provider),
                blocklist,
                inner: RwLock::new(SessionInner {
                    status: ConnectionStatus::Disconnected,
                    state: WalletState::default(),
                    payment_token: None,
                    epoch: CancellationToken::new(),
                    listener: None,
                }),
                events,
            }),
        }
    }

    /// Build a session from a possibly-absent provider
    pub fn detect(
        provider: Option<Arc<dyn WalletProvider>>,
        blocklist: Blocklist,
    ) -> Result<Self, Error> {
        provider
            .map(|p| Self::new(p, blocklist))
            .ok_or_else(|| Error::Connection("No wallet provider detected".to_string()))
    }

    pub fn client(&self) -> &ProviderClient {
        &self.shared.client
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.shared.inner.read().await.status
    }

    pub async fn state(&self) -> WalletState {
        self.shared.inner.read().await.state.clone()
    }

    pub async fn address(&self) -> Option<Address> {
        self.shared.inner.read().await.state.address
    }

    pub async fn chain_id(&self) -> Option<u64> {
        self.shared.inner.read().await.state.chain_id
    }

    /// Token cancelled on the next account change, chain change or disconnect
    pub async fn epoch(&self) -> CancellationToken {
        self.shared.inner.read().await.epoch.clone()
    }

    pub async fn payment_token(&self) -> Option<PaymentToken> {
        self.shared.inner.read().await.payment_token.clone()
    }

    /// Select the currency used for purchases and balance refreshes
    pub async fn select_payment_token(&self, token: PaymentToken) {
        self.shared.inner.write().await.payment_token = Some(token);
    }

    /// Connected account, provided the wallet is on `expected_chain`
    pub async fn require_chain(&self, expected_chain: u64) -> Result<Address, Error> {
        let inner = self.shared.inner.read().await;
        let address = match (inner.status, inner.state.address) {
            (ConnectionStatus::Connected, Some(address)) => address,
            _ => return Err(Error::Connection("Wallet is not connected".to_string())),
        };
        if inner.state.chain_id != Some(expected_chain) {
            return Err(Error::NetworkMismatch {
                expected: expected_chain,
                connected: inner.state.chain_id,
            });
        }
        Ok(address)
    }

    /// Request account access from the wallet.
    ///
    /// Already connected sessions return their current state without prompting.
    pub async fn connect(&self) -> Result<WalletState, Error> {
        {
            let mut inner = self.shared.inner.write().await;
            match inner.status {
                ConnectionStatus::Connected => return Ok(inner.state.clone()),
                ConnectionStatus::Connecting => {
                    return Err(Error::Connection(
                        "A connection request is already in progress".to_string(),
                    ))
                }
                ConnectionStatus::Disconnected => inner.status = ConnectionStatus::Connecting,
            }
        }

        let result = async {
            let accounts = self
                .shared
                .client
                .request_accounts()
                .await
                .map_err(connection_error)?;
            let address = *accounts
                .first()
                .ok_or_else(|| Error::Connection("Wallet returned no accounts".to_string()))?;
            self.shared.blocklist.check(&address)?;
            let chain_id = self.shared.client.chain_id().await?;
            Ok::<_, Error>((address, chain_id))
        }
        .await;

        match result {
            Ok((address, chain_id)) => self.establish(address, chain_id).await,
            Err(e) => {
                let mut inner = self.shared.inner.write().await;
                if inner.status == ConnectionStatus::Connecting {
                    inner.status = ConnectionStatus::Disconnected;
                }
                Err(e)
            }
        }
    }

    /// Resume a previously authorized connection without prompting.
    ///
    /// Returns `None` when the wallet has no authorized accounts.
    pub async fn restore(&self) -> Result<Option<WalletState>, Error> {
        if self.status().await == ConnectionStatus::Connected {
            return Ok(Some(self.state().await));
        }
        let accounts = self.shared.client.accounts().await?;
        let Some(&address) = accounts.first() else {
            debug!("No previously authorized accounts");
            return Ok(None);
        };
        self.shared.blocklist.check(&address)?;
        let chain_id = self.shared.client.chain_id().await?;
        self.establish(address, chain_id).await.map(Some)
    }

    /// Disconnect and release every provider subscription
    pub async fn disconnect(&self) {
        let listener = self.clear().await;
        if let Some(task) = listener {
            if let Err(e) = task.await {
                warn!(error = %e, "Wallet listener task ended abnormally");
            }
        }
    }

    /// Fetch the native balance and, when an ERC-20 payment token is selected,
    /// its balance; results for an address that is no longer active are discarded
    pub async fn refresh_balances(&self, address: Address) -> Result<WalletState, Error> {
        let (epoch, token) = {
            let inner = self.shared.inner.read().await;
            (inner.epoch.clone(), inner.payment_token.clone())
        };
        let client = &self.shared.client;

        let native = client.get_balance(address);
        let erc20 = async {
            match token.and_then(|t| t.address) {
                Some(token_address) => {
                    let raw = client
                        .call(token_address, codec::encode_erc20_balance_of(address))
                        .await?;
                    Ok::<_, Error>(Some((token_address, codec::decode_uint256(&raw)?)))
                }
                None => Ok(None),
            }
        };
        let (native, erc20) = futures::join!(native, erc20);
        let (native, erc20) = (native?, erc20?);

        let mut inner = self.shared.inner.write().await;
        if epoch.is_cancelled() || inner.state.address != Some(address) {
            debug!(%address, "Discarding stale balance refresh");
            return Ok(inner.state.clone());
        }
        inner.state.native_balance = native;
        if let Some((token_address, balance)) = erc20 {
            inner.state.erc20_balances.insert(token_address, balance);
        }
        Ok(inner.state.clone())
    }

    async fn establish(&self, address: Address, chain_id: u64) -> Result<WalletState, Error> {
        if let Some(task) = self.take_listener().await {
            let _ = task.await;
        }

        let provider = self.shared.client.provider();
        let subscriptions = [
            provider.subscribe(ProviderEventKind::AccountsChanged),
            provider.subscribe(ProviderEventKind::ChainChanged),
            provider.subscribe(ProviderEventKind::Disconnect),
        ];
        let listener_token = CancellationToken::new();
        let task = tokio::spawn(listen(
            Arc::downgrade(&self.shared),
            subscriptions,
            listener_token.clone(),
        ));

        {
            let mut inner = self.shared.inner.write().await;
            inner.epoch.cancel();
            inner.epoch = CancellationToken::new();
            inner.state = WalletState {
                address: Some(address),
                chain_id: Some(chain_id),
                ..Default::default()
            };
            inner.status = ConnectionStatus::Connected;
            inner.listener = Some((listener_token, task));
        }

        info!(%address, chain_id, "Wallet connected");
        let _ = self
            .shared
            .events
            .send(SessionEvent::Connected { address, chain_id });

        match self.refresh_balances(address).await {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(%address, error = %e, "Initial balance refresh failed");
                Ok(self.state().await)
            }
        }
    }

    async fn take_listener(&self) -> Option<JoinHandle<()>> {
        let mut inner = self.shared.inner.write().await;
        inner.listener.take().map(|(token, task)| {
            token.cancel();
            task
        })
    }

    /// Reset to `Disconnected`; returns the listener task so callers outside it can await it
    async fn clear(&self) -> Option<JoinHandle<()>> {
        let (was_connected, listener) = {
            let mut inner = self.shared.inner.write().await;
            let was_connected = inner.status != ConnectionStatus::Disconnected;
            inner.epoch.cancel();
            inner.epoch = CancellationToken::new();
            inner.state = WalletState::default();
            inner.status = ConnectionStatus::Disconnected;
            let listener = inner.listener.take().map(|(token, task)| {
                token.cancel();
                task
            });
            (was_connected, listener)
        };

        if was_connected {
            info!("Wallet disconnected");
            let _ = self.shared.events.send(SessionEvent::Disconnected);
        }
        listener
    }

    async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    info!("Wallet reported no accounts");
                    self.clear().await;
                }
                Some(&address) => self.account_changed(address).await,
            },
            ProviderEvent::ChainChanged(chain_id) => self.chain_changed(chain_id).await,
            ProviderEvent::Disconnect => {
                self.clear().await;
            }
        }
    }

    async fn account_changed(&self, address: Address) {
        if self.shared.blocklist.check(&address).is_err() {
            self.clear().await;
            return;
        }
        {
            let mut inner = self.shared.inner.write().await;
            if inner.status != ConnectionStatus::Connected || inner.state.address == Some(address) {
                return;
            }
            inner.epoch.cancel();
            inner.epoch = CancellationToken::new();
            inner.state.address = Some(address);
            inner.state.native_balance = U256::ZERO;
            inner.state.erc20_balances.clear();
        }

        info!(%address, "Wallet account changed");
        let _ = self
            .shared
            .events
            .send(SessionEvent::AccountChanged { address });
        if let Err(e) = self.refresh_balances(address).await {
            warn!(%address, error = %e, "Balance refresh after account change failed");
        }
    }

    async fn chain_changed(&self, chain_id: u64) {
        {
            let mut inner = self.shared.inner.write().await;
            if inner.status != ConnectionStatus::Connected {
                return;
            }
            inner.epoch.cancel();
            inner.epoch = CancellationToken::new();
            inner.state.chain_id = Some(chain_id);
            inner.state.native_balance = U256::ZERO;
            inner.state.erc20_balances.clear();
        }

        info!(chain_id, "Wallet chain changed, reload required");
        let _ = self
            .shared
            .events
            .send(SessionEvent::ReloadRequired { chain_id });
    }
}

async fn listen(shared: Weak<Shared>, subscriptions: [Subscription; 3], token: CancellationToken) {
    let [mut accounts, mut chains, mut disconnects] = subscriptions;
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = accounts.recv() => event,
            event = chains.recv() => event,
            event = disconnects.recv() => event,
        };
        let Some(event) = event else { break };
        let Some(shared) = shared.upgrade() else { break };
        debug!(?event, "Provider event");
        WalletSession { shared }.handle_event(event).await;
    }
    debug!("Wallet listener stopped");
}

fn connection_error(err: Error) -> Error {
    match err {
        Error::Provider(e) if e.code == codes::USER_REJECTED => {
            Error::Connection("User rejected the connection request".to_string())
        }
        Error::Provider(e) if e.code == codes::REQUEST_PENDING => Error::Connection(
            "A connection request is already pending in the wallet".to_string(),
        ),
        Error::Provider(e) => Error::Connection(e.to_string()),
        other => other,
    }
}
