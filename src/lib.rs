pub mod client;
pub mod config;
pub mod error;
pub mod evm;
pub mod logging;
pub mod notify;
pub mod presale;
pub mod wallet;

// Main client exports
pub use client::{PresaleClient, PresaleClientBuilder};
pub use config::{ChainDescriptor, ChainRegistry, PresaleConfig};
pub use error::Error;
pub use logging::init_tracing;

// Wallet exports
pub use wallet::{
    Blocklist, ChainSwitcher, ConnectionStatus, ProviderError, SessionEvent, SwitchOutcome,
    WalletProvider, WalletSession, WalletState,
};

// Presale exports
pub use presale::{
    ApprovalManager, ApprovalOutcome, BuyerSnapshot, PendingTransaction, PricingEngine,
    PurchaseEvent, PurchaseExecutor, PurchaseLedger, PurchaseSummary, Quote, SaleProgress,
    SaleProgressMonitor, TransactionStatus,
};

// EVM exports
pub use evm::{AbiRegistry, ChainReader, EvmClient, GasFeeTier, PaymentToken};

// Re-export common primitive types
pub use alloy_primitives::{Address, B256, U256};
pub use bigdecimal::BigDecimal;
