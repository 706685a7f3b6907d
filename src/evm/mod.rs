/// EVM protocol support
///
/// - `codec`: typed ABI encoding/decoding for every contract call and event
/// - `abi`: interface JSON registry used to validate the codec
/// - `client`: direct JSON-RPC reads independent of the wallet
/// - `types`: payment tokens, gas tiers, unit conversion
pub mod abi;
pub mod client;
pub mod codec;
pub mod types;

pub use abi::AbiRegistry;
pub use client::{ChainReader, EvmClient};
pub use types::{GasFeeTier, PaymentToken};
