/// Typed ABI codec for every contract call and event the SDK touches
///
/// All call sites encode and decode through this module; selectors and the
/// event topic come from the `sol!` interface definitions below and are
/// cross-checked against the bundled ABI JSON by [`crate::evm::abi`].
use crate::error::Error;
use crate::presale::ledger::PurchaseEvent;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::{sol, SolCall, SolEvent};

sol! {
    #[derive(Debug)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);

        event Approval(address indexed owner, address indexed spender, uint256 value);
    }
}

sol! {
    #[derive(Debug)]
    interface IERC721 {
        function balanceOf(address owner) external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
    }
}

sol! {
    #[derive(Debug)]
    interface IPresale {
        event TokensPurchased(
            address indexed buyer,
            uint256 tokenAmount,
            uint256 cost,
            uint256 costUsd,
            uint8 phase,
            bool isGenesisDiscount
        );

        function buyTokens(address paymentToken, uint256 tokenAmount) external payable;
        function totalTokensSold() external view returns (uint256);
        function currentPhase() external view returns (uint8);
    }
}

/// Size of one ABI word
pub const WORD: usize = 32;

// ========== Encoding ==========

pub fn encode_erc20_balance_of(account: Address) -> Bytes {
    IERC20::balanceOfCall { account }.abi_encode().into()
}

pub fn encode_erc20_decimals() -> Bytes {
    IERC20::decimalsCall {}.abi_encode().into()
}

pub fn encode_allowance(owner: Address, spender: Address) -> Bytes {
    IERC20::allowanceCall { owner, spender }.abi_encode().into()
}

pub fn encode_approve(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

pub fn encode_nft_balance_of(owner: Address) -> Bytes {
    IERC721::balanceOfCall { owner }.abi_encode().into()
}

/// Purchase calldata: selector followed by `(paymentToken, tokenAmount)` as 32-byte words
pub fn encode_purchase(payment_token: Address, token_amount: U256) -> Bytes {
    IPresale::buyTokensCall {
        paymentToken: payment_token,
        tokenAmount: token_amount,
    }
    .abi_encode()
    .into()
}

pub fn encode_total_tokens_sold() -> Bytes {
    IPresale::totalTokensSoldCall {}.abi_encode().into()
}

// ========== Decoding ==========

/// Read the `index`-th 32-byte word of an ABI payload as a uint256
pub fn decode_word_u256(data: &[u8], index: usize) -> Result<U256, Error> {
    let start = index * WORD;
    let word = data.get(start..start + WORD).ok_or_else(|| {
        Error::Abi(format!(
            "Payload of {} bytes has no word at index {}",
            data.len(),
            index
        ))
    })?;
    Ok(U256::from_be_slice(word))
}

/// Decode a single-uint256 return value (`balanceOf`, `allowance`, `totalTokensSold`)
pub fn decode_uint256(data: &[u8]) -> Result<U256, Error> {
    decode_word_u256(data, 0)
}

pub fn decode_decimals(data: &[u8]) -> Result<u8, Error> {
    let value = decode_uint256(data)?;
    u8::try_from(value).map_err(|_| Error::Abi(format!("decimals() returned {}", value)))
}

// ========== Events ==========

/// Topic 0 of the `TokensPurchased` event
pub fn purchase_topic() -> B256 {
    IPresale::TokensPurchased::SIGNATURE_HASH
}

/// Indexed-address topic encoding (address left-padded to 32 bytes)
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

/// Decode a `TokensPurchased` log positionally.
///
/// The buyer comes from topic 1; the data payload carries, in order,
/// token amount, payment cost, USD cost, phase and the genesis-discount flag.
pub fn decode_purchase_log(log: &Log) -> Result<PurchaseEvent, Error> {
    let topics = log.topics();
    match topics.first() {
        Some(topic) if *topic == purchase_topic() => {}
        Some(topic) => {
            return Err(Error::Abi(format!(
                "Log topic {} is not TokensPurchased",
                topic
            )))
        }
        None => return Err(Error::Abi("Log has no topics".to_string())),
    }
    let buyer_topic = topics
        .get(1)
        .ok_or_else(|| Error::Abi("TokensPurchased log missing buyer topic".to_string()))?;
    let buyer = Address::from_word(*buyer_topic);

    let data = &log.data().data;
    let token_amount = decode_word_u256(data, 0)?;
    let cost_in_payment_units = decode_word_u256(data, 1)?;
    let cost_usd = decode_word_u256(data, 2)?;
    let phase = u8::try_from(decode_word_u256(data, 3)?)
        .map_err(|_| Error::Abi("phase does not fit in uint8".to_string()))?;
    let is_genesis_discount = !decode_word_u256(data, 4)?.is_zero();

    Ok(PurchaseEvent {
        buyer,
        token_amount,
        cost_in_payment_units,
        cost_usd,
        phase,
        is_genesis_discount,
        block_number: log.block_number,
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
    })
}

/// Four-byte selectors of every function the SDK calls, by canonical signature
pub fn known_selectors() -> Vec<(&'static str, [u8; 4])> {
    vec![
        (IERC20::decimalsCall::SIGNATURE, IERC20::decimalsCall::SELECTOR),
        (IERC20::balanceOfCall::SIGNATURE, IERC20::balanceOfCall::SELECTOR),
        (IERC20::allowanceCall::SIGNATURE, IERC20::allowanceCall::SELECTOR),
        (IERC20::approveCall::SIGNATURE, IERC20::approveCall::SELECTOR),
        (IERC721::ownerOfCall::SIGNATURE, IERC721::ownerOfCall::SELECTOR),
        (IPresale::buyTokensCall::SIGNATURE, IPresale::buyTokensCall::SELECTOR),
        (
            IPresale::totalTokensSoldCall::SIGNATURE,
            IPresale::totalTokensSoldCall::SELECTOR,
        ),
        (
            IPresale::currentPhaseCall::SIGNATURE,
            IPresale::currentPhaseCall::SELECTOR,
        ),
    ]
}
