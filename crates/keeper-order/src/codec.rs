//! Decoding of UniswapEx order payloads.
//!
//! Orders reach the keeper in two shapes. ETH orders are the bare order
//! encoding emitted in `DepositETH`. Token orders are the input of an ERC-20
//! `transfer(vault, amount)` call with the order encoding appended as an
//! ABI `bytes` value. Either way the order encoding starts with
//! `(sellAsset, buyAsset, minReturn, fee, owner)`; anything after that is
//! ignored.

use crate::DecodeError;
use alloy::sol_types::SolValue;
use keeper_chain::contracts::{is_order_transaction, OrderData, ORDER_TX_SUFFIX_OFFSET};
use keeper_types::{Address, Bytes, LimitOrder, OrderKind, RawOrder, ETH_ADDRESS, U256};

/// Length of the leading order fields: five 32-byte words.
pub const ORDER_FIELDS_LEN: usize = 5 * 32;

pub fn decode_order(raw: &RawOrder) -> Result<LimitOrder, DecodeError> {
	let bytes = raw.as_bytes();

	if is_order_transaction(bytes) {
		decode_transfer(bytes)
	} else {
		let data = decode_fields(bytes)?;
		let kind = if data.sellAsset == ETH_ADDRESS {
			OrderKind::EthSell
		} else {
			OrderKind::TokenSell
		};
		Ok(to_order(kind, data, None, None))
	}
}

fn decode_transfer(input: &[u8]) -> Result<LimitOrder, DecodeError> {
	let (vault, amount) = <(Address, U256)>::abi_decode(&input[4..ORDER_TX_SUFFIX_OFFSET])
		.map_err(|e| DecodeError::Abi(format!("transfer arguments: {}", e)))?;

	let encoded = Bytes::abi_decode(&input[ORDER_TX_SUFFIX_OFFSET..])
		.map_err(|e| DecodeError::Abi(format!("order suffix: {}", e)))?;

	let data = decode_fields(&encoded)?;
	Ok(to_order(OrderKind::TokenSell, data, Some(vault), Some(amount)))
}

fn decode_fields(encoded: &[u8]) -> Result<OrderData, DecodeError> {
	if encoded.len() < ORDER_FIELDS_LEN {
		return Err(DecodeError::TooShort {
			len: encoded.len(),
			min: ORDER_FIELDS_LEN,
		});
	}

	OrderData::abi_decode(&encoded[..ORDER_FIELDS_LEN])
		.map_err(|e| DecodeError::Abi(format!("order fields: {}", e)))
}

fn to_order(
	kind: OrderKind,
	data: OrderData,
	vault: Option<Address>,
	amount: Option<U256>,
) -> LimitOrder {
	LimitOrder {
		kind,
		sell_asset: data.sellAsset,
		buy_asset: data.buyAsset,
		min_return: data.minReturn,
		fee: data.fee,
		owner: data.owner,
		vault,
		amount,
	}
}
