//! Order types for the keeper.
//!
//! This module defines the raw, undecoded order payloads found on chain, their
//! decoded limit-order form, and the life-cycle state every tracked order moves
//! through between discovery and settlement.

use alloy::primitives::{address, hex, keccak256, Address, Bytes, B256, U256};
use std::fmt;

/// Pseudo-address the order book uses for native ETH as a trade asset.
pub const ETH_ADDRESS: Address = address!("0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

/// Undecoded order payload as found on chain.
///
/// Either the `_data` field of a `DepositETH` event or the full input of a
/// token transfer transaction carrying an order suffix. Two raw orders are the
/// same order exactly when their bytes are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawOrder(Bytes);

impl RawOrder {
	pub fn new(bytes: impl Into<Bytes>) -> Self {
		Self(bytes.into())
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Stable identifier derived from the payload bytes.
	pub fn id(&self) -> OrderId {
		OrderId(keccak256(&self.0))
	}

	/// Lowercase `0x`-prefixed hex form, used for checkpoints.
	pub fn to_hex(&self) -> String {
		hex::encode_prefixed(&self.0)
	}
}

impl From<Bytes> for RawOrder {
	fn from(bytes: Bytes) -> Self {
		Self(bytes)
	}
}

impl From<Vec<u8>> for RawOrder {
	fn from(bytes: Vec<u8>) -> Self {
		Self(Bytes::from(bytes))
	}
}

/// keccak256 digest of a raw order's bytes.
///
/// Kept for settled orders instead of the full payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderId(pub B256);

impl fmt::Display for OrderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// 0x + first 8 hex chars is plenty for log lines
		write!(f, "0x{}..", hex::encode(&self.0[..4]))
	}
}

/// How the order's sell side was funded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
	/// ETH deposited into the order book through `depositETH`.
	EthSell,
	/// Tokens transferred to the order's vault with the order appended.
	TokenSell,
}

/// A decoded limit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOrder {
	pub kind: OrderKind,
	pub sell_asset: Address,
	pub buy_asset: Address,
	/// Minimum amount of `buy_asset` the owner accepts.
	pub min_return: U256,
	/// Reward paid to the executing account.
	pub fee: U256,
	pub owner: Address,
	/// Recipient of the token transfer, for token-sell orders.
	pub vault: Option<Address>,
	/// Amount transferred to the vault, for token-sell orders.
	pub amount: Option<U256>,
}

/// Receipt of a fill transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillReceipt {
	pub tx_hash: B256,
	pub block_number: Option<u64>,
	/// Whether the transaction executed without reverting.
	pub success: bool,
}

/// Life-cycle state of a tracked order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderState {
	Observed,
	Decoded,
	/// Undecodable payload; never looked at again.
	Skipped,
	Open,
	/// No longer exists on chain (filled elsewhere or cancelled).
	Closed,
	Ready,
	NotReady,
	Filled,
	/// Last fill attempt failed; re-evaluated next cycle.
	Failed,
}

impl OrderState {
	/// States after which the order is never evaluated again.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Closed | Self::Filled | Self::Skipped)
	}

	/// States that go through the open filter at the start of a cycle.
	///
	/// `Ready` is included: an order is only `Ready` at the start of a cycle
	/// if the previous cycle was cancelled before its fill returned.
	pub fn awaits_open_check(&self) -> bool {
		matches!(
			self,
			Self::Decoded | Self::Open | Self::Ready | Self::NotReady | Self::Failed
		)
	}

	pub fn can_transition_to(&self, next: OrderState) -> bool {
		use OrderState::*;
		match (self, next) {
			(Observed, Decoded) | (Observed, Skipped) => true,
			(Decoded | Open | Ready | NotReady | Failed, Open | Closed) => true,
			(Open, Ready) | (Open, NotReady) => true,
			(Ready, Filled) | (Ready, Failed) => true,
			_ => false,
		}
	}
}

impl fmt::Display for OrderState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Observed => "Observed",
			Self::Decoded => "Decoded",
			Self::Skipped => "Skipped",
			Self::Open => "Open",
			Self::Closed => "Closed",
			Self::Ready => "Ready",
			Self::NotReady => "NotReady",
			Self::Filled => "Filled",
			Self::Failed => "Failed",
		};
		write!(f, "{}", name)
	}
}
