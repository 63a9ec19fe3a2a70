//! Remote ledger types.
//!
//! The keeper treats the chain as an indexed log of blocks that can be queried
//! by range. [`LedgerInterface`] is the only door to it; every implementation
//! reports failures as [`LedgerError`] so callers can tell transient failures
//! from the result-size limit that range queries run into.

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub type BlockNumber = u64;

/// Event families the keeper scans for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// `DepositETH(bytes32,address,uint256,bytes)` on the order book.
	DepositEth,
	/// ERC-20 `Transfer(address,address,uint256)`.
	Transfer,
}

/// Filter for a range query: one event family emitted by one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventQuery {
	pub address: Address,
	pub kind: EventKind,
}

impl EventQuery {
	pub fn deposits(order_book: Address) -> Self {
		Self {
			address: order_book,
			kind: EventKind::DepositEth,
		}
	}

	pub fn transfers(token: Address) -> Self {
		Self {
			address: token,
			kind: EventKind::Transfer,
		}
	}
}

/// A matched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
	pub block_number: BlockNumber,
	pub transaction_hash: B256,
	pub log_index: u64,
	/// Decoded `_data` payload for `DepositETH`; empty for `Transfer`.
	pub payload: Bytes,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
	/// The remote refused a range query because it would return too many results.
	#[error("Result limit exceeded: {0}")]
	ResultLimit(String),
	#[error("Transport error: {0}")]
	Transport(String),
	#[error("RPC error {code}: {message}")]
	Rpc { code: i64, message: String },
	#[error("Call timed out after {0:?}")]
	Timeout(Duration),
	/// A transaction referenced by an event is not visible on the node yet.
	#[error("Transaction not found: {0}")]
	MissingTransaction(B256),
	#[error("Malformed response: {0}")]
	Decode(String),
}

impl LedgerError {
	/// Whether repeating the same call may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::Transport(_) | Self::Rpc { .. } | Self::Timeout(_) | Self::MissingTransaction(_)
		)
	}

	pub fn is_result_limit(&self) -> bool {
		matches!(self, Self::ResultLimit(_))
	}
}

/// Read access to the ledger and the exchange contracts.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Latest block number known to the node.
	async fn block_number(&self) -> Result<BlockNumber, LedgerError>;

	/// Number of tokens registered in the exchange factory.
	async fn token_count(&self) -> Result<u64, LedgerError>;

	/// Token address registered under `index` in the exchange factory.
	async fn token_at_index(&self, index: u64) -> Result<Address, LedgerError>;

	/// Events matching `query` in the inclusive block range `[from, to]`,
	/// in ascending block order.
	async fn get_events(
		&self,
		query: &EventQuery,
		from: BlockNumber,
		to: BlockNumber,
	) -> Result<Vec<LedgerEvent>, LedgerError>;

	/// Input data of the transaction with the given hash.
	async fn transaction_input(&self, hash: B256) -> Result<Bytes, LedgerError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_retry_classes() {
		assert!(LedgerError::Transport("reset".into()).is_retryable());
		assert!(LedgerError::Timeout(Duration::from_secs(1)).is_retryable());
		assert!(LedgerError::Rpc {
			code: -32000,
			message: "header not found".into()
		}
		.is_retryable());
		assert!(LedgerError::MissingTransaction(B256::ZERO).is_retryable());

		assert!(!LedgerError::ResultLimit("more than 10000 results".into()).is_retryable());
		assert!(!LedgerError::Decode("bad abi".into()).is_retryable());
	}

	#[test]
	fn test_query_constructors() {
		let book = Address::repeat_byte(1);
		let token = Address::repeat_byte(2);

		assert_eq!(EventQuery::deposits(book).kind, EventKind::DepositEth);
		assert_eq!(EventQuery::deposits(book).address, book);
		assert_eq!(EventQuery::transfers(token).kind, EventKind::Transfer);
	}
}
