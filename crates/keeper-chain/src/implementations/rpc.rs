//! Ledger access over an alloy HTTP provider.
//!
//! [`AlloyLedger`] implements [`LedgerInterface`] against a JSON-RPC node:
//! factory reads go through the `IUniswapFactory` binding, range queries through
//! `eth_getLogs` and transaction bodies through `eth_getTransactionByHash`.
//! Node errors are classified so that range queries refused for returning too
//! many results surface as [`LedgerError::ResultLimit`].

use crate::contracts::{IERC20, IUniswapEx, IUniswapFactory};
use alloy::consensus::Transaction as _;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use alloy::transports::TransportError;
use async_trait::async_trait;
use keeper_types::{BlockNumber, EventKind, EventQuery, LedgerError, LedgerEvent, LedgerInterface};

/// Phrases nodes use when a log query would return too many results.
const RESULT_LIMIT_PHRASES: &[&str] = &[
	"query returned more than",
	"more than 10000 results",
	"log response size exceeded",
	"too many results",
	"block range is too large",
];

/// Whether a node error message reports the per-query result limit.
pub fn is_result_limit_message(message: &str) -> bool {
	let message = message.to_lowercase();
	RESULT_LIMIT_PHRASES
		.iter()
		.any(|phrase| message.contains(phrase))
}

/// Maps a transport error onto the keeper's ledger error classes.
pub fn classify_transport_error(err: TransportError) -> LedgerError {
	if let Some(payload) = err.as_error_resp() {
		if is_result_limit_message(&payload.message) {
			return LedgerError::ResultLimit(payload.message.to_string());
		}
		return LedgerError::Rpc {
			code: payload.code,
			message: payload.message.to_string(),
		};
	}

	let message = err.to_string();
	if is_result_limit_message(&message) {
		LedgerError::ResultLimit(message)
	} else {
		LedgerError::Transport(message)
	}
}

/// Maps a contract call error onto the keeper's ledger error classes.
pub fn classify_contract_error(err: alloy::contract::Error) -> LedgerError {
	match err {
		alloy::contract::Error::TransportError(e) => classify_transport_error(e),
		other => LedgerError::Decode(other.to_string()),
	}
}

/// Alloy-based ledger reader.
pub struct AlloyLedger {
	provider: DynProvider,
	factory: IUniswapFactory::IUniswapFactoryInstance<DynProvider>,
}

impl AlloyLedger {
	/// Connects to the node at `rpc_url` and binds the exchange factory.
	pub fn connect(rpc_url: &str, factory: Address) -> Result<Self, LedgerError> {
		let url = rpc_url
			.parse()
			.map_err(|e| LedgerError::Transport(format!("Invalid RPC URL: {}", e)))?;

		let provider = ProviderBuilder::new().connect_http(url).erased();
		Ok(Self::with_provider(provider, factory))
	}

	pub fn with_provider(provider: DynProvider, factory: Address) -> Self {
		Self {
			factory: IUniswapFactory::new(factory, provider.clone()),
			provider,
		}
	}

	fn to_event(query: &EventQuery, log: &Log) -> Result<LedgerEvent, LedgerError> {
		let block_number = log
			.block_number
			.ok_or_else(|| LedgerError::Decode("log without block number".to_string()))?;
		let transaction_hash = log
			.transaction_hash
			.ok_or_else(|| LedgerError::Decode("log without transaction hash".to_string()))?;

		let payload = match query.kind {
			EventKind::DepositEth => {
				let decoded = log
					.log_decode::<IUniswapEx::DepositETH>()
					.map_err(|e| LedgerError::Decode(format!("DepositETH: {}", e)))?;
				decoded.inner.data._data
			}
			EventKind::Transfer => Bytes::new(),
		};

		Ok(LedgerEvent {
			block_number,
			transaction_hash,
			log_index: log.log_index.unwrap_or_default(),
			payload,
		})
	}
}

fn event_signature(kind: EventKind) -> B256 {
	match kind {
		EventKind::DepositEth => IUniswapEx::DepositETH::SIGNATURE_HASH,
		EventKind::Transfer => IERC20::Transfer::SIGNATURE_HASH,
	}
}

fn to_u64(value: U256, what: &str) -> Result<u64, LedgerError> {
	u64::try_from(value).map_err(|_| LedgerError::Decode(format!("{} out of range: {}", what, value)))
}

#[async_trait]
impl LedgerInterface for AlloyLedger {
	async fn block_number(&self) -> Result<BlockNumber, LedgerError> {
		self.provider
			.get_block_number()
			.await
			.map_err(classify_transport_error)
	}

	async fn token_count(&self) -> Result<u64, LedgerError> {
		let count = self
			.factory
			.tokenCount()
			.call()
			.await
			.map_err(classify_contract_error)?;
		to_u64(count, "token count")
	}

	async fn token_at_index(&self, index: u64) -> Result<Address, LedgerError> {
		self.factory
			.getTokenWithId(U256::from(index))
			.call()
			.await
			.map_err(classify_contract_error)
	}

	async fn get_events(
		&self,
		query: &EventQuery,
		from: BlockNumber,
		to: BlockNumber,
	) -> Result<Vec<LedgerEvent>, LedgerError> {
		let filter = Filter::new()
			.address(query.address)
			.event_signature(event_signature(query.kind))
			.from_block(from)
			.to_block(to);

		let logs = self
			.provider
			.get_logs(&filter)
			.await
			.map_err(classify_transport_error)?;

		logs.iter().map(|log| Self::to_event(query, log)).collect()
	}

	async fn transaction_input(&self, hash: B256) -> Result<Bytes, LedgerError> {
		let tx = self
			.provider
			.get_transaction_by_hash(hash)
			.await
			.map_err(classify_transport_error)?
			.ok_or(LedgerError::MissingTransaction(hash))?;

		Ok(tx.input().clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_recognises_result_limit_messages() {
		assert!(is_result_limit_message(
			"query returned more than 10000 results"
		));
		assert!(is_result_limit_message(
			"Log response size exceeded. You can make eth_getLogs requests with up to a 2K block range"
		));
		assert!(is_result_limit_message("Error: Too many results"));

		assert!(!is_result_limit_message("header not found"));
		assert!(!is_result_limit_message("execution reverted"));
	}

	#[test]
	fn test_event_signatures_are_distinct() {
		assert_ne!(
			event_signature(EventKind::DepositEth),
			event_signature(EventKind::Transfer)
		);
		assert_eq!(
			event_signature(EventKind::Transfer),
			IERC20::Transfer::SIGNATURE_HASH
		);
	}

	#[test]
	fn test_to_u64_rejects_overflow() {
		assert_eq!(to_u64(U256::from(42u64), "count").unwrap(), 42);
		assert!(to_u64(U256::MAX, "count").is_err());
	}

	#[test]
	fn test_connect_rejects_bad_url() {
		let err = AlloyLedger::connect("not a url", Address::ZERO)
			.err()
			.unwrap();
		assert!(matches!(err, LedgerError::Transport(_)));
	}
}
