//! Fakes shared by the engine tests.

use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use keeper_chain::contracts::{OrderData, IERC20};
use keeper_chain::{RetryPolicy, RetryRunner};
use keeper_order::codec::decode_order;
use keeper_order::{DecodeError, HandlerError, OrderHandler};
use keeper_types::{
	Address, BlockNumber, Bytes, EventKind, EventQuery, FillReceipt, LedgerError, LedgerEvent,
	LedgerInterface, LimitOrder, RawOrder, B256, ETH_ADDRESS, U256,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn quick_retry() -> RetryRunner {
	RetryRunner::new(RetryPolicy {
		max_attempts: 1,
		delay: Duration::from_millis(1),
		multiplier: 1.0,
		call_timeout: None,
	})
}

/// 224-byte order encoding for an ETH order owned by `owner`.
pub fn eth_order(owner: Address) -> RawOrder {
	let mut encoded = OrderData {
		sellAsset: ETH_ADDRESS,
		buyAsset: Address::repeat_byte(0xbb),
		minReturn: U256::from(1u64),
		fee: U256::from(1u64),
		owner,
	}
	.abi_encode();
	encoded.extend((B256::ZERO, Address::ZERO).abi_encode());
	RawOrder::from(encoded)
}

/// Token transfer input carrying `order`.
pub fn transfer_input(order: &RawOrder) -> Vec<u8> {
	let mut input = IERC20::transferCall::SELECTOR.to_vec();
	input.extend((Address::repeat_byte(0x0a), U256::from(1u64)).abi_encode());
	input.extend(Bytes::copy_from_slice(order.as_bytes()).abi_encode());
	input
}

/// Ledger with one token (index 1) and at most one event of each kind.
#[derive(Default)]
pub struct FakeLedger {
	pub head: AtomicU64,
	pub token: Address,
	pub deposit: Mutex<Option<LedgerEvent>>,
	pub transfer: Mutex<Option<(LedgerEvent, Bytes)>>,
	/// Token event queries fail while set.
	pub transfers_fail: AtomicBool,
	/// Delay before answering any event query, in milliseconds.
	pub events_delay_ms: AtomicU64,
}

#[async_trait]
impl LedgerInterface for FakeLedger {
	async fn block_number(&self) -> Result<BlockNumber, LedgerError> {
		Ok(self.head.load(Ordering::SeqCst))
	}

	async fn token_count(&self) -> Result<u64, LedgerError> {
		Ok(2)
	}

	async fn token_at_index(&self, _index: u64) -> Result<Address, LedgerError> {
		Ok(self.token)
	}

	async fn get_events(
		&self,
		query: &EventQuery,
		from: BlockNumber,
		to: BlockNumber,
	) -> Result<Vec<LedgerEvent>, LedgerError> {
		let delay = self.events_delay_ms.load(Ordering::SeqCst);
		if delay > 0 {
			tokio::time::sleep(Duration::from_millis(delay)).await;
		}

		let in_range = |e: &LedgerEvent| e.block_number >= from && e.block_number <= to;
		match query.kind {
			EventKind::DepositEth => Ok(self
				.deposit
				.lock()
				.unwrap()
				.clone()
				.filter(in_range)
				.into_iter()
				.collect()),
			EventKind::Transfer => {
				if self.transfers_fail.load(Ordering::SeqCst) {
					return Err(LedgerError::Rpc {
						code: -32000,
						message: "internal error".to_string(),
					});
				}
				Ok(self
					.transfer
					.lock()
					.unwrap()
					.clone()
					.map(|(event, _)| event)
					.filter(in_range)
					.into_iter()
					.collect())
			}
		}
	}

	async fn transaction_input(&self, hash: B256) -> Result<Bytes, LedgerError> {
		self.transfer
			.lock()
			.unwrap()
			.clone()
			.map(|(_, input)| input)
			.ok_or(LedgerError::MissingTransaction(hash))
	}
}

/// Handler whose orders are open unless closed, and ready while `ready` is set.
pub struct FakeHandler {
	pub ready: AtomicBool,
	pub closed: Mutex<HashSet<Address>>,
	pub exists_calls: AtomicU32,
	pub fills: Mutex<Vec<(Address, Address)>>,
}

impl Default for FakeHandler {
	fn default() -> Self {
		Self {
			ready: AtomicBool::new(true),
			closed: Mutex::new(HashSet::new()),
			exists_calls: AtomicU32::new(0),
			fills: Mutex::new(Vec::new()),
		}
	}
}

#[async_trait]
impl OrderHandler for FakeHandler {
	fn decode(&self, raw: &RawOrder) -> Result<LimitOrder, DecodeError> {
		decode_order(raw)
	}

	async fn exists(&self, order: &LimitOrder) -> Result<bool, HandlerError> {
		self.exists_calls.fetch_add(1, Ordering::SeqCst);
		Ok(!self.closed.lock().unwrap().contains(&order.owner))
	}

	async fn is_ready(&self, _order: &LimitOrder) -> Result<bool, HandlerError> {
		Ok(self.ready.load(Ordering::SeqCst))
	}

	async fn fill_order(
		&self,
		order: &LimitOrder,
		executor: Address,
	) -> Result<FillReceipt, HandlerError> {
		self.fills.lock().unwrap().push((order.owner, executor));
		Ok(FillReceipt {
			tx_hash: B256::repeat_byte(0xf1),
			block_number: Some(1),
			success: true,
		})
	}
}
