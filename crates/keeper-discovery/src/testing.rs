//! In-memory ledger for discovery tests.

use async_trait::async_trait;
use keeper_chain::{RetryPolicy, RetryRunner};
use keeper_types::{
	Address, BlockNumber, Bytes, EventQuery, LedgerError, LedgerEvent, LedgerInterface, B256,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub fn quick_retry() -> RetryRunner {
	RetryRunner::new(RetryPolicy {
		max_attempts: 2,
		delay: Duration::from_millis(1),
		multiplier: 1.0,
		call_timeout: None,
	})
}

pub fn event(block: BlockNumber, tx: u8, payload: Vec<u8>) -> LedgerEvent {
	LedgerEvent {
		block_number: block,
		transaction_hash: B256::repeat_byte(tx),
		log_index: 0,
		payload: Bytes::from(payload),
	}
}

/// Ledger fake with call counters.
///
/// Index `i` of the factory resolves to `tokens[i]`; the token count is
/// `tokens.len()`, so `tokens[0]` stands in for the reserved slot.
#[derive(Default)]
pub struct FakeLedger {
	pub tokens: Vec<Address>,
	pub events: HashMap<EventQuery, Vec<LedgerEvent>>,
	pub transactions: HashMap<B256, Bytes>,
	/// Queries returning more events than this fail with a result-limit error.
	pub result_limit: Option<usize>,
	/// Contracts whose event queries fail with an RPC error.
	pub failing_addresses: HashSet<Address>,
	pub block: BlockNumber,

	pub token_count_calls: AtomicU32,
	pub token_at_index_calls: AtomicU32,
	pub get_events_calls: AtomicU32,
	pub transaction_calls: AtomicU32,
}

impl FakeLedger {
	/// Adds an event, keeping each query's events in block order.
	pub fn add_event(&mut self, query: EventQuery, event: LedgerEvent) {
		let events = self.events.entry(query).or_default();
		events.push(event);
		events.sort_by_key(|e| e.block_number);
	}

	pub fn add_transaction(&mut self, hash: B256, input: Vec<u8>) {
		self.transactions.insert(hash, Bytes::from(input));
	}
}

#[async_trait]
impl LedgerInterface for FakeLedger {
	async fn block_number(&self) -> Result<BlockNumber, LedgerError> {
		Ok(self.block)
	}

	async fn token_count(&self) -> Result<u64, LedgerError> {
		self.token_count_calls.fetch_add(1, Ordering::SeqCst);
		Ok(self.tokens.len() as u64)
	}

	async fn token_at_index(&self, index: u64) -> Result<Address, LedgerError> {
		self.token_at_index_calls.fetch_add(1, Ordering::SeqCst);
		self.tokens
			.get(index as usize)
			.copied()
			.ok_or_else(|| LedgerError::Rpc {
				code: 3,
				message: "execution reverted".to_string(),
			})
	}

	async fn get_events(
		&self,
		query: &EventQuery,
		from: BlockNumber,
		to: BlockNumber,
	) -> Result<Vec<LedgerEvent>, LedgerError> {
		self.get_events_calls.fetch_add(1, Ordering::SeqCst);

		if self.failing_addresses.contains(&query.address) {
			return Err(LedgerError::Rpc {
				code: -32000,
				message: "internal error".to_string(),
			});
		}

		let matched: Vec<LedgerEvent> = self
			.events
			.get(query)
			.map(|events| {
				events
					.iter()
					.filter(|e| e.block_number >= from && e.block_number <= to)
					.cloned()
					.collect()
			})
			.unwrap_or_default();

		match self.result_limit {
			Some(limit) if matched.len() > limit => Err(LedgerError::ResultLimit(format!(
				"query returned more than {} results",
				limit
			))),
			_ => Ok(matched),
		}
	}

	async fn transaction_input(&self, hash: B256) -> Result<Bytes, LedgerError> {
		self.transaction_calls.fetch_add(1, Ordering::SeqCst);
		self.transactions
			.get(&hash)
			.cloned()
			.ok_or(LedgerError::MissingTransaction(hash))
	}
}
