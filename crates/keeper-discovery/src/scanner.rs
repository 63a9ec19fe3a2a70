//! Range queries with bisection on the node's result limit.

use crate::DiscoveryError;
use keeper_chain::RetryRunner;
use keeper_types::{BlockNumber, EventQuery, LedgerError, LedgerEvent, LedgerInterface};
use std::sync::Arc;
use tracing::debug;

/// Fetches events over inclusive block windows.
///
/// A query the node refuses with its result-limit error is split in two at
/// `from + (to - from) / 2` and both halves are fetched, repeatedly, until
/// every piece fits. Splitting uses an explicit stack, so depth costs heap
/// rather than call frames. A single block that still overflows is an error.
pub struct RangeScanner {
	ledger: Arc<dyn LedgerInterface>,
	retry: RetryRunner,
}

impl RangeScanner {
	pub fn new(ledger: Arc<dyn LedgerInterface>, retry: RetryRunner) -> Self {
		Self { ledger, retry }
	}

	/// Events matching `query` in `[from, to]`, in ascending block order.
	pub async fn fetch_events(
		&self,
		query: &EventQuery,
		from: BlockNumber,
		to: BlockNumber,
	) -> Result<Vec<LedgerEvent>, DiscoveryError> {
		let mut events = Vec::new();
		if from > to {
			return Ok(events);
		}

		let ledger = self.ledger.as_ref();
		// LIFO: the left half is pushed last so it is fetched first.
		let mut pending = vec![(from, to)];

		while let Some((lo, hi)) = pending.pop() {
			let result = self
				.retry
				.run("eth_getLogs", move || ledger.get_events(query, lo, hi))
				.await;

			match result {
				Ok(batch) => events.extend(batch),
				Err(LedgerError::ResultLimit(message)) => {
					if lo == hi {
						return Err(DiscoveryError::ResultLimitAtBlock { block: lo, message });
					}
					let pivot = lo + (hi - lo) / 2;
					debug!(
						address = %query.address,
						from = lo,
						to = hi,
						pivot,
						"Splitting event query"
					);
					pending.push((pivot + 1, hi));
					pending.push((lo, pivot));
				}
				Err(e) => return Err(e.into()),
			}
		}

		Ok(events)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{event, quick_retry, FakeLedger};
	use keeper_types::Address;
	use std::sync::atomic::Ordering;

	fn book() -> Address {
		Address::repeat_byte(0xb0)
	}

	fn ledger_with_blocks(blocks: &[u64], limit: Option<usize>) -> FakeLedger {
		let mut ledger = FakeLedger::default();
		ledger.result_limit = limit;
		for (i, block) in blocks.iter().enumerate() {
			ledger.add_event(
				EventQuery::deposits(book()),
				event(*block, i as u8, vec![i as u8]),
			);
		}
		ledger
	}

	#[tokio::test]
	async fn test_single_query_when_under_limit() {
		let ledger = Arc::new(ledger_with_blocks(&[10, 12, 15], Some(10)));
		let scanner = RangeScanner::new(ledger.clone(), quick_retry());

		let events = scanner
			.fetch_events(&EventQuery::deposits(book()), 1, 100)
			.await
			.unwrap();

		assert_eq!(events.len(), 3);
		assert_eq!(ledger.get_events_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_bisection_returns_exact_union_for_any_limit() {
		let blocks = [1, 1, 2, 3, 5, 8, 8, 8, 13, 21, 34, 55, 56, 57, 99, 100];

		for limit in 3..=blocks.len() + 1 {
			let ledger = Arc::new(ledger_with_blocks(&blocks, Some(limit)));
			let scanner = RangeScanner::new(ledger.clone(), quick_retry());

			let events = scanner
				.fetch_events(&EventQuery::deposits(book()), 1, 100)
				.await
				.unwrap();

			let got: Vec<u64> = events.iter().map(|e| e.block_number).collect();
			assert_eq!(got, blocks.to_vec(), "limit {}", limit);

			let payloads: Vec<u8> = events.iter().map(|e| e.payload[0]).collect();
			let expected: Vec<u8> = (0..blocks.len() as u8).collect();
			assert_eq!(payloads, expected, "limit {}", limit);
		}
	}

	#[tokio::test]
	async fn test_bisection_respects_window_bounds() {
		let ledger = Arc::new(ledger_with_blocks(&[4, 5, 6, 7, 8, 9, 10, 11], Some(2)));
		let scanner = RangeScanner::new(ledger, quick_retry());

		let events = scanner
			.fetch_events(&EventQuery::deposits(book()), 5, 10)
			.await
			.unwrap();

		let got: Vec<u64> = events.iter().map(|e| e.block_number).collect();
		assert_eq!(got, vec![5, 6, 7, 8, 9, 10]);
	}

	#[tokio::test]
	async fn test_single_block_over_limit_is_an_error() {
		let ledger = Arc::new(ledger_with_blocks(&[7, 7, 7], Some(2)));
		let scanner = RangeScanner::new(ledger, quick_retry());

		let err = scanner
			.fetch_events(&EventQuery::deposits(book()), 1, 20)
			.await
			.unwrap_err();

		assert!(matches!(
			err,
			DiscoveryError::ResultLimitAtBlock { block: 7, .. }
		));
	}

	#[tokio::test]
	async fn test_other_errors_are_not_bisected() {
		let mut ledger = ledger_with_blocks(&[1, 2, 3], Some(1));
		ledger.failing_addresses.insert(book());
		let ledger = Arc::new(ledger);
		let scanner = RangeScanner::new(ledger.clone(), quick_retry());

		let err = scanner
			.fetch_events(&EventQuery::deposits(book()), 1, 3)
			.await
			.unwrap_err();

		assert!(matches!(err, DiscoveryError::Ledger(LedgerError::Rpc { .. })));
		// one query, retried once, never split
		assert_eq!(ledger.get_events_calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_empty_window() {
		let ledger = Arc::new(ledger_with_blocks(&[1], None));
		let scanner = RangeScanner::new(ledger.clone(), quick_retry());

		let events = scanner
			.fetch_events(&EventQuery::deposits(book()), 5, 4)
			.await
			.unwrap();

		assert!(events.is_empty());
		assert_eq!(ledger.get_events_calls.load(Ordering::SeqCst), 0);
	}
}
