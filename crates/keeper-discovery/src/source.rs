//! Per-cycle order discovery.

use crate::{DiscoveryError, RangeScanner, TokenRegistry};
use keeper_chain::contracts::is_order_transaction;
use keeper_chain::RetryRunner;
use keeper_types::{Address, BlockNumber, Bytes, EventQuery, LedgerInterface, RawOrder};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SourceSettings {
	pub order_book: Address,
	/// Tokens never scanned, regardless of their events.
	pub excluded_tokens: Vec<Address>,
	/// Upper bound on the number of blocks covered by one cycle.
	pub max_block_jump: u64,
}

/// Finds orders submitted since the last successful scan.
///
/// The watermark is the last block fully scanned. A cycle covers
/// `[watermark + 1, min(requested, watermark + max_block_jump)]` and moves the
/// watermark only when every query in it succeeded, so a failed cycle is
/// repeated in full on the next call.
pub struct OrderSource {
	ledger: Arc<dyn LedgerInterface>,
	retry: RetryRunner,
	scanner: RangeScanner,
	registry: TokenRegistry,
	settings: SourceSettings,
	watermark: BlockNumber,
}

impl OrderSource {
	pub fn new(
		ledger: Arc<dyn LedgerInterface>,
		retry: RetryRunner,
		settings: SourceSettings,
		watermark: BlockNumber,
	) -> Self {
		Self {
			scanner: RangeScanner::new(ledger.clone(), retry.clone()),
			registry: TokenRegistry::new(ledger.clone(), retry.clone()),
			ledger,
			retry,
			settings,
			watermark,
		}
	}

	pub fn watermark(&self) -> BlockNumber {
		self.watermark
	}

	/// Moves the watermark forward to `block`; never moves it back.
	pub fn advance_to(&mut self, block: BlockNumber) {
		self.watermark = self.watermark.max(block);
	}

	pub fn registry(&self) -> &TokenRegistry {
		&self.registry
	}

	/// The window a scan up to `requested` would cover, if any.
	pub fn next_window(&self, requested: BlockNumber) -> Option<(BlockNumber, BlockNumber)> {
		let to = requested.min(self.watermark.saturating_add(self.settings.max_block_jump));
		(to > self.watermark).then(|| (self.watermark + 1, to))
	}

	/// Raw orders submitted in the next window up to `requested`.
	///
	/// ETH orders come first, then token orders by ascending token id, each in
	/// event order. Returns nothing, without touching the node, when the
	/// watermark is already at or past `requested`.
	pub async fn scan(&mut self, requested: BlockNumber) -> Result<Vec<RawOrder>, DiscoveryError> {
		let Some((from, to)) = self.next_window(requested) else {
			debug!(requested, watermark = self.watermark, "Nothing new to scan");
			return Ok(Vec::new());
		};

		let count = self.registry.count().await?;
		let mut orders = Vec::new();

		let deposits = self
			.scanner
			.fetch_events(&EventQuery::deposits(self.settings.order_book), from, to)
			.await?;
		for deposit in deposits {
			info!(tx_hash = %deposit.transaction_hash, "Found ETH order");
			orders.push(RawOrder::from(deposit.payload));
		}

		for index in 1..count {
			let token = self.registry.resolve(index).await?;
			if self.settings.excluded_tokens.contains(&token) {
				debug!(index, %token, "Skipping excluded token");
				continue;
			}

			debug!(index, count, %token, "Monitoring token");
			orders.extend(self.scan_token(token, from, to).await?);
		}

		self.watermark = to;
		info!(
			from,
			to,
			found = orders.len(),
			tokens = count.saturating_sub(1),
			"Scanned block window"
		);
		Ok(orders)
	}

	async fn scan_token(
		&self,
		token: Address,
		from: BlockNumber,
		to: BlockNumber,
	) -> Result<Vec<RawOrder>, DiscoveryError> {
		let transfers = self
			.scanner
			.fetch_events(&EventQuery::transfers(token), from, to)
			.await?;

		let ledger = self.ledger.as_ref();
		let mut checked = HashSet::new();
		let mut orders = Vec::new();

		for transfer in transfers {
			let hash = transfer.transaction_hash;
			if !checked.insert(hash) {
				continue;
			}

			let input: Bytes = self
				.retry
				.run("eth_getTransactionByHash", move || {
					ledger.transaction_input(hash)
				})
				.await?;

			debug!(tx_hash = %hash, len = input.len(), "Checked transfer");
			if is_order_transaction(&input) {
				info!(tx_hash = %hash, %token, "Found token order");
				orders.push(RawOrder::from(input));
			}
		}

		Ok(orders)
	}
}
