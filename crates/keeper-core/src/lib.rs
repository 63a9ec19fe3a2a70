//! Keeper engine.
//!
//! Wires discovery and the order pipeline to a stream of new blocks. One
//! worker runs cycles back to back, never two at once; blocks announced while
//! a cycle runs collapse into the most recent one.

use alloy::primitives::hex;
use chrono::{DateTime, Utc};
use keeper_chain::RetryRunner;
use keeper_config::Config;
use keeper_discovery::{OrderSource, SourceSettings};
use keeper_order::{CycleReport, OrderHandler, OrderOutcome, OrderPipeline};
use keeper_storage::{create_storage, StorageInterface, StorageService};
use keeper_types::{Address, BlockNumber, KeeperEvent, LedgerInterface, RawOrder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub mod error;
pub mod event_bus;
pub mod monitor;

#[cfg(test)]
pub(crate) mod testing;

pub use error::CoreError;
pub use event_bus::EventBus;
pub use monitor::BlockMonitor;

const CHECKPOINT_NAMESPACE: &str = "checkpoints";
const CHECKPOINT_ID: &str = "keeper";

/// Progress saved after every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
	pub watermark: BlockNumber,
	/// Hex-encoded raw orders that were still active.
	pub pending_orders: Vec<String>,
	pub saved_at: DateTime<Utc>,
}

/// Runs discovery cycles as new blocks arrive.
pub struct KeeperEngine {
	config: Config,
	ledger: Arc<dyn LedgerInterface>,
	retry: RetryRunner,
	source: OrderSource,
	pipeline: OrderPipeline,
	storage: StorageService,
	event_bus: EventBus,
	consecutive_failures: u32,
}

impl KeeperEngine {
	/// Runs until `shutdown` resolves or the block monitor stops.
	///
	/// A cycle that is already running when `shutdown` resolves is finished
	/// first, then a final checkpoint is written.
	pub async fn run<F>(&mut self, shutdown: F) -> Result<(), CoreError>
	where
		F: Future<Output = ()>,
	{
		let (sender, mut blocks) = watch::channel(self.source.watermark());
		let monitor = BlockMonitor::new(
			self.ledger.clone(),
			self.retry.clone(),
			self.config.network.poll_interval(),
			self.config.network.block_delay,
		);
		let monitor_handle = tokio::spawn(monitor.run(sender));

		info!(
			watermark = self.source.watermark(),
			executor = %self.pipeline.executor(),
			pending = self.pipeline.len(),
			"Keeper started"
		);

		tokio::pin!(shutdown);
		loop {
			tokio::select! {
				_ = &mut shutdown => {
					info!("Shutting down keeper");
					break;
				}
				changed = blocks.changed() => {
					if changed.is_err() {
						warn!("Block monitor stopped");
						break;
					}
					let block = *blocks.borrow_and_update();
					self.run_cycle_with_timeout(block).await;
				}
			}
		}

		monitor_handle.abort();
		self.save_checkpoint().await
	}

	/// Runs one cycle under the configured timeout.
	///
	/// A cycle that times out counts as a failure. Whatever it finished before
	/// being dropped stays in place and is checkpointed.
	async fn run_cycle_with_timeout(&mut self, block: BlockNumber) {
		let limit = self.config.discovery.cycle_timeout();
		if tokio::time::timeout(limit, self.run_cycle(block))
			.await
			.is_ok()
		{
			return;
		}

		self.consecutive_failures += 1;
		error!(
			block,
			timeout = ?limit,
			watermark = self.source.watermark(),
			consecutive_failures = self.consecutive_failures,
			"Cycle timed out"
		);
		self.event_bus
			.publish(KeeperEvent::CycleTimedOut {
				block,
				timeout: limit,
				consecutive_failures: self.consecutive_failures,
			})
			.ok();

		if let Err(e) = self.save_checkpoint().await {
			warn!(error = %e, "Failed to save checkpoint");
		}
	}

	/// Scans up to `block`, runs the pipeline and saves a checkpoint.
	///
	/// A failed scan leaves the watermark in place; the pipeline still runs
	/// over the orders already known.
	pub async fn run_cycle(&mut self, block: BlockNumber) -> CycleReport {
		let window = self.source.next_window(block);

		let new_orders = match self.source.scan(block).await {
			Ok(orders) => {
				self.consecutive_failures = 0;
				orders
			}
			Err(e) => {
				self.consecutive_failures += 1;
				let (from, to) = window.unwrap_or((self.source.watermark(), block));
				error!(
					from,
					to,
					error = %e,
					consecutive_failures = self.consecutive_failures,
					"Scan failed, window will be retried"
				);
				self.event_bus
					.publish(KeeperEvent::ScanFailed {
						from,
						to,
						error: e.to_string(),
						consecutive_failures: self.consecutive_failures,
					})
					.ok();
				Vec::new()
			}
		};
		let new_count = new_orders.len();

		let report = self.pipeline.ingest(new_orders).await;
		self.publish_outcomes(&report);

		if let Err(e) = self.save_checkpoint().await {
			warn!(error = %e, "Failed to save checkpoint");
		}

		info!(
			block,
			watermark = self.source.watermark(),
			new = new_count,
			admitted = report.admitted,
			open = report.open,
			ready = report.ready,
			filled = report.filled(),
			failures = report.failures(),
			tracked = self.pipeline.len(),
			"Cycle completed"
		);
		self.event_bus
			.publish(KeeperEvent::CycleCompleted {
				block,
				watermark: self.source.watermark(),
				new_orders: new_count,
				tracked_orders: self.pipeline.len(),
				finished_at: Utc::now(),
			})
			.ok();

		report
	}

	fn publish_outcomes(&self, report: &CycleReport) {
		for outcome in &report.outcomes {
			let event = match outcome {
				OrderOutcome::Filled { id, receipt } => KeeperEvent::OrderFilled {
					order_id: *id,
					tx_hash: receipt.tx_hash,
				},
				OrderOutcome::FillFailed { id, error } => KeeperEvent::OrderFailed {
					order_id: *id,
					reason: error.clone(),
				},
				OrderOutcome::DecodeFailed { id, error } => KeeperEvent::OrderFailed {
					order_id: *id,
					reason: error.to_string(),
				},
				_ => continue,
			};
			self.event_bus.publish(event).ok();
		}

		for order_id in &report.settled {
			self.event_bus
				.publish(KeeperEvent::OrderSettled {
					order_id: *order_id,
				})
				.ok();
		}
	}

	async fn save_checkpoint(&self) -> Result<(), CoreError> {
		let checkpoint = Checkpoint {
			watermark: self.source.watermark(),
			pending_orders: self
				.pipeline
				.pending_raw_orders()
				.iter()
				.map(RawOrder::to_hex)
				.collect(),
			saved_at: Utc::now(),
		};

		self.storage
			.store(CHECKPOINT_NAMESPACE, CHECKPOINT_ID, &checkpoint)
			.await?;
		debug!(watermark = checkpoint.watermark, "Checkpoint saved");
		Ok(())
	}

	pub fn watermark(&self) -> BlockNumber {
		self.source.watermark()
	}

	pub fn pipeline(&self) -> &OrderPipeline {
		&self.pipeline
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn consecutive_failures(&self) -> u32 {
		self.consecutive_failures
	}

	pub fn config(&self) -> &Config {
		&self.config
	}
}

/// Assembles a [`KeeperEngine`] from configuration and its remote collaborators.
pub struct KeeperBuilder {
	config: Config,
	ledger: Option<Arc<dyn LedgerInterface>>,
	handler: Option<Arc<dyn OrderHandler>>,
	executor: Option<Address>,
	storage: Option<Box<dyn StorageInterface>>,
}

impl KeeperBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			ledger: None,
			handler: None,
			executor: None,
			storage: None,
		}
	}

	pub fn with_ledger(mut self, ledger: Arc<dyn LedgerInterface>) -> Self {
		self.ledger = Some(ledger);
		self
	}

	pub fn with_handler(mut self, handler: Arc<dyn OrderHandler>) -> Self {
		self.handler = Some(handler);
		self
	}

	/// Account that fills orders.
	pub fn with_executor(mut self, executor: Address) -> Self {
		self.executor = Some(executor);
		self
	}

	/// Overrides the backend named in the configuration.
	pub fn with_storage(mut self, storage: Box<dyn StorageInterface>) -> Self {
		self.storage = Some(storage);
		self
	}

	/// Builds the engine and restores the last checkpoint, if any.
	pub async fn build(self) -> Result<KeeperEngine, CoreError> {
		let ledger = self
			.ledger
			.ok_or_else(|| CoreError::Configuration("Ledger not provided".into()))?;
		let handler = self
			.handler
			.ok_or_else(|| CoreError::Configuration("Order handler not provided".into()))?;
		let executor = self
			.executor
			.ok_or_else(|| CoreError::Configuration("Executor account not provided".into()))?;

		let backend = match self.storage {
			Some(backend) => backend,
			None => create_storage(
				&self.config.storage.backend,
				self.config.storage.path.clone(),
			)?,
		};
		let storage = StorageService::new(backend);

		let retry = RetryRunner::new(self.config.retry_policy());
		let settings = SourceSettings {
			order_book: self.config.contracts.order_book,
			excluded_tokens: self.config.contracts.excluded_tokens.clone(),
			max_block_jump: self.config.discovery.max_block_jump,
		};
		let mut source = OrderSource::new(
			ledger.clone(),
			retry.clone(),
			settings,
			self.config.discovery.watermark,
		);
		let mut pipeline = OrderPipeline::new(handler, executor);

		let checkpoint: Option<Checkpoint> = storage
			.retrieve_optional(CHECKPOINT_NAMESPACE, CHECKPOINT_ID)
			.await?;
		if let Some(checkpoint) = checkpoint {
			source.advance_to(checkpoint.watermark);
			let restored = pipeline.restore(decode_pending(&checkpoint.pending_orders));
			info!(
				watermark = source.watermark(),
				restored,
				saved_at = %checkpoint.saved_at,
				"Restored checkpoint"
			);
		}

		Ok(KeeperEngine {
			config: self.config,
			ledger,
			retry,
			source,
			pipeline,
			storage,
			event_bus: EventBus::new(1000),
			consecutive_failures: 0,
		})
	}
}

fn decode_pending(encoded: &[String]) -> Vec<RawOrder> {
	encoded
		.iter()
		.filter_map(|entry| match hex::decode(entry) {
			Ok(bytes) => Some(RawOrder::from(bytes)),
			Err(e) => {
				warn!(error = %e, "Dropping malformed order from checkpoint");
				None
			}
		})
		.collect()
}
