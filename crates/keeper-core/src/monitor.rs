//! New-block notifications.

use keeper_chain::RetryRunner;
use keeper_types::{BlockNumber, LedgerInterface};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Polls the node for its head block and publishes the target block.
///
/// The target is the head minus `block_delay`. Only increasing targets are
/// published, into a single-slot channel: a worker that is busy when several
/// blocks arrive sees only the latest one.
pub struct BlockMonitor {
	ledger: Arc<dyn LedgerInterface>,
	retry: RetryRunner,
	poll_interval: Duration,
	block_delay: u64,
}

impl BlockMonitor {
	pub fn new(
		ledger: Arc<dyn LedgerInterface>,
		retry: RetryRunner,
		poll_interval: Duration,
		block_delay: u64,
	) -> Self {
		Self {
			ledger,
			retry,
			poll_interval,
			block_delay,
		}
	}

	/// Polls until every receiver of `blocks` is gone.
	pub async fn run(self, blocks: watch::Sender<BlockNumber>) {
		let mut interval = tokio::time::interval(self.poll_interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
		let ledger = self.ledger.as_ref();

		loop {
			interval.tick().await;
			if blocks.is_closed() {
				debug!("Block monitor has no listeners, stopping");
				return;
			}

			let head = match self
				.retry
				.run("eth_blockNumber", move || ledger.block_number())
				.await
			{
				Ok(head) => head,
				Err(e) => {
					warn!(error = %e, "Failed to fetch block number");
					continue;
				}
			};

			let target = head.saturating_sub(self.block_delay);
			let advanced = blocks.send_if_modified(|current| {
				if target > *current {
					*current = target;
					true
				} else {
					false
				}
			});
			if advanced {
				debug!(head, block = target, "New block");
			}
		}
	}
}
