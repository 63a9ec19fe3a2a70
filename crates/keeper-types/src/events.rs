use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{BlockNumber, OrderId};

/// Events published by the keeper engine while it works.
#[derive(Debug, Clone)]
pub enum KeeperEvent {
	CycleCompleted {
		block: BlockNumber,
		watermark: BlockNumber,
		new_orders: usize,
		tracked_orders: usize,
		finished_at: DateTime<Utc>,
	},
	ScanFailed {
		from: BlockNumber,
		to: BlockNumber,
		error: String,
		consecutive_failures: u32,
	},
	/// A cycle hit the per-cycle timeout and was abandoned.
	CycleTimedOut {
		block: BlockNumber,
		timeout: Duration,
		consecutive_failures: u32,
	},
	OrderFilled {
		order_id: OrderId,
		tx_hash: B256,
	},
	OrderFailed {
		order_id: OrderId,
		reason: String,
	},
	OrderSettled {
		order_id: OrderId,
	},
}
