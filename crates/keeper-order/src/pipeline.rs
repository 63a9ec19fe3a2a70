//! Order life-cycle engine.
//!
//! [`OrderPipeline::ingest`] runs one cycle over every tracked order:
//!
//! 1. admit raw orders not seen before, in discovery order
//! 2. decode newly admitted orders, once each
//! 3. re-check which decoded orders still exist on chain
//! 4. check which open orders can be executed now
//! 5. fill the ready ones, one after another
//! 6. drop orders that reached a terminal state, keeping only their id
//!
//! A failure on one order is recorded in the [`CycleReport`] and never stops
//! the rest of the batch.

use crate::{DecodeError, OrderHandler};
use keeper_types::{Address, FillReceipt, LimitOrder, OrderId, OrderState, RawOrder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one order during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
	DecodeFailed { id: OrderId, error: DecodeError },
	/// The order no longer exists on chain.
	Closed { id: OrderId },
	NotReady { id: OrderId },
	/// The existence or readiness check itself failed; retried next cycle.
	CheckFailed { id: OrderId, error: String },
	Filled { id: OrderId, receipt: FillReceipt },
	FillFailed { id: OrderId, error: String },
}

impl OrderOutcome {
	pub fn order_id(&self) -> OrderId {
		match self {
			Self::DecodeFailed { id, .. }
			| Self::Closed { id }
			| Self::NotReady { id }
			| Self::CheckFailed { id, .. }
			| Self::Filled { id, .. }
			| Self::FillFailed { id, .. } => *id,
		}
	}
}

/// Summary of one pipeline cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
	/// Raw orders seen for the first time.
	pub admitted: usize,
	/// Raw orders already tracked or settled.
	pub duplicates: usize,
	pub decoded: usize,
	pub open: usize,
	pub ready: usize,
	/// Per-order results, in discovery order within each stage.
	pub outcomes: Vec<OrderOutcome>,
	/// Orders that reached a terminal state this cycle.
	pub settled: Vec<OrderId>,
}

impl CycleReport {
	pub fn filled(&self) -> usize {
		self.outcomes
			.iter()
			.filter(|o| matches!(o, OrderOutcome::Filled { .. }))
			.count()
	}

	pub fn failures(&self) -> usize {
		self.outcomes
			.iter()
			.filter(|o| {
				matches!(
					o,
					OrderOutcome::DecodeFailed { .. }
						| OrderOutcome::CheckFailed { .. }
						| OrderOutcome::FillFailed { .. }
				)
			})
			.count()
	}
}

struct TrackedOrder {
	id: OrderId,
	state: OrderState,
	decoded: Option<LimitOrder>,
}

impl TrackedOrder {
	fn transition(&mut self, next: OrderState) {
		if self.state.can_transition_to(next) {
			debug!(order_id = %self.id, from = %self.state, to = %next, "Order state change");
			self.state = next;
		} else {
			warn!(order_id = %self.id, from = %self.state, to = %next, "Rejected order state change");
		}
	}
}

/// Tracks orders between discovery and settlement.
///
/// Active orders keep their raw bytes and decoded form. Once an order is
/// closed, filled or undecodable only its [`OrderId`] is kept, which is enough
/// to ignore the same bytes if discovery reports them again.
pub struct OrderPipeline {
	handler: Arc<dyn OrderHandler>,
	executor: Address,
	sequence: Vec<RawOrder>,
	tracked: HashMap<RawOrder, TrackedOrder>,
	settled: HashSet<OrderId>,
}

impl OrderPipeline {
	pub fn new(handler: Arc<dyn OrderHandler>, executor: Address) -> Self {
		Self {
			handler,
			executor,
			sequence: Vec::new(),
			tracked: HashMap::new(),
			settled: HashSet::new(),
		}
	}

	pub fn executor(&self) -> Address {
		self.executor
	}

	/// Number of active (non-terminal) orders.
	pub fn len(&self) -> usize {
		self.sequence.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sequence.is_empty()
	}

	pub fn settled_len(&self) -> usize {
		self.settled.len()
	}

	pub fn state_of(&self, raw: &RawOrder) -> Option<OrderState> {
		self.tracked.get(raw).map(|order| order.state)
	}

	pub fn is_settled(&self, raw: &RawOrder) -> bool {
		self.settled.contains(&raw.id())
	}

	/// Raw bytes of every active order, in discovery order.
	pub fn pending_raw_orders(&self) -> Vec<RawOrder> {
		self.sequence.clone()
	}

	/// Re-admits previously pending orders without running a cycle.
	///
	/// Restored orders start over as `Observed` and are decoded on the next
	/// [`ingest`](Self::ingest).
	pub fn restore(&mut self, raw_orders: Vec<RawOrder>) -> usize {
		raw_orders
			.into_iter()
			.filter(|raw| self.admit(raw.clone()))
			.count()
	}

	fn admit(&mut self, raw: RawOrder) -> bool {
		let id = raw.id();
		if self.settled.contains(&id) || self.tracked.contains_key(&raw) {
			return false;
		}

		self.tracked.insert(
			raw.clone(),
			TrackedOrder {
				id,
				state: OrderState::Observed,
				decoded: None,
			},
		);
		self.sequence.push(raw);
		true
	}

	/// Runs one cycle with `new_orders` from discovery.
	pub async fn ingest(&mut self, new_orders: Vec<RawOrder>) -> CycleReport {
		let mut report = CycleReport::default();

		for raw in new_orders {
			if self.admit(raw) {
				report.admitted += 1;
			} else {
				report.duplicates += 1;
			}
		}

		self.decode_pass(&mut report);
		let open = self.open_pass(&mut report).await;
		let ready = self.ready_pass(&open, &mut report).await;
		self.execute_pass(&ready, &mut report).await;
		self.settle(&mut report);

		report
	}

	fn decode_pass(&mut self, report: &mut CycleReport) {
		for raw in &self.sequence {
			let Some(order) = self.tracked.get_mut(raw) else {
				continue;
			};
			if order.state != OrderState::Observed {
				continue;
			}

			match self.handler.decode(raw) {
				Ok(decoded) => {
					order.decoded = Some(decoded);
					order.transition(OrderState::Decoded);
					report.decoded += 1;
				}
				Err(error) => {
					warn!(order_id = %order.id, %error, "Failed to decode order");
					order.transition(OrderState::Skipped);
					report.outcomes.push(OrderOutcome::DecodeFailed {
						id: order.id,
						error,
					});
				}
			}
		}
	}

	/// Orders that passed the open check this cycle, in discovery order.
	async fn open_pass(&mut self, report: &mut CycleReport) -> Vec<RawOrder> {
		let mut open = Vec::new();
		for raw in &self.sequence {
			let Some(order) = self.tracked.get_mut(raw) else {
				continue;
			};
			if !order.state.awaits_open_check() {
				continue;
			}
			let Some(decoded) = order.decoded.as_ref() else {
				continue;
			};

			let result = self.handler.exists(decoded).await;
			match result {
				Ok(true) => {
					order.transition(OrderState::Open);
					report.open += 1;
					open.push(raw.clone());
				}
				Ok(false) => {
					info!(order_id = %order.id, "Order no longer exists");
					order.transition(OrderState::Closed);
					report.outcomes.push(OrderOutcome::Closed { id: order.id });
				}
				Err(e) => {
					warn!(order_id = %order.id, error = %e, "Existence check failed");
					report.outcomes.push(OrderOutcome::CheckFailed {
						id: order.id,
						error: e.to_string(),
					});
				}
			}
		}
		open
	}

	/// Orders from `open` that passed the ready check this cycle.
	async fn ready_pass(
		&mut self,
		open: &[RawOrder],
		report: &mut CycleReport,
	) -> Vec<RawOrder> {
		let mut ready = Vec::new();
		for raw in open {
			let Some(order) = self.tracked.get_mut(raw) else {
				continue;
			};
			if order.state != OrderState::Open {
				continue;
			}
			let Some(decoded) = order.decoded.as_ref() else {
				continue;
			};

			let result = self.handler.is_ready(decoded).await;
			match result {
				Ok(true) => {
					order.transition(OrderState::Ready);
					report.ready += 1;
					ready.push(raw.clone());
				}
				Ok(false) => {
					debug!(order_id = %order.id, "Order not ready");
					order.transition(OrderState::NotReady);
					report.outcomes.push(OrderOutcome::NotReady { id: order.id });
				}
				Err(e) => {
					warn!(order_id = %order.id, error = %e, "Readiness check failed");
					report.outcomes.push(OrderOutcome::CheckFailed {
						id: order.id,
						error: e.to_string(),
					});
				}
			}
		}
		ready
	}

	async fn execute_pass(&mut self, ready: &[RawOrder], report: &mut CycleReport) {
		for raw in ready {
			let Some(order) = self.tracked.get_mut(raw) else {
				continue;
			};
			if order.state != OrderState::Ready {
				continue;
			}
			let Some(decoded) = order.decoded.as_ref() else {
				continue;
			};

			let result = self.handler.fill_order(decoded, self.executor).await;
			match result {
				Ok(receipt) if receipt.success => {
					info!(order_id = %order.id, tx_hash = %receipt.tx_hash, "Order filled");
					order.transition(OrderState::Filled);
					report.outcomes.push(OrderOutcome::Filled {
						id: order.id,
						receipt,
					});
				}
				Ok(receipt) => {
					warn!(order_id = %order.id, tx_hash = %receipt.tx_hash, "Fill reverted");
					order.transition(OrderState::Failed);
					report.outcomes.push(OrderOutcome::FillFailed {
						id: order.id,
						error: format!("transaction {} reverted", receipt.tx_hash),
					});
				}
				Err(e) => {
					warn!(order_id = %order.id, error = %e, "Fill failed");
					order.transition(OrderState::Failed);
					report.outcomes.push(OrderOutcome::FillFailed {
						id: order.id,
						error: e.to_string(),
					});
				}
			}
		}
	}

	fn settle(&mut self, report: &mut CycleReport) {
		let tracked = &mut self.tracked;
		let settled = &mut self.settled;

		self.sequence.retain(|raw| {
			let terminal = tracked
				.get(raw)
				.map_or(true, |order| order.state.is_terminal());
			if terminal {
				if let Some(order) = tracked.remove(raw) {
					settled.insert(order.id);
					report.settled.push(order.id);
				}
			}
			!terminal
		});
	}
}
