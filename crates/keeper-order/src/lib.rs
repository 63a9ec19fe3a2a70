//! Order processing for the keeper.
//!
//! This module takes raw orders from discovery through decoding, the open and
//! ready checks and execution. Contract-specific behaviour sits behind the
//! [`OrderHandler`] trait; [`OrderPipeline`] owns the per-order state machine.

use async_trait::async_trait;
use keeper_types::{Address, FillReceipt, LedgerError, LimitOrder, RawOrder};
use std::time::Duration;
use thiserror::Error;

pub mod codec;
pub mod pipeline;

/// Re-export implementations
pub mod implementations {
	pub mod uniswap_ex;
}

pub use implementations::uniswap_ex::UniswapExHandler;
pub use pipeline::{CycleReport, OrderOutcome, OrderPipeline};

/// Errors from turning raw bytes into a [`LimitOrder`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
	#[error("Payload too short: {len} bytes, need at least {min}")]
	TooShort { len: usize, min: usize },
	#[error("ABI decoding failed: {0}")]
	Abi(String),
}

/// Errors from the remote side of order handling.
#[derive(Debug, Error)]
pub enum HandlerError {
	#[error(transparent)]
	Ledger(#[from] LedgerError),
	#[error("Fill transaction failed: {0}")]
	Execution(String),
	#[error("No receipt for fill after {0:?}")]
	Timeout(Duration),
}

/// Contract-specific order logic.
///
/// The pipeline decides when each method is called; implementations only
/// answer for one order at a time.
#[async_trait]
pub trait OrderHandler: Send + Sync {
	/// Interprets raw order bytes. Must be deterministic.
	fn decode(&self, raw: &RawOrder) -> Result<LimitOrder, DecodeError>;

	/// Whether the order is still funded on chain.
	async fn exists(&self, order: &LimitOrder) -> Result<bool, HandlerError>;

	/// Whether the order can be executed right now.
	async fn is_ready(&self, order: &LimitOrder) -> Result<bool, HandlerError>;

	/// Executes the order from `executor` and waits for the receipt.
	///
	/// A transaction that was mined but reverted is `Ok` with
	/// [`FillReceipt::success`] unset; `Err` means no receipt was obtained.
	async fn fill_order(
		&self,
		order: &LimitOrder,
		executor: Address,
	) -> Result<FillReceipt, HandlerError>;
}
