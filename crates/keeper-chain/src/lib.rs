//! Chain access for the keeper.
//!
//! Contract bindings and the [`AlloyLedger`](implementations::rpc::AlloyLedger)
//! node reader live here, next to the [`RetryRunner`] that wraps every remote
//! call the keeper makes.

pub mod contracts;
pub mod retry;

/// Re-export implementations
pub mod implementations {
	pub mod rpc;
}

pub use implementations::rpc::AlloyLedger;
pub use retry::{RetryPolicy, RetryRunner};
