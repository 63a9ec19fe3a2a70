//! Order discovery for the keeper.
//!
//! Discovery turns a block height into the raw orders submitted since the last
//! successful cycle. It is layered leaf-first:
//!
//! - [`RangeScanner`] fetches events over a block window, bisecting windows the
//!   node refuses for returning too many results.
//! - [`TokenRegistry`] resolves and caches the exchange factory's token list.
//! - [`OrderSource`] combines both and owns the block watermark.

use keeper_types::{BlockNumber, LedgerError};
use thiserror::Error;

pub mod registry;
pub mod scanner;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::TokenRegistry;
pub use scanner::RangeScanner;
pub use source::{OrderSource, SourceSettings};

#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error(transparent)]
	Ledger(#[from] LedgerError),
	/// The node refused a single-block query for returning too many results.
	#[error("Result limit exceeded at single block {block}: {message}")]
	ResultLimitAtBlock { block: BlockNumber, message: String },
}
