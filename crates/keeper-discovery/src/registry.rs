//! Token list of the exchange factory.

use crate::DiscoveryError;
use keeper_chain::RetryRunner;
use keeper_types::{Address, LedgerInterface};
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves factory token ids to addresses.
///
/// A token's address never changes once registered, so resolved entries are
/// cached for the life of the process. The count is always fetched fresh since
/// the factory keeps growing.
pub struct TokenRegistry {
	ledger: Arc<dyn LedgerInterface>,
	retry: RetryRunner,
	cache: HashMap<u64, Address>,
}

impl TokenRegistry {
	pub fn new(ledger: Arc<dyn LedgerInterface>, retry: RetryRunner) -> Self {
		Self {
			ledger,
			retry,
			cache: HashMap::new(),
		}
	}

	/// Number of tokens the factory reports right now.
	pub async fn count(&self) -> Result<u64, DiscoveryError> {
		let ledger = self.ledger.as_ref();
		Ok(self
			.retry
			.run("tokenCount", move || ledger.token_count())
			.await?)
	}

	/// Address of the token registered under `index`.
	pub async fn resolve(&mut self, index: u64) -> Result<Address, DiscoveryError> {
		if let Some(address) = self.cache.get(&index) {
			return Ok(*address);
		}

		let ledger = self.ledger.as_ref();
		let address = self
			.retry
			.run("getTokenWithId", move || ledger.token_at_index(index))
			.await?;

		self.cache.insert(index, address);
		Ok(address)
	}

	pub fn cached(&self) -> usize {
		self.cache.len()
	}
}
