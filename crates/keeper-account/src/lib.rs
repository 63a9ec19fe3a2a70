//! Keeper account management.
//!
//! The keeper signs exactly one kind of transaction, the order fill, and
//! needs its own address so fills can name it as the executor.

use alloy::network::EthereumWallet;
use async_trait::async_trait;
use keeper_types::Address;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

pub use implementations::local::LocalWallet;

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Address that signs and pays for fills.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Wallet to attach to a signing provider.
	fn wallet(&self) -> EthereumWallet;
}

/// Creates the local wallet from a hex private key.
pub fn create_account(
	private_key: &str,
	chain_id: Option<u64>,
) -> Result<Box<dyn AccountInterface>, AccountError> {
	Ok(Box::new(LocalWallet::new(private_key, chain_id)?))
}
