//! Local private key wallet.

use crate::{AccountError, AccountInterface};
use alloy::network::EthereumWallet;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use keeper_types::Address;

/// Wallet backed by a private key held in process memory.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Parses a hex-encoded private key, with or without the `0x` prefix.
	///
	/// When `chain_id` is set, signatures are bound to that chain.
	pub fn new(private_key_hex: &str, chain_id: Option<u64>) -> Result<Self, AccountError> {
		let key = private_key_hex.trim();
		let key = key.strip_prefix("0x").unwrap_or(key);

		if key.len() != 64 {
			return Err(AccountError::InvalidKey(
				"Private key must be 64 hex characters (32 bytes)".to_string(),
			));
		}

		let signer = key
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?
			.with_chain_id(chain_id);

		Ok(Self { signer })
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	fn wallet(&self) -> EthereumWallet {
		EthereumWallet::from(self.signer.clone())
	}
}
