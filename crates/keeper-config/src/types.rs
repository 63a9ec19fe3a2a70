//! Configuration types.

use keeper_chain::RetryPolicy;
use keeper_types::{Address, BlockNumber};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Tether USD; its `transfer` does not follow ERC-20, so it is never scanned.
pub const USDT_ADDRESS: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";

/// First block the order book was live on mainnet.
pub const DEFAULT_WATERMARK: BlockNumber = 8_549_023;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub keeper: KeeperSettings,
	pub network: NetworkConfig,
	pub contracts: ContractsConfig,
	#[serde(default)]
	pub discovery: DiscoveryConfig,
	#[serde(default)]
	pub retry: RetryConfig,
	pub account: AccountConfig,
	#[serde(default)]
	pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeeperSettings {
	#[serde(default = "default_name")]
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl Default for KeeperSettings {
	fn default() -> Self {
		Self {
			name: default_name(),
			log_level: default_log_level(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
	pub rpc_url: String,
	/// Bound into fill signatures when set.
	pub chain_id: Option<u64>,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Blocks to stay behind the head.
	#[serde(default)]
	pub block_delay: u64,
	#[serde(default = "default_call_timeout_ms")]
	pub call_timeout_ms: u64,
	#[serde(default = "default_fill_timeout_ms")]
	pub fill_timeout_ms: u64,
}

impl NetworkConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn fill_timeout(&self) -> Duration {
		Duration::from_millis(self.fill_timeout_ms)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
	/// Uniswap exchange factory.
	pub factory: Address,
	/// UniswapEx order book.
	pub order_book: Address,
	#[serde(default = "default_excluded_tokens")]
	pub excluded_tokens: Vec<Address>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
	/// Last block considered already scanned at first start.
	#[serde(default = "default_watermark")]
	pub watermark: BlockNumber,
	#[serde(default = "default_max_block_jump")]
	pub max_block_jump: u64,
	#[serde(default = "default_cycle_timeout_secs")]
	pub cycle_timeout_secs: u64,
}

impl Default for DiscoveryConfig {
	fn default() -> Self {
		Self {
			watermark: default_watermark(),
			max_block_jump: default_max_block_jump(),
			cycle_timeout_secs: default_cycle_timeout_secs(),
		}
	}
}

impl DiscoveryConfig {
	pub fn cycle_timeout(&self) -> Duration {
		Duration::from_secs(self.cycle_timeout_secs)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_retry_delay_ms")]
	pub delay_ms: u64,
	#[serde(default = "default_multiplier")]
	pub multiplier: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: default_max_attempts(),
			delay_ms: default_retry_delay_ms(),
			multiplier: default_multiplier(),
		}
	}
}

#[derive(Clone, Deserialize)]
pub struct AccountConfig {
	pub private_key: String,
}

impl fmt::Debug for AccountConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AccountConfig")
			.field("private_key", &"<redacted>")
			.finish()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
	/// `memory` or `file`.
	#[serde(default = "default_storage_backend")]
	pub backend: String,
	pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: default_storage_backend(),
			path: None,
		}
	}
}

impl Config {
	/// Retry policy for every remote read.
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_attempts: self.retry.max_attempts,
			delay: Duration::from_millis(self.retry.delay_ms),
			multiplier: self.retry.multiplier,
			call_timeout: match self.network.call_timeout_ms {
				0 => None,
				ms => Some(Duration::from_millis(ms)),
			},
		}
	}
}

fn default_name() -> String {
	"uniswap-ex-keeper".to_string()
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_poll_interval_ms() -> u64 {
	4_000
}

fn default_call_timeout_ms() -> u64 {
	30_000
}

fn default_fill_timeout_ms() -> u64 {
	120_000
}

fn default_excluded_tokens() -> Vec<Address> {
	Address::from_str(USDT_ADDRESS).into_iter().collect()
}

fn default_watermark() -> BlockNumber {
	DEFAULT_WATERMARK
}

fn default_max_block_jump() -> u64 {
	10_000_000
}

fn default_cycle_timeout_secs() -> u64 {
	600
}

fn default_max_attempts() -> u32 {
	5
}

fn default_retry_delay_ms() -> u64 {
	500
}

fn default_multiplier() -> f64 {
	1.5
}

fn default_storage_backend() -> String {
	"memory".to_string()
}
