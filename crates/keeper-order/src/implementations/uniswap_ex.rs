//! UniswapEx order handler.
//!
//! Checks and fills orders through the order book contract. Read-only checks
//! run under the keeper's [`RetryRunner`]; fills are sent once per cycle and
//! awaited up to a fixed timeout; a mined but reverted fill comes back as a
//! receipt with `success` unset.

use crate::codec::decode_order;
use crate::{DecodeError, HandlerError, OrderHandler};
use alloy::network::EthereumWallet;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;
use keeper_chain::contracts::IUniswapEx;
use keeper_chain::implementations::rpc::classify_contract_error;
use keeper_chain::RetryRunner;
use keeper_types::{Address, FillReceipt, LedgerError, LimitOrder, RawOrder};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct UniswapExHandler {
	order_book: IUniswapEx::IUniswapExInstance<DynProvider>,
	retry: RetryRunner,
	fill_timeout: Duration,
}

impl UniswapExHandler {
	/// Connects a signing provider to the node at `rpc_url`.
	pub fn connect(
		rpc_url: &str,
		wallet: EthereumWallet,
		order_book: Address,
		retry: RetryRunner,
		fill_timeout: Duration,
	) -> Result<Self, HandlerError> {
		let url = rpc_url
			.parse()
			.map_err(|e| LedgerError::Transport(format!("Invalid RPC URL: {}", e)))?;

		let provider = ProviderBuilder::new()
			.wallet(wallet)
			.connect_http(url)
			.erased();

		Ok(Self::with_provider(provider, order_book, retry, fill_timeout))
	}

	pub fn with_provider(
		provider: DynProvider,
		order_book: Address,
		retry: RetryRunner,
		fill_timeout: Duration,
	) -> Self {
		Self {
			order_book: IUniswapEx::new(order_book, provider),
			retry,
			fill_timeout,
		}
	}
}

#[async_trait]
impl OrderHandler for UniswapExHandler {
	fn decode(&self, raw: &RawOrder) -> Result<LimitOrder, DecodeError> {
		decode_order(raw)
	}

	async fn exists(&self, order: &LimitOrder) -> Result<bool, HandlerError> {
		let book = &self.order_book;
		let exists = self
			.retry
			.run("existOrder", move || async move {
				book.existOrder(
					order.sell_asset,
					order.buy_asset,
					order.min_return,
					order.fee,
					order.owner,
				)
				.call()
				.await
				.map_err(classify_contract_error)
			})
			.await?;
		Ok(exists)
	}

	async fn is_ready(&self, order: &LimitOrder) -> Result<bool, HandlerError> {
		let book = &self.order_book;
		let ready = self
			.retry
			.run("canExecuteOrder", move || async move {
				book.canExecuteOrder(
					order.sell_asset,
					order.buy_asset,
					order.min_return,
					order.fee,
					order.owner,
				)
				.call()
				.await
				.map_err(classify_contract_error)
			})
			.await?;
		Ok(ready)
	}

	async fn fill_order(
		&self,
		order: &LimitOrder,
		executor: Address,
	) -> Result<FillReceipt, HandlerError> {
		let pending = self
			.order_book
			.executeOrder(
				order.sell_asset,
				order.buy_asset,
				order.min_return,
				order.fee,
				order.owner,
			)
			.from(executor)
			.send()
			.await
			.map_err(classify_contract_error)?;

		let tx_hash = *pending.tx_hash();
		debug!(%tx_hash, owner = %order.owner, "Fill transaction sent");

		let receipt = tokio::time::timeout(self.fill_timeout, pending.get_receipt())
			.await
			.map_err(|_| HandlerError::Timeout(self.fill_timeout))?
			.map_err(|e| HandlerError::Execution(e.to_string()))?;

		let success = receipt.status();
		if success {
			info!(
				%tx_hash,
				block = ?receipt.block_number,
				gas_used = receipt.gas_used,
				"Fill transaction confirmed"
			);
		} else {
			warn!(%tx_hash, block = ?receipt.block_number, "Fill transaction reverted");
		}

		Ok(FillReceipt {
			tx_hash,
			block_number: receipt.block_number,
			success,
		})
	}
}
