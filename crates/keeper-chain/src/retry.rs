//! Bounded retries for remote calls.
//!
//! Every call the keeper makes to the node goes through a [`RetryRunner`].
//! Transient failures are retried with a backoff delay up to a fixed number of
//! attempts; anything else, including the result-size limit that range queries
//! handle themselves, is returned to the caller on the first occurrence.

use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use keeper_types::LedgerError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
	/// Total attempts per call, including the first.
	pub max_attempts: u32,
	/// Delay before the first retry.
	pub delay: Duration,
	/// Growth factor between consecutive delays; 1.0 keeps the delay fixed.
	pub multiplier: f64,
	/// Upper bound for a single attempt.
	pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			delay: Duration::from_millis(500),
			multiplier: 1.5,
			call_timeout: Some(Duration::from_secs(30)),
		}
	}
}

/// Runs remote calls under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryRunner {
	policy: RetryPolicy,
}

impl RetryRunner {
	pub fn new(policy: RetryPolicy) -> Self {
		Self { policy }
	}

	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.policy.delay)
			.with_multiplier(self.policy.multiplier.max(1.0))
			.with_randomization_factor(0.0)
			.with_max_interval(self.policy.delay.max(Duration::from_secs(60)))
			.with_max_elapsed_time(None)
			.build()
	}

	/// Runs `call` until it succeeds, fails with a non-retryable error, or the
	/// attempt budget is spent. The last error is returned in the latter cases.
	pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, LedgerError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, LedgerError>>,
	{
		let max_attempts = self.policy.max_attempts.max(1);
		let mut backoff = self.backoff();
		let mut attempts = 0;

		loop {
			attempts += 1;

			let outcome = match self.policy.call_timeout {
				Some(limit) => match tokio::time::timeout(limit, call()).await {
					Ok(result) => result,
					Err(_) => Err(LedgerError::Timeout(limit)),
				},
				None => call().await,
			};

			let error = match outcome {
				Ok(value) => return Ok(value),
				Err(e) if !e.is_retryable() => return Err(e),
				Err(e) => e,
			};

			if attempts >= max_attempts {
				warn!(
					"{} failed after {} attempts, giving up: {}",
					operation, attempts, error
				);
				return Err(error);
			}

			let delay = backoff.next_backoff().unwrap_or(self.policy.delay);
			warn!(
				"{} failed, attempt {}/{}, retrying in {:?}: {}",
				operation, attempts, max_attempts, delay, error
			);
			tokio::time::sleep(delay).await;
		}
	}
}
