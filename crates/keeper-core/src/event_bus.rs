//! Broadcast channel for keeper events.

use keeper_types::KeeperEvent;
use tokio::sync::broadcast;

/// Fan-out of [`KeeperEvent`]s to any number of subscribers.
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<KeeperEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Receives every event published after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<KeeperEvent> {
		self.sender.subscribe()
	}

	/// Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: KeeperEvent,
	) -> Result<(), broadcast::error::SendError<KeeperEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}
