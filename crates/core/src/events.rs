//! Event delivery for owner and worker notifications.
//!
//! - [`EventBus`] - dispatcher combining a broadcast channel with predicate waiters
//! - [`EventStream`] - broadcast receiver that tolerates lag
//! - [`EventWaiter`] - one-shot capture with timeout
//!
//! Streams see events emitted after they subscribe. Waiters are completed
//! before the broadcast, so a `wait_for_*` call never loses its event to a
//! lagging stream.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use pw_net_runtime::{Error, Result};
use tokio::sync::{broadcast, oneshot};

/// Broadcast capacity used when no other is configured.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

struct WaiterEntry<E> {
	predicate: Box<dyn Fn(&E) -> bool + Send + Sync>,
	complete_tx: oneshot::Sender<E>,
}

/// Broadcast channel plus predicate-based one-shot waiters.
pub(crate) struct EventBus<E: Clone + Send + 'static> {
	tx: broadcast::Sender<E>,
	waiters: Mutex<Vec<WaiterEntry<E>>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self {
			tx,
			waiters: Mutex::new(Vec::new()),
		}
	}

	/// Completes matching waiters, then broadcasts to streams.
	pub fn emit(&self, event: E) {
		{
			let mut waiters = self.waiters.lock();
			let mut i = 0;
			while i < waiters.len() {
				if (waiters[i].predicate)(&event) {
					let entry = waiters.swap_remove(i);
					let _ = entry.complete_tx.send(event.clone());
				} else {
					i += 1;
				}
			}
		}
		let _ = self.tx.send(event);
	}

	pub fn subscribe(&self) -> EventStream<E> {
		EventStream { rx: self.tx.subscribe() }
	}

	/// Registers a waiter for the first event matching `predicate`.
	pub fn register_waiter<F>(&self, predicate: F) -> oneshot::Receiver<E>
	where
		F: Fn(&E) -> bool + Send + Sync + 'static,
	{
		let (complete_tx, complete_rx) = oneshot::channel();
		self.waiters.lock().push(WaiterEntry {
			predicate: Box::new(predicate),
			complete_tx,
		});
		complete_rx
	}

	#[cfg(test)]
	pub fn waiter_count(&self) -> usize {
		self.waiters.lock().len()
	}
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
	fn default() -> Self {
		Self::new(DEFAULT_EVENT_CAPACITY)
	}
}

/// Stream of events from a proxy.
///
/// [`RecvError::Lagged`](broadcast::error::RecvError::Lagged) is logged and
/// skipped instead of ending the stream.
pub struct EventStream<E: Clone + Send + 'static> {
	rx: broadcast::Receiver<E>,
}

impl<E: Clone + Send + 'static> EventStream<E> {
	/// Receives the next event, or `None` once the source is gone.
	pub async fn recv(&mut self) -> Option<E> {
		loop {
			match self.rx.recv().await {
				Ok(event) => return Some(event),
				Err(broadcast::error::RecvError::Lagged(n)) => {
					tracing::warn!(dropped = n, "Event stream lagged, dropped events");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	/// Returns the next event if one is already queued.
	pub fn try_recv(&mut self) -> Option<E> {
		loop {
			match self.rx.try_recv() {
				Ok(event) => return Some(event),
				Err(broadcast::error::TryRecvError::Lagged(n)) => {
					tracing::warn!(dropped = n, "Event stream lagged, dropped events");
				}
				Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => return None,
			}
		}
	}
}

/// One-shot event waiter.
///
/// [`wait`](Self::wait) applies the timeout; awaiting the waiter directly
/// does not.
pub struct EventWaiter<E> {
	rx: oneshot::Receiver<E>,
	timeout: Duration,
}

impl<E: Send + 'static> EventWaiter<E> {
	pub(crate) fn new(rx: oneshot::Receiver<E>, timeout: Duration) -> Self {
		Self { rx, timeout }
	}

	/// Waits for the event.
	///
	/// # Errors
	///
	/// - [`Error::Timeout`] if nothing matched in time
	/// - [`Error::ChannelClosed`] if the event source was dropped
	pub async fn wait(self) -> Result<E> {
		tokio::time::timeout(self.timeout, self.rx)
			.await
			.map_err(|_| Error::Timeout(format!("Timeout {}ms exceeded waiting for event", self.timeout.as_millis())))?
			.map_err(|_| Error::ChannelClosed)
	}
}

impl<E: Send + 'static> Future for EventWaiter<E> {
	type Output = Result<E>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx).poll(cx).map(|r| r.map_err(|_| Error::ChannelClosed))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_waiter_gets_matching_event_and_is_removed() {
		let bus: EventBus<u32> = EventBus::new(4);
		let rx = bus.register_waiter(|n| *n > 1);

		bus.emit(1);
		assert_eq!(bus.waiter_count(), 1);
		bus.emit(2);
		assert_eq!(bus.waiter_count(), 0);

		assert_eq!(EventWaiter::new(rx, Duration::from_secs(1)).wait().await.unwrap(), 2);
	}

	#[tokio::test]
	async fn test_stream_only_sees_later_events() {
		let bus: EventBus<&'static str> = EventBus::default();
		bus.emit("before");

		let mut stream = bus.subscribe();
		bus.emit("after");

		assert_eq!(stream.recv().await, Some("after"));
		assert_eq!(stream.try_recv(), None);
	}

	#[tokio::test]
	async fn test_lagged_stream_keeps_going() {
		let bus: EventBus<u32> = EventBus::new(2);
		let mut stream = bus.subscribe();
		for n in 0..5 {
			bus.emit(n);
		}

		assert_eq!(stream.recv().await, Some(3));
		assert_eq!(stream.recv().await, Some(4));
	}

	#[tokio::test]
	async fn test_waiter_times_out() {
		let bus: EventBus<u32> = EventBus::default();
		let rx = bus.register_waiter(|_| true);

		let err = EventWaiter::new(rx, Duration::from_millis(5)).wait().await.unwrap_err();
		assert!(err.is_timeout());
	}

	#[tokio::test]
	async fn test_waiter_closed_when_bus_dropped() {
		let bus: EventBus<u32> = EventBus::default();
		let rx = bus.register_waiter(|_| true);
		drop(bus);

		assert!(matches!(EventWaiter::new(rx, Duration::from_secs(1)).await, Err(Error::ChannelClosed)));
	}
}
