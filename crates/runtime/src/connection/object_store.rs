//! Guid registry with per-guid notification.
//!
//! One live proxy per guid. [`ObjectStore::wait_for`] registers its waiter
//! before checking the map so a concurrent insert cannot be missed.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;

use crate::channel_owner::ChannelOwner;
use crate::error::{Error, Result};

/// Thread-safe registry of proxies by guid.
#[derive(Default)]
pub struct ObjectStore {
	objects: DashMap<Arc<str>, Arc<dyn ChannelOwner>>,
	waiters: DashMap<Arc<str>, Arc<Notify>>,
}

impl ObjectStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts an object and wakes tasks waiting for its guid.
	///
	/// A second insert under the same guid replaces the first and is logged,
	/// the remote side never reuses a live guid.
	pub fn insert(&self, guid: Arc<str>, obj: Arc<dyn ChannelOwner>) {
		if self.objects.insert(guid.clone(), obj).is_some() {
			tracing::warn!(guid = %guid, "Replaced live object with same guid");
		}
		if let Some((_, notify)) = self.waiters.remove(&guid) {
			notify.notify_waiters();
		}
	}

	pub fn remove(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.objects.remove(guid).map(|(_, obj)| obj)
	}

	pub fn try_get(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.objects.get(guid).map(|r| r.value().clone())
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	/// Number of guids some task is still waiting for.
	pub fn pending_waiters(&self) -> usize {
		self.waiters.len()
	}

	/// Waits until `guid` is registered, up to `timeout`.
	pub async fn wait_for(&self, guid: &str, timeout: Duration) -> Result<Arc<dyn ChannelOwner>> {
		let g: Arc<str> = Arc::from(guid);
		let deadline = tokio::time::Instant::now() + timeout;

		loop {
			let notify = self.waiters.entry(g.clone()).or_insert_with(|| Arc::new(Notify::new())).clone();
			let notified = notify.notified();

			if let Some(obj) = self.try_get(&g) {
				drop(notified);
				self.forget_waiter(&g, &notify);
				return Ok(obj);
			}

			let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
			if remaining.is_zero() {
				drop(notified);
				self.forget_waiter(&g, &notify);
				return Err(Error::Timeout(format!("Timeout waiting for object: {g}")));
			}

			tokio::select! {
				biased;
				_ = notified => {}
				_ = tokio::time::sleep(remaining) => {
					self.forget_waiter(&g, &notify);
					return Err(Error::Timeout(format!("Timeout waiting for object: {g}")));
				}
			}
		}
	}

	/// Drops the waiter entry for `guid` unless another task still holds it.
	fn forget_waiter(&self, guid: &str, notify: &Arc<Notify>) {
		// One reference in the map, one held by the caller.
		self.waiters
			.remove_if(guid, |_, current| Arc::ptr_eq(current, notify) && Arc::strong_count(current) <= 2);
	}
}
