//! Callback registration shared by owners and workers.
//!
//! Handlers live in a [`HandlerMap`] ([`IndexMap`] keyed by [`HandlerId`]):
//! O(1) removal, stable registration order. A [`Subscription`] removes its
//! handler when dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Unique identifier for a registered handler.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Boxed async handler future.
pub type HandlerFuture = Pin<Box<dyn Future<Output = pw_net_runtime::Result<()>> + Send>>;

/// Handler function: `E` to async `Result<()>`.
pub type HandlerFn<E> = Arc<dyn Fn(E) -> HandlerFuture + Send + Sync>;

/// Registered handler with metadata `M` (e.g. [`RouteMeta`] for route globs).
pub struct HandlerEntry<E, M = ()> {
	pub id: HandlerId,
	pub meta: M,
	pub handler: HandlerFn<E>,
}

impl<E, M: Clone> Clone for HandlerEntry<E, M> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			meta: self.meta.clone(),
			handler: Arc::clone(&self.handler),
		}
	}
}

pub type HandlerMap<E, M = ()> = Arc<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>>;

/// Wraps an async closure into a [`HandlerFn`].
pub(crate) fn boxed_handler<E, F, Fut>(handler: F) -> HandlerFn<E>
where
	E: 'static,
	F: Fn(E) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = pw_net_runtime::Result<()>> + Send + 'static,
{
	Arc::new(move |event: E| -> HandlerFuture { Box::pin(handler(event)) })
}

/// Registers `handler` in `map` and returns its subscription.
pub(crate) fn register<E, M>(map: &HandlerMap<E, M>, meta: M, handler: HandlerFn<E>) -> Subscription
where
	E: Send + Sync + 'static,
	M: Send + Sync + 'static,
{
	let id = next_handler_id();
	map.lock().insert(id, HandlerEntry { id, meta, handler });
	Subscription::from_handler_map(id, map)
}

/// URL matcher compiled once at registration.
#[derive(Clone)]
pub struct RouteMatcher {
	source: String,
	pattern: Option<glob::Pattern>,
}

impl RouteMatcher {
	/// Compiles a glob such as `**/*.png`; an invalid glob matches its text literally.
	pub fn new(pattern: &str) -> Self {
		Self {
			source: pattern.to_string(),
			pattern: glob::Pattern::new(pattern).ok(),
		}
	}

	pub fn is_match(&self, url: &str) -> bool {
		match &self.pattern {
			Some(pattern) => pattern.matches(url),
			None => self.source == url,
		}
	}

	pub fn as_str(&self) -> &str {
		&self.source
	}
}

/// Route handler metadata.
#[derive(Clone)]
pub struct RouteMeta {
	pub matcher: RouteMatcher,
}

/// Handle that unregisters a handler on drop.
///
/// Holds the handler map weakly, so outliving the owner is harmless.
pub struct Subscription {
	id: HandlerId,
	dropper: Option<Arc<dyn Fn(HandlerId) + Send + Sync>>,
}

impl Subscription {
	pub fn new(id: HandlerId, dropper: Arc<dyn Fn(HandlerId) + Send + Sync>) -> Self {
		Self { id, dropper: Some(dropper) }
	}

	pub fn from_handler_map<E, M>(id: HandlerId, handlers: &HandlerMap<E, M>) -> Self
	where
		E: Send + Sync + 'static,
		M: Send + Sync + 'static,
	{
		let weak: Weak<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>> = Arc::downgrade(handlers);
		Self::new(
			id,
			Arc::new(move |id: HandlerId| {
				if let Some(map) = weak.upgrade() {
					map.lock().shift_remove(&id);
				}
			}),
		)
	}

	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Unsubscribes now. Same as dropping.
	pub fn unsubscribe(mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.dropper.is_some())
			.finish()
	}
}
