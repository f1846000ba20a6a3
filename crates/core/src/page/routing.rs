//! Route handling methods for [`Page`].

use std::future::Future;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use pw_net_runtime::{Channel, Result};
use serde_json::{Value, json};

use super::Page;
use crate::Route;
use crate::handlers::{HandlerEntry, HandlerId, HandlerMap, RouteMatcher, RouteMeta, Subscription, boxed_handler, next_handler_id};

type RouteHandlers = Mutex<IndexMap<HandlerId, HandlerEntry<Route, RouteMeta>>>;

impl Page {
	/// Registers a route handler for network interception.
	///
	/// When a request URL matches `pattern` (glob, e.g. `**/*.png`) the
	/// handler receives a [`Route`] to abort, continue or fulfill. If several
	/// handlers match, the one registered last wins. Requests no handler
	/// matches are continued unchanged.
	///
	/// Returns a [`Subscription`] that unregisters the handler when dropped
	/// and sends the remaining patterns to the remote side.
	///
	/// See <https://playwright.dev/docs/api/class-page#page-route>
	pub async fn route<F, Fut>(&self, pattern: &str, handler: F) -> Result<Subscription>
	where
		F: Fn(Route) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		let id = next_handler_id();
		let meta = RouteMeta {
			matcher: RouteMatcher::new(pattern),
		};
		self.route_handlers.lock().insert(
			id,
			HandlerEntry {
				id,
				meta,
				handler: boxed_handler(handler),
			},
		);
		let subscription = Subscription::new(id, route_dropper(&self.route_handlers, self.base.channel().clone()));

		self.enable_network_interception().await?;
		Ok(subscription)
	}

	/// Sends current route patterns to the remote side.
	pub(super) async fn enable_network_interception(&self) -> Result<()> {
		send_patterns(self.base.channel(), interception_patterns(&self.route_handlers)).await
	}

	/// Dispatches a route event to the matching handler (last-registered wins).
	pub(super) async fn on_route_event(&self, route: Route) {
		let url = match route.request() {
			Ok(request) => request.url().to_string(),
			Err(e) => {
				tracing::warn!(route = ?route, error = %e, "Route without resolvable request, continuing");
				if let Err(e) = route.continue_(None).await {
					tracing::error!(route = ?route, error = %e, "Failed to continue route");
				}
				return;
			}
		};

		let handler = {
			let handlers = self.route_handlers.lock();
			handlers
				.values()
				.rev()
				.find(|entry| entry.meta.matcher.is_match(&url))
				.map(|entry| entry.handler.clone())
		};

		let result = match handler {
			Some(handler) => handler(route).await,
			None => {
				tracing::debug!(url = %url, "No route handler matched, continuing");
				route.continue_(None).await
			}
		};

		if let Err(e) = result {
			tracing::error!(url = %url, error = %e, "Route handler error");
		}
	}
}

fn interception_patterns(handlers: &RouteHandlers) -> Value {
	let patterns: Vec<_> = handlers
		.lock()
		.values()
		.map(|entry| json!({ "glob": entry.meta.matcher.as_str() }))
		.collect();
	json!({ "patterns": patterns })
}

async fn send_patterns(channel: &Channel, patterns: Value) -> Result<()> {
	channel.send_no_result("setNetworkInterceptionPatterns", patterns).await
}

/// Removes a route handler and narrows interception to the patterns left.
fn route_dropper(handlers: &HandlerMap<Route, RouteMeta>, channel: Channel) -> Arc<dyn Fn(HandlerId) + Send + Sync> {
	let weak: Weak<RouteHandlers> = Arc::downgrade(handlers);
	Arc::new(move |id: HandlerId| {
		let Some(handlers) = weak.upgrade() else {
			return;
		};
		if handlers.lock().shift_remove(&id).is_none() {
			return;
		}

		let patterns = interception_patterns(&handlers);
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			tracing::debug!(guid = %channel.guid(), "No runtime to update interception patterns");
			return;
		};
		let channel = channel.clone();
		runtime.spawn(async move {
			if let Err(e) = send_patterns(&channel, patterns).await {
				tracing::warn!(guid = %channel.guid(), error = %e, "Failed to update interception patterns");
			}
		});
	})
}
