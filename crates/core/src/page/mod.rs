//! [`Page`] proxy: owner of web workers and route handlers.

mod routing;

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use pw_net_protocol::{GuidRef, PageInitializer};
use pw_net_runtime::{ChannelOwner, ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::events::{EventBus, EventStream, EventWaiter};
use crate::handlers::{HandlerMap, RouteMeta};
use crate::lookup::resolve;
use crate::worker::WorkerOwner;
use crate::{BrowserContext, Frame, ProxyOptions, Request, Route, Worker};

#[derive(Deserialize)]
struct WorkerEvent {
	worker: GuidRef,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestFailedEvent {
	request: GuidRef,
	#[serde(default)]
	failure_text: String,
}

#[derive(Deserialize)]
struct RouteEvent {
	route: GuidRef,
}

/// A browser tab within a [`BrowserContext`].
///
/// See <https://playwright.dev/docs/api/class-page>
#[derive(Clone)]
pub struct Page {
	base: ChannelOwnerImpl,
	main_frame_guid: Arc<str>,
	/// Live web workers, in spawn order.
	workers: Arc<Mutex<IndexMap<Arc<str>, Worker>>>,
	worker_bus: Arc<EventBus<Worker>>,
	/// Route handlers for network interception (with compiled matchers).
	route_handlers: HandlerMap<Route, RouteMeta>,
}

impl Page {
	pub fn new(parent: Arc<dyn ChannelOwner>, type_name: String, guid: Arc<str>, initializer: Value, options: Arc<ProxyOptions>) -> Result<Self> {
		let init: PageInitializer =
			serde_json::from_value(initializer.clone()).map_err(|e| Error::ProtocolError(format!("Invalid Page initializer for {guid}: {e}")))?;

		Ok(Self {
			base: ChannelOwnerImpl::new(ParentOrConnection::Parent(parent), type_name, guid, initializer),
			main_frame_guid: Arc::from(init.main_frame.guid),
			workers: Arc::new(Mutex::new(IndexMap::new())),
			worker_bus: Arc::new(EventBus::new(options.event_capacity)),
			route_handlers: Arc::new(Mutex::new(IndexMap::new())),
		})
	}

	pub fn main_frame(&self) -> Result<Frame> {
		resolve(&self.connection(), &self.main_frame_guid, "Frame")
	}

	/// The browser context this page was opened in.
	pub fn context(&self) -> Option<BrowserContext> {
		self.base.parent()?.downcast_ref::<BrowserContext>().cloned()
	}

	/// Web workers currently running in this page.
	///
	/// See <https://playwright.dev/docs/api/class-page#page-workers>
	pub fn workers(&self) -> Vec<Worker> {
		self.workers.lock().values().cloned().collect()
	}

	/// Stream of workers spawned after this call.
	///
	/// See <https://playwright.dev/docs/api/class-page#page-event-worker>
	pub fn worker_events(&self) -> EventStream<Worker> {
		self.worker_bus.subscribe()
	}

	/// Returns a waiter for the next spawned worker matching `predicate`.
	///
	/// Register the waiter before triggering the spawn.
	pub fn expect_worker<F>(&self, predicate: F, timeout: Duration) -> EventWaiter<Worker>
	where
		F: Fn(&Worker) -> bool + Send + Sync + 'static,
	{
		EventWaiter::new(self.worker_bus.register_waiter(predicate), timeout)
	}

	/// Drops `guid` from the worker set. Returns false if it was not listed.
	pub fn remove_worker(&self, guid: &str) -> bool {
		self.workers.lock().shift_remove(guid).is_some()
	}

	fn on_worker(&self, params: Value) {
		let event: WorkerEvent = match serde_json::from_value(params) {
			Ok(event) => event,
			Err(e) => {
				tracing::warn!(guid = %self.guid(), error = %e, "Malformed worker event");
				return;
			}
		};

		let worker = match resolve::<Worker>(&self.connection(), &event.worker.guid, "Worker") {
			Ok(worker) => worker,
			Err(e) => {
				tracing::warn!(guid = %self.guid(), worker = %event.worker.guid, error = %e, "Worker event for unknown worker");
				return;
			}
		};

		worker.set_owner(WorkerOwner::Page(Arc::from(self.guid())));
		if worker.is_closed() {
			tracing::debug!(guid = %self.guid(), worker = %worker.guid(), "Worker closed before it was announced");
			return;
		}
		self.workers.lock().insert(Arc::from(worker.guid()), worker.clone());
		tracing::debug!(guid = %self.guid(), worker = %worker.guid(), url = %worker.url(), "Worker spawned");
		self.worker_bus.emit(worker);
	}

	fn on_request_failed(&self, params: Value) {
		let event: RequestFailedEvent = match serde_json::from_value(params) {
			Ok(event) => event,
			Err(e) => {
				tracing::warn!(guid = %self.guid(), error = %e, "Malformed requestFailed event");
				return;
			}
		};

		match resolve::<Request>(&self.connection(), &event.request.guid, "Request") {
			Ok(request) => {
				request.set_failure(event.failure_text);
			}
			Err(e) => tracing::warn!(request = %event.request.guid, error = %e, "requestFailed for unknown request"),
		}
	}

	fn handle_event(&self, method: &str, params: Value) {
		match method {
			"worker" => self.on_worker(params),
			"requestFailed" => self.on_request_failed(params),
			"route" => {
				let event: RouteEvent = match serde_json::from_value(params) {
					Ok(event) => event,
					Err(e) => {
						tracing::warn!(guid = %self.guid(), error = %e, "Malformed route event");
						return;
					}
				};

				let route = match resolve::<Route>(&self.connection(), &event.route.guid, "Route") {
					Ok(route) => route,
					Err(e) => {
						tracing::error!(route = %event.route.guid, error = %e, "Failed to get route object");
						return;
					}
				};

				let page = self.clone();
				tokio::spawn(async move { page.on_route_event(route).await });
			}
			_ => self.base.on_event(method, params),
		}
	}
}

pw_net_runtime::delegate_channel_owner!(Page);

impl std::fmt::Debug for Page {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Page")
			.field("guid", &self.guid())
			.field("main_frame", &self.main_frame_guid)
			.field("workers", &self.workers.lock().len())
			.finish()
	}
}
