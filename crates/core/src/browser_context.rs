//! [`BrowserContext`] proxy: owner of service workers.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use pw_net_protocol::GuidRef;
use pw_net_runtime::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::events::{EventBus, EventStream};
use crate::lookup::resolve;
use crate::worker::WorkerOwner;
use crate::{Page, ProxyOptions, Worker};

/// An isolated browser session holding pages and service workers.
///
/// See <https://playwright.dev/docs/api/class-browsercontext>
#[derive(Clone)]
pub struct BrowserContext {
	base: ChannelOwnerImpl,
	service_workers: Arc<Mutex<IndexMap<Arc<str>, Worker>>>,
	service_worker_bus: Arc<EventBus<Worker>>,
}

impl BrowserContext {
	pub fn new(parent: Arc<dyn ChannelOwner>, type_name: String, guid: Arc<str>, initializer: Value, options: Arc<ProxyOptions>) -> Result<Self> {
		Ok(Self {
			base: ChannelOwnerImpl::new(ParentOrConnection::Parent(parent), type_name, guid, initializer),
			service_workers: Arc::new(Mutex::new(IndexMap::new())),
			service_worker_bus: Arc::new(EventBus::new(options.event_capacity)),
		})
	}

	/// Pages created in this context.
	pub fn pages(&self) -> Vec<Page> {
		self.base
			.children()
			.into_iter()
			.filter_map(|child| child.downcast_ref::<Page>().cloned())
			.collect()
	}

	/// Service workers currently registered in this context.
	///
	/// See <https://playwright.dev/docs/api/class-browsercontext#browser-context-service-workers>
	pub fn service_workers(&self) -> Vec<Worker> {
		self.service_workers.lock().values().cloned().collect()
	}

	/// Stream of service workers registered after this call.
	pub fn service_worker_events(&self) -> EventStream<Worker> {
		self.service_worker_bus.subscribe()
	}

	/// Drops `guid` from the service worker set. Returns false if it was not listed.
	pub fn remove_service_worker(&self, guid: &str) -> bool {
		self.service_workers.lock().shift_remove(guid).is_some()
	}

	fn on_service_worker(&self, params: Value) {
		#[derive(Deserialize)]
		struct ServiceWorkerEvent {
			worker: GuidRef,
		}

		let event: ServiceWorkerEvent = match serde_json::from_value(params) {
			Ok(event) => event,
			Err(e) => {
				tracing::warn!(guid = %self.guid(), error = %e, "Malformed serviceWorker event");
				return;
			}
		};

		let worker = match resolve::<Worker>(&self.connection(), &event.worker.guid, "Worker") {
			Ok(worker) => worker,
			Err(e) => {
				tracing::warn!(guid = %self.guid(), worker = %event.worker.guid, error = %e, "serviceWorker event for unknown worker");
				return;
			}
		};

		worker.set_owner(WorkerOwner::Context(Arc::from(self.guid())));
		if worker.is_closed() {
			tracing::debug!(guid = %self.guid(), worker = %worker.guid(), "Service worker closed before it was announced");
			return;
		}
		self.service_workers.lock().insert(Arc::from(worker.guid()), worker.clone());
		tracing::debug!(guid = %self.guid(), worker = %worker.guid(), url = %worker.url(), "Service worker registered");
		self.service_worker_bus.emit(worker);
	}

	fn handle_event(&self, method: &str, params: Value) {
		match method {
			"serviceWorker" => self.on_service_worker(params),
			_ => self.base.on_event(method, params),
		}
	}
}

pw_net_runtime::delegate_channel_owner!(BrowserContext);

impl std::fmt::Debug for BrowserContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BrowserContext")
			.field("guid", &self.guid())
			.field("service_workers", &self.service_workers.lock().len())
			.finish()
	}
}
