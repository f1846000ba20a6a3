//! [`Worker`] proxy for web and service workers.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use pw_net_protocol::{GuidRef, WorkerInitializer};
use pw_net_runtime::{ChannelOwner, ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::events::{EventBus, EventStream, EventWaiter};
use crate::handlers::{HandlerMap, Subscription, boxed_handler, register};
use crate::lookup::{resolve, resolve_wait};
use crate::serialize::{is_function, parse_result, serialize_argument};
use crate::{BrowserContext, JsHandle, Page, ProxyOptions};

/// Emitted once when a worker is closed by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerClosed {
	pub guid: Arc<str>,
	pub url: String,
}

/// Collection a worker is listed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerOwner {
	/// Web worker spawned by a page
	Page(Arc<str>),
	/// Service worker registered in a browser context
	Context(Arc<str>),
}

#[derive(Deserialize)]
struct EvaluateResult {
	value: Value,
}

#[derive(Deserialize)]
struct HandleResult {
	handle: GuidRef,
}

/// A dedicated web worker or a service worker.
///
/// The owning [`Page`] or [`BrowserContext`] is recorded by guid when it
/// announces the worker. On close the worker drops itself from that
/// owner's collection and notifies listeners, once, however many close
/// events arrive.
///
/// See <https://playwright.dev/docs/api/class-worker>
#[derive(Clone)]
pub struct Worker {
	base: ChannelOwnerImpl,
	url: Arc<str>,
	owner: Arc<OnceLock<WorkerOwner>>,
	closed: Arc<AtomicBool>,
	close_bus: Arc<EventBus<WorkerClosed>>,
	close_handlers: HandlerMap<WorkerClosed>,
	options: Arc<ProxyOptions>,
}

impl Worker {
	pub fn new(parent: Arc<dyn ChannelOwner>, type_name: String, guid: Arc<str>, initializer: Value, options: Arc<ProxyOptions>) -> Result<Self> {
		let init: WorkerInitializer =
			serde_json::from_value(initializer.clone()).map_err(|e| Error::ProtocolError(format!("Invalid Worker initializer for {guid}: {e}")))?;

		Ok(Self {
			base: ChannelOwnerImpl::new(ParentOrConnection::Parent(parent), type_name, guid, initializer),
			url: Arc::from(init.url),
			owner: Arc::new(OnceLock::new()),
			closed: Arc::new(AtomicBool::new(false)),
			close_bus: Arc::new(EventBus::new(options.event_capacity)),
			close_handlers: Arc::new(Mutex::new(IndexMap::new())),
			options,
		})
	}

	/// Script URL the worker was started from.
	pub fn url(&self) -> &str {
		&self.url
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Page that spawned this web worker.
	///
	/// `None` for service workers, or if the page is gone.
	pub fn page(&self) -> Option<Page> {
		match self.owner.get()? {
			WorkerOwner::Page(guid) => resolve(&self.connection(), guid, "Page").ok(),
			WorkerOwner::Context(_) => None,
		}
	}

	/// Browser context this service worker is registered in.
	pub fn context(&self) -> Option<BrowserContext> {
		match self.owner.get()? {
			WorkerOwner::Context(guid) => resolve(&self.connection(), guid, "BrowserContext").ok(),
			WorkerOwner::Page(_) => None,
		}
	}

	pub(crate) fn set_owner(&self, owner: WorkerOwner) {
		if let Err(rejected) = self.owner.set(owner) {
			tracing::warn!(guid = %self.guid(), existing = ?self.owner.get(), ?rejected, "Worker already has an owner");
		}
	}

	/// Evaluates `expression` in the worker and deserializes the result.
	///
	/// `expression` may be a plain expression or function source; functions
	/// are called with `arg`.
	///
	/// # Errors
	///
	/// - [`Error::TargetClosed`] if the worker has already closed
	/// - [`Error::Remote`] if the expression throws
	/// - [`Error::Evaluation`] if the result does not deserialize into `T`
	///
	/// See <https://playwright.dev/docs/api/class-worker#worker-evaluate>
	pub async fn evaluate<T: DeserializeOwned>(&self, expression: &str, arg: impl Serialize) -> Result<T> {
		let value = self.evaluate_value(expression, arg).await?;
		serde_json::from_value(value).map_err(|e| Error::Evaluation(format!("Cannot deserialize evaluation result: {e}")))
	}

	/// Evaluates `expression` and returns the result as JSON.
	pub async fn evaluate_value(&self, expression: &str, arg: impl Serialize) -> Result<Value> {
		self.ensure_open("evaluate")?;
		let params = evaluate_params(expression, &arg)?;
		tracing::debug!(guid = %self.guid(), "Evaluating in worker");

		let result: EvaluateResult = self.base.channel().send("evaluateExpression", params).await?;
		parse_result(&result.value)
	}

	/// Evaluates `expression` and returns a handle to the still-remote result.
	///
	/// See <https://playwright.dev/docs/api/class-worker#worker-evaluate-handle>
	pub async fn evaluate_handle(&self, expression: &str, arg: impl Serialize) -> Result<JsHandle> {
		self.ensure_open("evaluate_handle")?;
		let params = evaluate_params(expression, &arg)?;
		let result: HandleResult = self.base.channel().send("evaluateExpressionHandle", params).await?;
		resolve_wait(&self.connection(), &result.handle.guid, "JSHandle", self.options.object_timeout).await
	}

	/// Registers a handler run when the worker closes.
	///
	/// Handlers registered after the close never run.
	pub fn on_close<F, Fut>(&self, handler: F) -> Subscription
	where
		F: Fn(WorkerClosed) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		register(&self.close_handlers, (), boxed_handler(handler))
	}

	/// Stream of close notifications emitted after this call.
	pub fn close_events(&self) -> EventStream<WorkerClosed> {
		self.close_bus.subscribe()
	}

	/// Waits for the worker to close. Resolves at once if it already has.
	pub async fn wait_for_close(&self, timeout: Duration) -> Result<WorkerClosed> {
		if self.is_closed() {
			return Ok(self.closed_event());
		}
		let rx = self.close_bus.register_waiter(|_| true);
		// Close may have run between the check and the registration.
		if self.is_closed() {
			return Ok(self.closed_event());
		}
		EventWaiter::new(rx, timeout).wait().await
	}

	fn ensure_open(&self, operation: &'static str) -> Result<()> {
		if self.is_closed() {
			return Err(Error::TargetClosed {
				target_type: "worker",
				guid: self.guid().to_string(),
				operation,
			});
		}
		Ok(())
	}

	fn closed_event(&self) -> WorkerClosed {
		WorkerClosed {
			guid: Arc::from(self.guid()),
			url: self.url.to_string(),
		}
	}

	/// Runs the close sequence the first time only.
	fn on_closed(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			tracing::debug!(guid = %self.guid(), "Duplicate worker close ignored");
			return;
		}

		let removed = match self.owner.get() {
			Some(WorkerOwner::Page(guid)) => match resolve::<Page>(&self.connection(), guid, "Page") {
				Ok(page) => page.remove_worker(self.guid()),
				Err(e) => {
					tracing::debug!(guid = %self.guid(), page = %guid, error = %e, "Owning page gone");
					false
				}
			},
			Some(WorkerOwner::Context(guid)) => match resolve::<BrowserContext>(&self.connection(), guid, "BrowserContext") {
				Ok(context) => context.remove_service_worker(self.guid()),
				Err(e) => {
					tracing::debug!(guid = %self.guid(), context = %guid, error = %e, "Owning context gone");
					false
				}
			},
			None => false,
		};
		tracing::debug!(guid = %self.guid(), url = %self.url, removed, "Worker closed");

		let event = self.closed_event();
		self.close_bus.emit(event.clone());

		let handlers: Vec<_> = self.close_handlers.lock().values().map(|entry| entry.handler.clone()).collect();
		for handler in handlers {
			let event = event.clone();
			tokio::spawn(async move {
				if let Err(e) = handler(event).await {
					tracing::error!(error = %e, "Worker close handler error");
				}
			});
		}
	}

	fn handle_event(&self, method: &str, params: Value) {
		match method {
			"close" | "closed" => self.on_closed(),
			_ => self.base.on_event(method, params),
		}
	}
}

pw_net_runtime::delegate_channel_owner!(Worker);

impl std::fmt::Debug for Worker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Worker")
			.field("guid", &self.guid())
			.field("url", &self.url)
			.field("closed", &self.is_closed())
			.finish()
	}
}

fn evaluate_params(expression: &str, arg: &impl Serialize) -> Result<Value> {
	Ok(json!({
		"expression": expression,
		"isFunction": is_function(expression),
		"arg": serialize_argument(arg)?,
	}))
}
