//! Request/response correlation and event dispatch.
//!
//! # Message flow
//!
//! 1. A proxy calls `send_message()` with guid, method and params
//! 2. The connection assigns a request id and parks a oneshot sender
//! 3. The request is queued on the transport
//! 4. The run loop receives the response and completes the oneshot
//!
//! Messages without an `id` are events. `__create__`, `__dispose__` and
//! `__adopt__` maintain the object tree, everything else is handed to the
//! target object's `on_event`.

mod object_store;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

pub use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};

use crate::channel_owner::{ChannelOwner, DisposeReason, ParentOrConnection};
use crate::error::{Error, Result};
use crate::transport::TransportParts;

/// Boxed future resolving to a registered object.
pub type AsyncChannelOwnerResult<'a> = Pin<Box<dyn Future<Output = Result<Arc<dyn ChannelOwner>>> + Send + 'a>>;

/// What a [`ChannelOwner`] needs from its connection.
pub trait ConnectionLike: Send + Sync {
	/// Sends a call to the remote object `guid` and awaits its result.
	fn send_message(&self, guid: &str, method: &str, params: Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>>;

	/// Registers an object under its guid.
	fn register_object(&self, guid: Arc<str>, object: Arc<dyn ChannelOwner>);

	/// Removes an object from the registry.
	fn unregister_object(&self, guid: &str);

	/// Looks up an object, failing if it is not registered.
	fn get_object(&self, guid: &str) -> AsyncChannelOwnerResult<'_>;

	/// Synchronous lookup.
	fn try_get_object(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>>;

	/// Waits for an object to be registered.
	///
	/// A call result may reference an object whose `__create__` is still in
	/// flight.
	fn wait_for_object(&self, guid: &str, timeout: Duration) -> AsyncChannelOwnerResult<'_>;
}

/// Creates proxies for `__create__` messages.
pub trait ObjectFactory: Send + Sync {
	fn create_object(
		&self,
		parent: ParentOrConnection,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
	) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ChannelOwner>>> + Send + '_>>;
}

/// Metadata attached to every outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
	/// Unix timestamp in milliseconds
	pub wall_time: i64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub internal: Option<bool>,
}

impl Metadata {
	pub fn now() -> Self {
		let wall_time = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_millis() as i64)
			.unwrap_or_default();
		Self {
			wall_time,
			internal: Some(false),
		}
	}
}

/// Outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	pub id: u32,
	pub guid: Arc<str>,
	pub method: String,
	pub params: Value,
	pub metadata: Metadata,
}

/// Inbound call result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub id: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorWrapper>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
	pub error: ErrorPayload,
}

/// Failure reported by the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

/// Inbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub guid: Arc<str>,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Inbound message: responses carry an `id`, events do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	Response(Response),
	Event(Event),
	/// Forward-compatible catch-all
	Unknown(Value),
}

type CallbackMap = Arc<TokioMutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// Removes the parked callback when a call future is dropped before completion.
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		let id = self.id;
		let callbacks = Arc::clone(&self.callbacks);

		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			handle.spawn(async move {
				if callbacks.lock().await.remove(&id).is_some() {
					tracing::debug!(id, "Removed orphaned callback");
				}
			});
		}
	}
}

struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.completed = true;
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Connection to the remote side.
///
/// One connection per remote session; every proxy shares it through its
/// [`Channel`](crate::channel::Channel).
pub struct Connection {
	last_id: AtomicU32,
	callbacks: CallbackMap,
	outbound_tx: mpsc::UnboundedSender<Value>,
	inbound_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	objects: ObjectStore,
	factory: TokioMutex<Option<Arc<dyn ObjectFactory>>>,
	closed: AtomicBool,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts { outbound, inbound } = parts;

		Self {
			last_id: AtomicU32::new(0),
			callbacks: Arc::new(TokioMutex::new(HashMap::new())),
			outbound_tx: outbound,
			inbound_rx: TokioMutex::new(Some(inbound)),
			objects: ObjectStore::new(),
			factory: TokioMutex::new(None),
			closed: AtomicBool::new(false),
		}
	}

	/// Sets the factory used for `__create__`. Must happen before `run()`.
	pub async fn set_factory(&self, factory: Arc<dyn ObjectFactory>) {
		*self.factory.lock().await = Some(factory);
	}

	/// Returns true once the inbound stream has ended.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Returns the object registry.
	pub fn objects(&self) -> &ObjectStore {
		&self.objects
	}

	/// Sends a call and awaits the correlated response.
	pub async fn send_message(&self, guid: &str, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().await.insert(id, tx);

		let guard = CancelGuard {
			id,
			callbacks: Arc::clone(&self.callbacks),
			completed: false,
		};

		// run() sets the flag before draining, so a callback parked after the
		// drain is caught here.
		if self.is_closed() {
			self.callbacks.lock().await.remove(&id);
			return Err(Error::ChannelClosed);
		}

		let request = Request {
			id,
			guid: Arc::from(guid),
			method: method.to_string(),
			params,
			metadata: Metadata::now(),
		};

		tracing::debug!(id, guid, method, "Sending call");

		if self.outbound_tx.send(serde_json::to_value(&request)?).is_err() {
			tracing::error!(id, "Failed to queue call: outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		ResponseFuture { rx, guard }.await
	}

	/// Runs the dispatch loop until the inbound stream ends.
	///
	/// On exit every pending call fails with [`Error::ChannelClosed`].
	pub async fn run(self: &Arc<Self>) {
		let Some(mut inbound) = self.inbound_rx.lock().await.take() else {
			tracing::error!("Connection::run called twice");
			return;
		};

		while let Some(message_value) = inbound.recv().await {
			match serde_json::from_value::<Message>(message_value) {
				Ok(message) => {
					if let Err(e) = self.dispatch_internal(message).await {
						tracing::error!(error = %e, "Error dispatching message");
					}
				}
				Err(e) => tracing::error!(error = %e, "Failed to parse message"),
			}
		}

		self.closed.store(true, Ordering::SeqCst);
		let pending: Vec<_> = self.callbacks.lock().await.drain().collect();
		tracing::debug!(pending = pending.len(), "Connection closed");
		for (_, callback) in pending {
			let _ = callback.send(Err(Error::ChannelClosed));
		}
	}

	#[cfg(test)]
	pub(crate) async fn dispatch(self: &Arc<Self>, message: Message) -> Result<()> {
		self.dispatch_internal(message).await
	}

	async fn dispatch_internal(self: &Arc<Self>, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				tracing::debug!(id = response.id, "Received response");
				let callback = self
					.callbacks
					.lock()
					.await
					.remove(&response.id)
					.ok_or_else(|| Error::ProtocolError(format!("Cannot find request to respond: id={}", response.id)))?;

				let result = match response.error {
					Some(wrapper) => Err(parse_protocol_error(wrapper.error)),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};

				let _ = callback.send(result);
				Ok(())
			}
			Message::Event(event) => match event.method.as_str() {
				"__create__" => self.handle_create(&event).await,
				"__dispose__" => self.handle_dispose(&event),
				"__adopt__" => self.handle_adopt(&event),
				_ => {
					match self.objects.try_get(&event.guid) {
						Some(object) => {
							tracing::debug!(guid = %event.guid, method = %event.method, "Event");
							object.on_event(&event.method, event.params);
						}
						None => tracing::debug!(guid = %event.guid, method = %event.method, "Event for unknown object (ignored)"),
					}
					Ok(())
				}
			},
			Message::Unknown(value) => {
				tracing::debug!(%value, "Unknown message type (ignored)");
				Ok(())
			}
		}
	}

	async fn handle_create(self: &Arc<Self>, event: &Event) -> Result<()> {
		let type_name = event.params["type"]
			.as_str()
			.ok_or_else(|| Error::ProtocolError("__create__ missing 'type'".to_string()))?
			.to_string();

		let object_guid: Arc<str> = Arc::from(
			event.params["guid"]
				.as_str()
				.ok_or_else(|| Error::ProtocolError("__create__ missing 'guid'".to_string()))?,
		);

		let initializer = event.params.get("initializer").cloned().unwrap_or(Value::Object(Default::default()));

		let parent = self
			.objects
			.try_get(&event.guid)
			.ok_or_else(|| Error::ProtocolError(format!("Parent object not found: {}", event.guid)))?;

		let factory = self
			.factory
			.lock()
			.await
			.clone()
			.ok_or_else(|| Error::ProtocolError("ObjectFactory not set - call set_factory() before run()".to_string()))?;

		let object = factory
			.create_object(ParentOrConnection::Parent(parent.clone()), type_name.clone(), object_guid.clone(), initializer)
			.await
			.inspect_err(|e| tracing::debug!(type_name = %type_name, guid = %object_guid, error = %e, "Failed to create object"))?;

		self.objects.insert(object_guid.clone(), object.clone());
		parent.add_child(object_guid.clone(), object);

		tracing::debug!(type_name = %type_name, guid = %object_guid, parent = %event.guid, "Created object");
		Ok(())
	}

	fn handle_dispose(&self, event: &Event) -> Result<()> {
		let reason = match event.params.get("reason").and_then(Value::as_str) {
			Some("gc") => DisposeReason::GarbageCollected,
			_ => DisposeReason::Closed,
		};

		match self.objects.try_get(&event.guid) {
			Some(obj) => obj.dispose(reason),
			None => tracing::debug!(guid = %event.guid, "Dispose for unknown object (ignored)"),
		}
		Ok(())
	}

	fn handle_adopt(&self, event: &Event) -> Result<()> {
		let child_guid = event.params["guid"]
			.as_str()
			.ok_or_else(|| Error::ProtocolError("__adopt__ missing 'guid'".to_string()))?;

		let parent = self
			.objects
			.try_get(&event.guid)
			.ok_or_else(|| Error::ProtocolError(format!("Parent object not found: {}", event.guid)))?;
		let child = self
			.objects
			.try_get(child_guid)
			.ok_or_else(|| Error::ProtocolError(format!("Child object not found: {child_guid}")))?;

		parent.adopt(child);
		tracing::debug!(child = child_guid, new_parent = %event.guid, "Adopted object");
		Ok(())
	}
}

/// Converts a remote [`ErrorPayload`] into [`Error::Remote`].
fn parse_protocol_error(error: ErrorPayload) -> Error {
	Error::Remote {
		name: error.name.unwrap_or_else(|| "Error".to_string()),
		message: error.message,
		stack: error.stack,
	}
}

impl ConnectionLike for Connection {
	fn send_message(&self, guid: &str, method: &str, params: Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>> {
		let guid = guid.to_string();
		let method = method.to_string();
		Box::pin(async move { Connection::send_message(self, &guid, &method, params).await })
	}

	fn register_object(&self, guid: Arc<str>, object: Arc<dyn ChannelOwner>) {
		self.objects.insert(guid, object);
	}

	fn unregister_object(&self, guid: &str) {
		self.objects.remove(guid);
	}

	fn get_object(&self, guid: &str) -> AsyncChannelOwnerResult<'_> {
		let result = self.objects.try_get(guid).ok_or_else(|| Error::ObjectNotFound {
			guid: guid.to_string(),
			expected: None,
		});
		Box::pin(async move { result })
	}

	fn try_get_object(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.objects.try_get(guid)
	}

	fn wait_for_object(&self, guid: &str, timeout: Duration) -> AsyncChannelOwnerResult<'_> {
		let guid = guid.to_string();
		Box::pin(async move { self.objects.wait_for(&guid, timeout).await })
	}
}
