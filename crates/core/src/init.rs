//! Wiring the proxies into a connection.

use std::sync::Arc;
use std::time::Duration;

use pw_net_protocol::DEFAULT_ABORT_ERROR_CODE;
use pw_net_runtime::{ChannelOwner, Connection, ConnectionLike};

use crate::Root;
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::normalize::{DefaultNormalizer, Normalizer};
use crate::object_factory::NetworkObjectFactory;

/// How long a proxy waits for an object referenced by a call result to be created.
pub const DEFAULT_OBJECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings shared by every proxy created on a connection.
#[derive(Clone)]
pub struct ProxyOptions {
	/// Resolves route overrides before dispatch
	pub normalizer: Arc<dyn Normalizer>,
	/// Wait for objects named by call results (responses, handles)
	pub object_timeout: Duration,
	/// Error code sent by `Route::abort(None)`
	pub default_abort_error_code: String,
	/// Broadcast capacity of worker and owner event streams
	pub event_capacity: usize,
}

impl Default for ProxyOptions {
	fn default() -> Self {
		Self {
			normalizer: Arc::new(DefaultNormalizer),
			object_timeout: DEFAULT_OBJECT_TIMEOUT,
			default_abort_error_code: DEFAULT_ABORT_ERROR_CODE.to_string(),
			event_capacity: DEFAULT_EVENT_CAPACITY,
		}
	}
}

impl ProxyOptions {
	pub fn builder() -> ProxyOptionsBuilder {
		ProxyOptionsBuilder::default()
	}
}

impl std::fmt::Debug for ProxyOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProxyOptions")
			.field("object_timeout", &self.object_timeout)
			.field("default_abort_error_code", &self.default_abort_error_code)
			.field("event_capacity", &self.event_capacity)
			.finish_non_exhaustive()
	}
}

/// Builder for ProxyOptions.
#[derive(Debug, Clone, Default)]
pub struct ProxyOptionsBuilder {
	inner: ProxyOptions,
}

impl ProxyOptionsBuilder {
	pub fn normalizer(mut self, normalizer: impl Normalizer + 'static) -> Self {
		self.inner.normalizer = Arc::new(normalizer);
		self
	}

	pub fn object_timeout(mut self, timeout: Duration) -> Self {
		self.inner.object_timeout = timeout;
		self
	}

	pub fn default_abort_error_code(mut self, code: impl Into<String>) -> Self {
		self.inner.default_abort_error_code = code.into();
		self
	}

	pub fn event_capacity(mut self, capacity: usize) -> Self {
		self.inner.event_capacity = capacity;
		self
	}

	pub fn build(self) -> ProxyOptions {
		self.inner
	}
}

/// Installs the proxy factory on `connection` and registers the [`Root`]
/// object under the empty guid.
///
/// Call before [`Connection::run`]; the remote side then creates top-level
/// objects with `""` as their parent.
pub async fn attach(connection: &Arc<Connection>, options: ProxyOptions) -> Root {
	let options = Arc::new(options);
	connection.set_factory(Arc::new(NetworkObjectFactory::new(options.clone()))).await;

	let root = Root::new(Arc::clone(connection) as Arc<dyn ConnectionLike>, options);
	connection.register_object(Arc::from(""), Arc::new(root.clone()) as Arc<dyn ChannelOwner>);

	tracing::debug!("Root object registered");
	root
}
