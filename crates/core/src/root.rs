//! [`Root`] object: parent of everything the remote side creates at top level.

use std::sync::Arc;
use std::time::Duration;

use pw_net_runtime::{ChannelOwner, ChannelOwnerImpl, ConnectionLike, ParentOrConnection, Result};
use serde_json::Value;

use crate::ProxyOptions;
use crate::lookup::{resolve, resolve_wait};

/// Registered under the empty guid by [`attach`](crate::attach).
///
/// Also the entry point for looking up proxies by guid.
#[derive(Clone)]
pub struct Root {
	base: ChannelOwnerImpl,
	options: Arc<ProxyOptions>,
}

impl Root {
	pub(crate) fn new(connection: Arc<dyn ConnectionLike>, options: Arc<ProxyOptions>) -> Self {
		Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Connection(connection),
				"Root".to_string(),
				Arc::from(""),
				Value::Object(Default::default()),
			),
			options,
		}
	}

	/// Returns the options proxies on this connection were created with.
	pub fn options(&self) -> &ProxyOptions {
		&self.options
	}

	/// Looks up a live proxy of type `T` by guid.
	pub fn object<T: ChannelOwner + Clone>(&self, guid: &str) -> Result<T> {
		resolve(&self.base.connection(), guid, std::any::type_name::<T>())
	}

	/// Waits for the proxy `guid` to be created, then returns it as `T`.
	pub async fn wait_for<T: ChannelOwner + Clone>(&self, guid: &str, timeout: Duration) -> Result<T> {
		resolve_wait(&self.base.connection(), guid, std::any::type_name::<T>(), timeout).await
	}

	fn handle_event(&self, method: &str, params: Value) {
		self.base.on_event(method, params)
	}
}

pw_net_runtime::delegate_channel_owner!(Root);

impl std::fmt::Debug for Root {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Root").finish_non_exhaustive()
	}
}
