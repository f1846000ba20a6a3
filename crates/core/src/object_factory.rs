//! Maps protocol type names to proxy constructors.
//!
//! When the remote side sends `__create__`, the connection asks the
//! [`NetworkObjectFactory`] for a proxy of the named type. Types this crate
//! does not model become [`UnknownObject`]s so the object tree stays intact.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pw_net_runtime::{ChannelOwner, ChannelOwnerImpl, Error, ObjectFactory, ParentOrConnection, Result};
use serde_json::Value;

use crate::request::PendingRedirects;
use crate::{BrowserContext, Frame, JsHandle, Page, ProxyOptions, Request, Response, Route, Worker};

/// [`ObjectFactory`] for the network and worker proxies.
pub struct NetworkObjectFactory {
	options: Arc<ProxyOptions>,
	redirects: PendingRedirects,
}

impl NetworkObjectFactory {
	pub fn new(options: Arc<ProxyOptions>) -> Self {
		Self {
			options,
			redirects: PendingRedirects::default(),
		}
	}

	fn create(&self, parent: ParentOrConnection, type_name: String, guid: Arc<str>, initializer: Value) -> Result<Arc<dyn ChannelOwner>> {
		let options = Arc::clone(&self.options);

		let object: Arc<dyn ChannelOwner> = match type_name.as_str() {
			"Request" => Arc::new(Request::new(
				require_parent(parent, &type_name)?,
				type_name,
				guid,
				initializer,
				options,
				&self.redirects,
			)?),
			"Response" => Arc::new(Response::new(require_parent(parent, &type_name)?, type_name, guid, initializer)?),
			"Route" => Arc::new(Route::new(require_parent(parent, &type_name)?, type_name, guid, initializer, options)?),
			"Worker" => Arc::new(Worker::new(require_parent(parent, &type_name)?, type_name, guid, initializer, options)?),
			"JSHandle" | "ElementHandle" => Arc::new(JsHandle::new(require_parent(parent, &type_name)?, type_name, guid, initializer)?),
			"Frame" => Arc::new(Frame::new(require_parent(parent, &type_name)?, type_name, guid, initializer)?),
			"Page" => Arc::new(Page::new(require_parent(parent, &type_name)?, type_name, guid, initializer, options)?),
			"BrowserContext" => Arc::new(BrowserContext::new(require_parent(parent, &type_name)?, type_name, guid, initializer, options)?),
			_ => {
				tracing::debug!(type_name = %type_name, guid = %guid, "Creating inert object for unmodeled type");
				Arc::new(UnknownObject {
					base: ChannelOwnerImpl::new(parent, type_name, guid, initializer),
				})
			}
		};

		Ok(object)
	}
}

impl ObjectFactory for NetworkObjectFactory {
	fn create_object(
		&self,
		parent: ParentOrConnection,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
	) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ChannelOwner>>> + Send + '_>> {
		Box::pin(async move { self.create(parent, type_name, guid, initializer) })
	}
}

fn require_parent(parent: ParentOrConnection, type_name: &str) -> Result<Arc<dyn ChannelOwner>> {
	match parent {
		ParentOrConnection::Parent(p) => Ok(p),
		ParentOrConnection::Connection(_) => Err(Error::ProtocolError(format!("{type_name} must have a parent object"))),
	}
}

/// Placeholder for remote objects of types this crate does not model.
///
/// Takes part in the object tree (children, dispose, adopt) and ignores events.
#[derive(Clone)]
pub struct UnknownObject {
	base: ChannelOwnerImpl,
}

impl UnknownObject {
	fn handle_event(&self, method: &str, params: Value) {
		self.base.on_event(method, params)
	}
}

pw_net_runtime::delegate_channel_owner!(UnknownObject);

impl std::fmt::Debug for UnknownObject {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UnknownObject")
			.field("type_name", &self.base.type_name())
			.field("guid", &self.base.guid())
			.finish()
	}
}
