//! [`Frame`] proxy, the issuer recorded on every request.

use std::sync::Arc;

use parking_lot::RwLock;
use pw_net_protocol::FrameInitializer;
use pw_net_runtime::{ChannelOwner, ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde_json::Value;

use crate::Page;
use crate::lookup::resolve;

/// A frame within a [`Page`].
///
/// See <https://playwright.dev/docs/api/class-frame>
#[derive(Clone)]
pub struct Frame {
	base: ChannelOwnerImpl,
	url: Arc<RwLock<String>>,
	name: Arc<str>,
	parent_frame: Option<Arc<str>>,
}

impl Frame {
	pub fn new(parent: Arc<dyn ChannelOwner>, type_name: String, guid: Arc<str>, initializer: Value) -> Result<Self> {
		let init: FrameInitializer =
			serde_json::from_value(initializer.clone()).map_err(|e| Error::ProtocolError(format!("Invalid Frame initializer for {guid}: {e}")))?;

		Ok(Self {
			base: ChannelOwnerImpl::new(ParentOrConnection::Parent(parent), type_name, guid, initializer),
			url: Arc::new(RwLock::new(init.url)),
			name: Arc::from(init.name),
			parent_frame: init.parent_frame.map(|r| Arc::from(r.guid)),
		})
	}

	/// URL of the last committed navigation.
	pub fn url(&self) -> String {
		self.url.read().clone()
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn parent_frame(&self) -> Option<Frame> {
		let guid = self.parent_frame.as_deref()?;
		resolve(&self.connection(), guid, "Frame").ok()
	}

	/// The page this frame belongs to.
	///
	/// Frames are created under their page, so the page is the lifecycle parent.
	pub fn page(&self) -> Option<Page> {
		self.base.parent()?.downcast_ref::<Page>().cloned()
	}

	fn handle_event(&self, method: &str, params: Value) {
		match method {
			"navigated" => {
				if let Some(url) = params.get("url").and_then(Value::as_str) {
					*self.url.write() = url.to_string();
				}
			}
			_ => self.base.on_event(method, params),
		}
	}
}

pw_net_runtime::delegate_channel_owner!(Frame);

impl std::fmt::Debug for Frame {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Frame")
			.field("guid", &self.guid())
			.field("name", &self.name)
			.field("url", &self.url())
			.finish()
	}
}
