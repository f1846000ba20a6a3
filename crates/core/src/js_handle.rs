//! [`JsHandle`] proxy for values that stay on the remote side.

use std::sync::Arc;

use parking_lot::Mutex;
use pw_net_protocol::JsHandleInitializer;
use pw_net_runtime::{ChannelOwner, ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::serialize::parse_result;

/// Reference to a remote value, returned by
/// [`Worker::evaluate_handle`](crate::Worker::evaluate_handle).
///
/// The value is not copied locally until [`json_value`](Self::json_value)
/// asks for it.
///
/// See <https://playwright.dev/docs/api/class-jshandle>
#[derive(Clone)]
pub struct JsHandle {
	base: ChannelOwnerImpl,
	preview: Arc<Mutex<String>>,
}

impl JsHandle {
	pub fn new(parent: Arc<dyn ChannelOwner>, type_name: String, guid: Arc<str>, initializer: Value) -> Result<Self> {
		let init: JsHandleInitializer = serde_json::from_value(initializer.clone()).unwrap_or_default();

		Ok(Self {
			base: ChannelOwnerImpl::new(ParentOrConnection::Parent(parent), type_name, guid, initializer),
			preview: Arc::new(Mutex::new(init.preview)),
		})
	}

	/// Short description of the remote value, kept current by the remote side.
	pub fn preview(&self) -> String {
		self.preview.lock().clone()
	}

	/// Copies the remote value and deserializes it.
	///
	/// See <https://playwright.dev/docs/api/class-jshandle#js-handle-json-value>
	pub async fn json_value<T: DeserializeOwned>(&self) -> Result<T> {
		#[derive(Deserialize)]
		struct JsonValueResult {
			value: Value,
		}

		let result: JsonValueResult = self.base.channel().send_no_params("jsonValue").await?;
		let value = parse_result(&result.value)?;
		serde_json::from_value(value).map_err(|e| Error::Evaluation(format!("Cannot deserialize handle value: {e}")))
	}

	/// Releases the remote value.
	pub async fn dispose(&self) -> Result<()> {
		self.base.channel().send_no_result("dispose", Value::Object(Default::default())).await
	}

	fn handle_event(&self, method: &str, params: Value) {
		match method {
			"previewUpdated" => {
				if let Some(preview) = params.get("preview").and_then(Value::as_str) {
					*self.preview.lock() = preview.to_string();
				}
			}
			_ => self.base.on_event(method, params),
		}
	}
}

pw_net_runtime::delegate_channel_owner!(JsHandle);

impl std::fmt::Debug for JsHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JsHandle")
			.field("guid", &self.guid())
			.field("preview", &self.preview())
			.finish()
	}
}
