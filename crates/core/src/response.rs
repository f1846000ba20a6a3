//! [`Response`] proxy with lazily fetched body.

use std::sync::Arc;

use pw_net_protocol::{ResponseInitializer, base64_bytes};
use pw_net_runtime::{ChannelOwner, ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::headers::{Headers, headers_from_entries};
use crate::lookup::resolve;
use crate::{Frame, Request};

/// Returns true for status 0 (no real HTTP status) and 2xx.
pub(crate) fn is_ok_status(status: u16) -> bool {
	status == 0 || (200..=299).contains(&status)
}

struct ResponseData {
	url: String,
	status: u16,
	status_text: String,
	headers: Headers,
	request_guid: Arc<str>,
}

/// Response received for a [`Request`].
///
/// Status and headers are fixed at creation. The body is never held
/// locally: [`body`](Self::body), [`text`](Self::text) and
/// [`json`](Self::json) each fetch it again from the remote side.
///
/// See <https://playwright.dev/docs/api/class-response>
#[derive(Clone)]
pub struct Response {
	base: ChannelOwnerImpl,
	data: Arc<ResponseData>,
}

impl Response {
	pub fn new(parent: Arc<dyn ChannelOwner>, type_name: String, guid: Arc<str>, initializer: Value) -> Result<Self> {
		let init: ResponseInitializer =
			serde_json::from_value(initializer.clone()).map_err(|e| Error::ProtocolError(format!("Invalid Response initializer for {guid}: {e}")))?;

		let data = ResponseData {
			headers: headers_from_entries(&init.headers),
			url: init.url,
			status: init.status,
			status_text: init.status_text,
			request_guid: Arc::from(init.request.guid),
		};

		Ok(Self {
			base: ChannelOwnerImpl::new(ParentOrConnection::Parent(parent), type_name, guid, initializer),
			data: Arc::new(data),
		})
	}

	pub fn url(&self) -> &str {
		&self.data.url
	}

	pub fn status(&self) -> u16 {
		self.data.status
	}

	pub fn status_text(&self) -> &str {
		&self.data.status_text
	}

	/// True for status 0 or 200-299.
	pub fn ok(&self) -> bool {
		is_ok_status(self.data.status)
	}

	/// Returns a copy of the response headers, keyed by lower-cased name.
	pub fn headers(&self) -> Headers {
		self.data.headers.clone()
	}

	/// The request that produced this response.
	pub fn request(&self) -> Result<Request> {
		resolve(&self.connection(), &self.data.request_guid, "Request")
	}

	/// The frame that issued the request.
	pub fn frame(&self) -> Result<Frame> {
		self.request()?.frame()
	}

	/// Waits for the response to finish loading.
	///
	/// Resolves to `None` on success or to the failure text reported by the
	/// remote side. Safe to call repeatedly.
	pub async fn finished(&self) -> Result<Option<String>> {
		#[derive(Deserialize)]
		struct FinishedResult {
			error: Option<String>,
		}

		let result: FinishedResult = self.base.channel().send_no_params("finished").await?;
		Ok(result.error)
	}

	/// Fetches the response body.
	pub async fn body(&self) -> Result<Vec<u8>> {
		#[derive(Deserialize)]
		struct BodyResult {
			binary: String,
		}

		let result: BodyResult = self.base.channel().send_no_params("body").await?;
		base64_bytes::decode(&result.binary).map_err(|e| Error::ProtocolError(format!("Invalid base64 body for {}: {e}", self.guid())))
	}

	/// Fetches the body and decodes it as UTF-8, replacing invalid sequences.
	pub async fn text(&self) -> Result<String> {
		let body = self.body().await?;
		Ok(String::from_utf8_lossy(&body).into_owned())
	}

	/// Fetches the body and deserializes it as JSON.
	///
	/// # Errors
	///
	/// [`Error::Parse`] if the body is not valid JSON for `T`.
	pub async fn json<T: DeserializeOwned>(&self) -> Result<T> {
		let body = self.body().await?;
		serde_json::from_slice(&body).map_err(|source| Error::Parse {
			context: "response body",
			source,
		})
	}

	/// Shorthand for `json::<serde_json::Value>()`.
	pub async fn json_value(&self) -> Result<Value> {
		self.json().await
	}

	fn handle_event(&self, method: &str, params: Value) {
		self.base.on_event(method, params)
	}
}

pw_net_runtime::delegate_channel_owner!(Response);

impl std::fmt::Debug for Response {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Response")
			.field("guid", &self.guid())
			.field("status", &self.status())
			.field("url", &self.url())
			.finish()
	}
}
