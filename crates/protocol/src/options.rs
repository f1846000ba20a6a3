//! Option structs for route actions.
//!
//! [`ContinueOptions`] and [`FulfillOptions`] are what callers hand to a route.
//! A normalizer resolves them into [`NormalizedContinue`] and
//! [`NormalizedFulfill`], the fully specified forms dispatched to the driver.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::HeaderEntry;

/// Error code sent with `abort` when the caller does not pick one.
pub const DEFAULT_ABORT_ERROR_CODE: &str = "failed";

/// Status code used by `fulfill` when the caller does not pick one.
pub const DEFAULT_FULFILL_STATUS: u16 = 200;

/// Route continue overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinueOptions {
	/// HTTP method to use instead
	pub method: Option<String>,

	/// Headers replacing the original request headers
	pub headers: Option<HashMap<String, String>>,

	/// Post data replacing the original body
	pub post_data: Option<Vec<u8>>,
}

impl ContinueOptions {
	/// Creates a new builder.
	pub fn builder() -> ContinueOptionsBuilder {
		ContinueOptionsBuilder::default()
	}
}

/// Builder for ContinueOptions.
#[derive(Debug, Clone, Default)]
pub struct ContinueOptionsBuilder {
	inner: ContinueOptions,
}

impl ContinueOptionsBuilder {
	/// Sets the method.
	pub fn method(mut self, method: impl Into<String>) -> Self {
		self.inner.method = Some(method.into());
		self
	}

	/// Sets the headers.
	pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
		self.inner.headers = Some(headers);
		self
	}

	/// Adds a single header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.inner.headers.get_or_insert_with(HashMap::new).insert(name.into(), value.into());
		self
	}

	/// Sets the post data (text or bytes).
	pub fn post_data(mut self, data: impl Into<Vec<u8>>) -> Self {
		self.inner.post_data = Some(data.into());
		self
	}

	/// Builds the options.
	pub fn build(self) -> ContinueOptions {
		self.inner
	}
}

/// Inline body of a fulfilled response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillBody {
	/// UTF-8 text body
	Text(String),
	/// Raw byte body
	Bytes(Vec<u8>),
}

impl FulfillBody {
	/// Returns the body as bytes.
	pub fn as_bytes(&self) -> &[u8] {
		match self {
			Self::Text(text) => text.as_bytes(),
			Self::Bytes(bytes) => bytes,
		}
	}

	/// Consumes the body, returning its bytes.
	pub fn into_bytes(self) -> Vec<u8> {
		match self {
			Self::Text(text) => text.into_bytes(),
			Self::Bytes(bytes) => bytes,
		}
	}
}

impl From<String> for FulfillBody {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}

impl From<&str> for FulfillBody {
	fn from(text: &str) -> Self {
		Self::Text(text.to_string())
	}
}

impl From<Vec<u8>> for FulfillBody {
	fn from(bytes: Vec<u8>) -> Self {
		Self::Bytes(bytes)
	}
}

impl From<&[u8]> for FulfillBody {
	fn from(bytes: &[u8]) -> Self {
		Self::Bytes(bytes.to_vec())
	}
}

/// Route fulfill options.
///
/// The body is given inline ([`body`](Self::body)) or as a file
/// ([`path`](Self::path)), never both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FulfillOptions {
	/// Response status code
	pub status: Option<u16>,

	/// Response headers
	pub headers: Option<HashMap<String, String>>,

	/// Content type, overrides any `content-type` in `headers`
	pub content_type: Option<String>,

	/// Inline response body
	pub body: Option<FulfillBody>,

	/// File whose contents become the response body
	pub path: Option<PathBuf>,
}

impl FulfillOptions {
	/// Creates a new builder.
	pub fn builder() -> FulfillOptionsBuilder {
		FulfillOptionsBuilder::default()
	}
}

/// Builder for FulfillOptions.
#[derive(Debug, Clone, Default)]
pub struct FulfillOptionsBuilder {
	inner: FulfillOptions,
}

impl FulfillOptionsBuilder {
	/// Sets the status code.
	pub fn status(mut self, status: u16) -> Self {
		self.inner.status = Some(status);
		self
	}

	/// Sets the headers.
	pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
		self.inner.headers = Some(headers);
		self
	}

	/// Adds a single header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.inner.headers.get_or_insert_with(HashMap::new).insert(name.into(), value.into());
		self
	}

	/// Sets the body (text or bytes).
	pub fn body(mut self, body: impl Into<FulfillBody>) -> Self {
		self.inner.body = Some(body.into());
		self
	}

	/// Sets the content type.
	pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
		self.inner.content_type = Some(content_type.into());
		self
	}

	/// Serves the body from a file.
	pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
		self.inner.path = Some(path.into());
		self
	}

	/// Builds the options.
	pub fn build(self) -> FulfillOptions {
		self.inner
	}
}

/// Continue overrides after normalization, in wire form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedContinue {
	/// HTTP method override
	#[serde(skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,

	/// Header list override
	#[serde(skip_serializing_if = "Option::is_none")]
	pub headers: Option<Vec<HeaderEntry>>,

	/// Post data override, base64 on the wire
	#[serde(default, with = "crate::base64_bytes::option", skip_serializing_if = "Option::is_none")]
	pub post_data: Option<Vec<u8>>,
}

/// Fulfillment after normalization: every field resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFulfill {
	/// Response status code
	pub status: u16,
	/// Complete header list, including content type and length
	pub headers: Vec<HeaderEntry>,
	/// Response body bytes
	pub body: Vec<u8>,
}
