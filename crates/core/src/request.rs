//! [`Request`] proxy for an outgoing network request.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use pw_net_protocol::RequestInitializer;
use pw_net_runtime::{ChannelOwner, ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::headers::{Headers, headers_from_entries};
use crate::lookup::{resolve, resolve_wait};
use crate::{Frame, ProxyOptions, Response};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Why a request failed, as reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
	pub error_text: String,
}

/// Successors announced before their `redirectedFrom` request, keyed by
/// predecessor guid. Shared by every request created on a connection.
#[derive(Debug, Default)]
pub(crate) struct PendingRedirects {
	successors: Mutex<HashMap<Arc<str>, Arc<str>>>,
}

impl PendingRedirects {
	fn wait_for_predecessor(&self, predecessor: Arc<str>, successor: Arc<str>) {
		if let Some(previous) = self.successors.lock().insert(predecessor.clone(), successor) {
			tracing::warn!(predecessor = %predecessor, previous = %previous, "Pending redirect successor replaced");
		}
	}

	fn take_successor(&self, predecessor: &str) -> Option<Arc<str>> {
		self.successors.lock().remove(predecessor)
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.successors.lock().len()
	}
}

struct RequestData {
	url: String,
	method: String,
	resource_type: String,
	headers: Headers,
	post_data: Option<Vec<u8>>,
	frame_guid: Arc<str>,
	is_navigation_request: bool,
	redirected_from: Option<Arc<str>>,
}

/// A network request issued by a page or worker.
///
/// Redirects form a chain: each hop is a new `Request` whose
/// [`redirected_from`](Self::redirected_from) names its predecessor, and the
/// predecessor's [`redirected_to`](Self::redirected_to) is linked back when
/// the later of the two is created. Until then both links read `None`.
///
/// See <https://playwright.dev/docs/api/class-request>
#[derive(Clone)]
pub struct Request {
	base: ChannelOwnerImpl,
	data: Arc<RequestData>,
	redirected_to: Arc<OnceLock<Arc<str>>>,
	failure: Arc<OnceLock<String>>,
	options: Arc<ProxyOptions>,
}

impl Request {
	/// Creates a Request from its `__create__` message.
	///
	/// Links the redirect chain in whichever order the hops arrive: a
	/// predecessor that is not registered yet is recorded in `pending` and
	/// linked when it is created.
	///
	/// Fails with [`Error::ProtocolError`] if the initializer is malformed.
	pub(crate) fn new(
		parent: Arc<dyn ChannelOwner>,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
		options: Arc<ProxyOptions>,
		pending: &PendingRedirects,
	) -> Result<Self> {
		let init: RequestInitializer =
			serde_json::from_value(initializer.clone()).map_err(|e| Error::ProtocolError(format!("Invalid Request initializer for {guid}: {e}")))?;

		let connection = parent.connection();
		let data = RequestData {
			headers: headers_from_entries(&init.headers),
			url: init.url,
			method: init.method,
			resource_type: init.resource_type,
			post_data: init.post_data,
			frame_guid: Arc::from(init.frame.guid),
			is_navigation_request: init.is_navigation_request,
			redirected_from: init.redirected_from.map(|from| Arc::from(from.guid)),
		};

		let base = ChannelOwnerImpl::new(ParentOrConnection::Parent(parent), type_name, guid.clone(), initializer);
		let request = Self {
			base,
			data: Arc::new(data),
			redirected_to: Arc::new(OnceLock::new()),
			failure: Arc::new(OnceLock::new()),
			options,
		};

		if let Some(from) = &request.data.redirected_from {
			match resolve::<Request>(&connection, from, "Request") {
				Ok(predecessor) => predecessor.link_redirect(&guid),
				Err(_) => {
					tracing::debug!(guid = %guid, redirected_from = %from, "Redirect predecessor not created yet");
					pending.wait_for_predecessor(from.clone(), guid.clone());
				}
			}
		}
		if let Some(successor) = pending.take_successor(&guid) {
			request.link_redirect(&successor);
		}

		Ok(request)
	}

	fn link_redirect(&self, successor: &str) {
		if self.redirected_to.set(Arc::from(successor)).is_err() {
			tracing::warn!(
				guid = %self.guid(),
				existing = ?self.redirected_to.get(),
				successor,
				"Request already has a redirect successor"
			);
		}
	}

	pub fn url(&self) -> &str {
		&self.data.url
	}

	pub fn method(&self) -> &str {
		&self.data.method
	}

	/// Resource type tag (`document`, `script`, `xhr`, `fetch`, ...).
	pub fn resource_type(&self) -> &str {
		&self.data.resource_type
	}

	pub fn is_navigation_request(&self) -> bool {
		self.data.is_navigation_request
	}

	/// Returns a copy of the request headers, keyed by lower-cased name.
	pub fn headers(&self) -> Headers {
		self.data.headers.clone()
	}

	/// Returns a single header value by case-insensitive name.
	pub fn header_value(&self, name: &str) -> Option<&str> {
		self.data.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Post data as text, lossily decoded as UTF-8.
	///
	/// `None` means the request has no body, which is distinct from an empty body.
	pub fn post_data(&self) -> Option<String> {
		self.data.post_data.as_deref().map(|bytes| String::from_utf8_lossy(bytes).into_owned())
	}

	/// Post data as raw bytes.
	pub fn post_data_buffer(&self) -> Option<&[u8]> {
		self.data.post_data.as_deref()
	}

	/// Post data decoded according to the request's `content-type`.
	///
	/// Returns `Ok(None)` when there is no (or empty) post data or no
	/// `content-type` header. A body of type
	/// `application/x-www-form-urlencoded` is decoded into a flat object of
	/// strings; repeated keys keep only their last value. Any other content
	/// type is parsed as JSON.
	///
	/// # Errors
	///
	/// [`Error::Parse`] if the body is not valid JSON.
	pub fn post_data_json(&self) -> Result<Option<Value>> {
		decode_post_data(self.data.post_data.as_deref(), self.header_value("content-type"))
	}

	/// Fetches this request's response.
	///
	/// Returns `None` if no response was received (yet or ever).
	pub async fn response(&self) -> Result<Option<Response>> {
		#[derive(Deserialize)]
		struct GuidRef {
			guid: String,
		}

		#[derive(Deserialize)]
		struct ResponseResult {
			response: Option<GuidRef>,
		}

		let result: ResponseResult = self.base.channel().send_no_params("response").await?;
		match result.response {
			Some(reference) => Ok(Some(
				resolve_wait(&self.connection(), &reference.guid, "Response", self.options.object_timeout).await?,
			)),
			None => Ok(None),
		}
	}

	/// The request this one was redirected from.
	pub fn redirected_from(&self) -> Option<Request> {
		let guid = self.data.redirected_from.as_deref()?;
		self.lookup_request(guid)
	}

	/// The request this one was redirected to.
	pub fn redirected_to(&self) -> Option<Request> {
		let guid = self.redirected_to.get()?;
		self.lookup_request(guid)
	}

	/// Last request in the redirect chain starting here.
	///
	/// Reflects the links known at the time of the call.
	pub fn final_request(&self) -> Request {
		let mut current = self.clone();
		let mut seen = HashSet::from([self.guid().to_string()]);

		while let Some(next) = current.redirected_to() {
			if !seen.insert(next.guid().to_string()) {
				tracing::warn!(guid = %next.guid(), "Redirect cycle detected");
				break;
			}
			current = next;
		}
		current
	}

	/// The frame that issued this request.
	pub fn frame(&self) -> Result<Frame> {
		resolve(&self.connection(), &self.data.frame_guid, "Frame")
	}

	/// Failure reported for this request, if any.
	pub fn failure(&self) -> Option<RequestFailure> {
		self.failure.get().map(|text| RequestFailure { error_text: text.clone() })
	}

	/// Records the failure text. Only the first report is kept.
	pub(crate) fn set_failure(&self, error_text: String) -> bool {
		let stored = self.failure.set(error_text).is_ok();
		if !stored {
			tracing::warn!(guid = %self.guid(), "Request failure already recorded");
		}
		stored
	}

	fn lookup_request(&self, guid: &str) -> Option<Request> {
		resolve(&self.connection(), guid, "Request")
			.inspect_err(|e| tracing::debug!(guid, error = %e, "Redirect link no longer resolvable"))
			.ok()
	}

	fn handle_event(&self, method: &str, params: Value) {
		self.base.on_event(method, params)
	}
}

pw_net_runtime::delegate_channel_owner!(Request);

impl PartialEq for Request {
	fn eq(&self, other: &Self) -> bool {
		self.guid() == other.guid()
	}
}

impl Eq for Request {}

impl std::fmt::Debug for Request {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Request")
			.field("guid", &self.guid())
			.field("method", &self.method())
			.field("url", &self.url())
			.finish()
	}
}

/// Decodes post data by content type.
pub(crate) fn decode_post_data(post_data: Option<&[u8]>, content_type: Option<&str>) -> Result<Option<Value>> {
	let Some(body) = post_data.filter(|body| !body.is_empty()) else {
		return Ok(None);
	};
	let Some(content_type) = content_type else {
		return Ok(None);
	};

	if content_type == FORM_URLENCODED {
		let entries = form_urlencoded::parse(body)
			.map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
			.collect::<serde_json::Map<_, _>>();
		return Ok(Some(Value::Object(entries)));
	}

	serde_json::from_slice(body).map(Some).map_err(|source| Error::Parse {
		context: "post data",
		source,
	})
}
