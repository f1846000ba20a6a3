//! [`Route`] proxy: an intercepted request awaiting a decision.

use std::sync::Arc;

use parking_lot::Mutex;
use pw_net_protocol::{ContinueOptions, FulfillOptions, RouteInitializer, base64_bytes};
use pw_net_runtime::{ChannelOwner, ChannelOwnerImpl, Error, ParentOrConnection, Result};
use serde_json::{Value, json};

use crate::headers::Headers;
use crate::lookup::resolve;
use crate::{ProxyOptions, Request};

/// Local state of a route.
///
/// Every transition out of `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
	Pending,
	Aborted,
	Continued,
	Fulfilled,
}

impl RouteState {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Aborted => "aborted",
			Self::Continued => "continued",
			Self::Fulfilled => "fulfilled",
		}
	}

	pub fn is_handled(&self) -> bool {
		*self != Self::Pending
	}
}

/// An intercepted request.
///
/// Exactly one of [`abort`](Self::abort), [`continue_`](Self::continue_) or
/// [`fulfill`](Self::fulfill) may be called. The route records the action
/// before dispatching it, so a second action fails locally with
/// [`Error::RouteAlreadyHandled`]; the route stays handled even if the
/// remote side rejects the first one.
///
/// See <https://playwright.dev/docs/api/class-route>
#[derive(Clone)]
pub struct Route {
	base: ChannelOwnerImpl,
	request_guid: Arc<str>,
	state: Arc<Mutex<RouteState>>,
	options: Arc<ProxyOptions>,
}

impl Route {
	pub fn new(parent: Arc<dyn ChannelOwner>, type_name: String, guid: Arc<str>, initializer: Value, options: Arc<ProxyOptions>) -> Result<Self> {
		let init: RouteInitializer =
			serde_json::from_value(initializer.clone()).map_err(|e| Error::ProtocolError(format!("Invalid Route initializer for {guid}: {e}")))?;

		Ok(Self {
			base: ChannelOwnerImpl::new(ParentOrConnection::Parent(parent), type_name, guid, initializer),
			request_guid: Arc::from(init.request.guid),
			state: Arc::new(Mutex::new(RouteState::Pending)),
			options,
		})
	}

	/// The intercepted request.
	pub fn request(&self) -> Result<Request> {
		resolve(&self.connection(), &self.request_guid, "Request")
	}

	pub fn state(&self) -> RouteState {
		*self.state.lock()
	}

	/// Aborts the request.
	///
	/// `error_code` is a network error classification such as `"aborted"`,
	/// `"connectionrefused"` or `"timedout"`; defaults to
	/// [`ProxyOptions::default_abort_error_code`].
	///
	/// See <https://playwright.dev/docs/api/class-route#route-abort>
	pub async fn abort(&self, error_code: Option<&str>) -> Result<()> {
		let error_code = error_code.unwrap_or(&self.options.default_abort_error_code).to_string();
		self.transition(RouteState::Aborted, "abort")?;

		tracing::debug!(guid = %self.guid(), error_code = %error_code, "Aborting route");
		self.base.channel().send_no_result("abort", json!({ "errorCode": error_code })).await
	}

	/// Sends the request on, optionally overriding method, headers and post data.
	///
	/// Replacing only the post data keeps the request's headers and updates
	/// their `content-length`.
	///
	/// See <https://playwright.dev/docs/api/class-route#route-continue>
	pub async fn continue_(&self, overrides: Option<ContinueOptions>) -> Result<()> {
		let request_headers = match self.request() {
			Ok(request) => request.headers(),
			Err(e) => {
				tracing::debug!(guid = %self.guid(), error = %e, "Continuing without request headers");
				Headers::default()
			}
		};
		let normalized = self
			.options
			.normalizer
			.normalize_continue(overrides.unwrap_or_default(), request_headers)
			.await?;
		self.transition(RouteState::Continued, "continue")?;

		tracing::debug!(guid = %self.guid(), "Continuing route");
		self.base.channel().send_no_result("continue", normalized).await
	}

	/// Answers the request with a synthetic response.
	///
	/// See <https://playwright.dev/docs/api/class-route#route-fulfill>
	pub async fn fulfill(&self, response: FulfillOptions) -> Result<()> {
		let normalized = self.options.normalizer.normalize_fulfill(response).await?;
		self.transition(RouteState::Fulfilled, "fulfill")?;

		tracing::debug!(guid = %self.guid(), status = normalized.status, "Fulfilling route");
		let params = json!({
			"status": normalized.status,
			"headers": normalized.headers,
			"body": base64_bytes::encode(&normalized.body),
			"isBase64": true,
		});
		self.base.channel().send_no_result("fulfill", params).await
	}

	fn transition(&self, target: RouteState, attempted: &'static str) -> Result<()> {
		let mut state = self.state.lock();
		if state.is_handled() {
			return Err(Error::RouteAlreadyHandled {
				guid: self.guid().to_string(),
				handled: state.as_str(),
				attempted,
			});
		}
		*state = target;
		Ok(())
	}

	fn handle_event(&self, method: &str, params: Value) {
		self.base.on_event(method, params)
	}
}

pw_net_runtime::delegate_channel_owner!(Route);

impl std::fmt::Debug for Route {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Route")
			.field("guid", &self.guid())
			.field("request", &self.request_guid)
			.field("state", &self.state())
			.finish()
	}
}
