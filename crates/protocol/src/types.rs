//! Initializer payloads and primitive protocol types.
//!
//! Every remote object arrives with an immutable initializer. The structs
//! here describe the initializers of the objects `pw-net` proxies.

use serde::{Deserialize, Serialize};

/// A single HTTP header as it appears on the wire.
///
/// Header lists preserve order and may contain duplicate names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
	/// Header name (case as sent by the remote side)
	pub name: String,
	/// Header value
	pub value: String,
}

impl HeaderEntry {
	/// Creates a header entry.
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

/// Reference to another remote object by GUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidRef {
	/// GUID of the referenced object (format: "type@hash")
	pub guid: String,
}

impl GuidRef {
	/// Creates a reference to `guid`.
	pub fn new(guid: impl Into<String>) -> Self {
		Self { guid: guid.into() }
	}
}

/// Initializer of a `Request` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInitializer {
	/// Request URL
	pub url: String,
	/// HTTP method
	pub method: String,
	/// Resource type tag (document, script, xhr, fetch, ...)
	pub resource_type: String,
	/// Raw header list
	#[serde(default)]
	pub headers: Vec<HeaderEntry>,
	/// Post data bytes, base64 on the wire
	#[serde(default, with = "crate::base64_bytes::option", skip_serializing_if = "Option::is_none")]
	pub post_data: Option<Vec<u8>>,
	/// Frame that issued the request
	pub frame: GuidRef,
	/// Whether this request drives a navigation
	#[serde(default)]
	pub is_navigation_request: bool,
	/// Request this one was redirected from
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub redirected_from: Option<GuidRef>,
}

/// Initializer of a `Response` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInitializer {
	/// Response URL
	pub url: String,
	/// HTTP status code (0 when there is no real HTTP status)
	pub status: u16,
	/// HTTP status text
	#[serde(default)]
	pub status_text: String,
	/// Raw header list
	#[serde(default)]
	pub headers: Vec<HeaderEntry>,
	/// Request that produced this response
	pub request: GuidRef,
}

/// Initializer of a `Route` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteInitializer {
	/// Request being intercepted
	pub request: GuidRef,
}

/// Initializer of a `Worker` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInitializer {
	/// Script URL of the worker
	pub url: String,
}

/// Initializer of a `JSHandle` / `ElementHandle` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsHandleInitializer {
	/// Human-readable preview of the remote value
	#[serde(default)]
	pub preview: String,
}

/// Initializer of a `Frame` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInitializer {
	/// Current frame URL
	#[serde(default)]
	pub url: String,
	/// Frame name attribute
	#[serde(default)]
	pub name: String,
	/// Parent frame, absent for main frames
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_frame: Option<GuidRef>,
}

/// Initializer of a `Page` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInitializer {
	/// Main frame of the page
	pub main_frame: GuidRef,
}
