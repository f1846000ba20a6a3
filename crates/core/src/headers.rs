//! Header list conversion.

use indexmap::IndexMap;
use pw_net_protocol::HeaderEntry;

/// Decoded header mapping: lower-cased names in first-seen order.
pub type Headers = IndexMap<String, String>;

/// Converts a wire header list into a [`Headers`] mapping.
///
/// Names are lower-cased. A repeated name keeps its first position and the
/// last value.
pub fn headers_from_entries(entries: &[HeaderEntry]) -> Headers {
	let mut headers = Headers::with_capacity(entries.len());
	for entry in entries {
		headers.insert(entry.name.to_ascii_lowercase(), entry.value.clone());
	}
	headers
}
