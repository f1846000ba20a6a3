//! Error types for the proxy runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to remote objects.
#[derive(Debug, Error)]
pub enum Error {
	/// Protocol-level error (malformed message, initializer, or payload).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Remote driver error with full context.
	///
	/// Every failure reported by the remote side lands here with its
	/// original message, including exceptions thrown by evaluated scripts.
	#[error("{name}: {message}")]
	Remote {
		/// Error type name (e.g., "TimeoutError", "Error", "TargetClosedError")
		name: String,
		/// Human-readable error message
		message: String,
		/// Stack trace from the remote side (if available)
		stack: Option<String>,
	},

	/// Local payload could not be parsed (post data or response body JSON).
	#[error("Failed to parse {context}: {source}")]
	Parse {
		/// What was being parsed
		context: &'static str,
		#[source]
		source: serde_json::Error,
	},

	/// Evaluation result could not be converted into the requested type.
	#[error("Evaluation error: {0}")]
	Evaluation(String),

	/// A terminal route action was already taken on this route.
	#[error("Route {guid} is already {handled}; cannot {attempted}")]
	RouteAlreadyHandled {
		guid: String,
		/// State the route is in ("aborted", "continued", "fulfilled")
		handled: &'static str,
		/// Action that was rejected ("abort", "continue", "fulfill")
		attempted: &'static str,
	},

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// Timeout waiting for operation.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Call made on a proxy whose remote object is already closed.
	#[error("Target closed: cannot {operation} on closed {target_type} {guid}")]
	TargetClosed {
		target_type: &'static str,
		guid: String,
		operation: &'static str,
	},

	/// Object not found in the connection registry.
	#[error("Object not found: {guid}{}", expected.map(|t| format!(" (expected {})", t)).unwrap_or_default())]
	ObjectNotFound { guid: String, expected: Option<&'static str> },

	/// Channel closed unexpectedly.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// Invalid argument provided to method.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}

impl Error {
	/// Returns true if the remote side reported this error.
	pub fn is_remote(&self) -> bool {
		matches!(self, Error::Remote { .. })
	}

	/// Returns true if a local payload failed to parse.
	pub fn is_parse_error(&self) -> bool {
		matches!(self, Error::Parse { .. })
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::Timeout(_) => true,
			Error::Remote { name, .. } => name == "TimeoutError",
			_ => false,
		}
	}

	/// Returns true if this is a target closed error.
	pub fn is_target_closed(&self) -> bool {
		match self {
			Error::TargetClosed { .. } | Error::ChannelClosed => true,
			Error::Remote { name, .. } => name == "TargetClosedError",
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_remote_error_display_preserves_message() {
		let err = Error::Remote {
			name: "Error".to_string(),
			message: "Route is already handled!".to_string(),
			stack: None,
		};
		assert_eq!(err.to_string(), "Error: Route is already handled!");
		assert!(err.is_remote());
		assert!(!err.is_parse_error());
	}

	#[test]
	fn test_parse_error_keeps_source() {
		let source = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
		let err = Error::Parse {
			context: "post data",
			source,
		};
		assert!(err.is_parse_error());
		assert!(err.to_string().starts_with("Failed to parse post data"));
		assert!(std::error::Error::source(&err).is_some());
	}

	#[test]
	fn test_route_already_handled_message() {
		let err = Error::RouteAlreadyHandled {
			guid: "route@1".to_string(),
			handled: "fulfilled",
			attempted: "continue",
		};
		assert_eq!(err.to_string(), "Route route@1 is already fulfilled; cannot continue");
	}

	#[test]
	fn test_timeout_and_closed_predicates() {
		assert!(Error::Timeout("x".to_string()).is_timeout());
		assert!(Error::ChannelClosed.is_target_closed());
		let remote = Error::Remote {
			name: "TargetClosedError".to_string(),
			message: "closed".to_string(),
			stack: Some("at foo".to_string()),
		};
		assert!(remote.is_target_closed());

		let local = Error::TargetClosed {
			target_type: "worker",
			guid: "worker@1".to_string(),
			operation: "evaluate",
		};
		assert!(local.is_target_closed());
		assert_eq!(local.to_string(), "Target closed: cannot evaluate on closed worker worker@1");
	}
}
