//! In-memory message transport.
//!
//! The connection exchanges whole JSON messages with the remote side.
//! [`pipe`] creates both ends: [`TransportParts`] is consumed by
//! [`Connection::new`](crate::connection::Connection::new), [`RemoteEnd`] is
//! held by whatever plays the driver (an in-process bridge or a test).
//!
//! Dropping the [`RemoteEnd`] ends the inbound stream, which makes
//! [`Connection::run`](crate::connection::Connection::run) return and fail
//! every pending call.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Local half of a message pipe, consumed by the connection.
pub struct TransportParts {
	/// Messages from the connection to the remote side
	pub outbound: mpsc::UnboundedSender<Value>,
	/// Messages from the remote side to the connection
	pub inbound: mpsc::UnboundedReceiver<Value>,
}

/// Remote half of a message pipe.
pub struct RemoteEnd {
	requests: mpsc::UnboundedReceiver<Value>,
	messages: mpsc::UnboundedSender<Value>,
}

/// Creates a connected message pipe.
pub fn pipe() -> (TransportParts, RemoteEnd) {
	let (outbound, requests) = mpsc::unbounded_channel();
	let (messages, inbound) = mpsc::unbounded_channel();

	(TransportParts { outbound, inbound }, RemoteEnd { requests, messages })
}

impl RemoteEnd {
	/// Receives the next message the connection sent, or `None` once the
	/// connection is gone.
	pub async fn recv(&mut self) -> Option<Value> {
		self.requests.recv().await
	}

	/// Non-blocking variant of [`recv`](Self::recv).
	pub fn try_recv(&mut self) -> Option<Value> {
		self.requests.try_recv().ok()
	}

	/// Sends a response or event to the connection.
	pub fn send(&self, message: Value) -> Result<()> {
		tracing::debug!(?message, "Remote send");
		self.messages.send(message).map_err(|_| Error::ChannelClosed)
	}

	/// Returns a cloneable sender for pushing messages from other tasks.
	pub fn sender(&self) -> mpsc::UnboundedSender<Value> {
		self.messages.clone()
	}
}

#[cfg(test)]
mod tests;
