//! ChannelOwner - base trait for every proxied remote object.
//!
//! A ChannelOwner:
//! - mirrors one remote object, identified by its GUID
//! - sits in the parent/child lifecycle tree owned by the connection
//! - receives the events the remote side emits for its GUID
//! - talks back to the remote object through its [`Channel`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::Mutex;
use serde_json::Value;

use crate::channel::Channel;
use crate::connection::ConnectionLike;

/// Private module for the sealed trait pattern.
pub mod private {
	/// Marker trait that seals `ChannelOwner`.
	pub trait Sealed {}
}

type ChildrenRegistry = HashMap<Arc<str>, Arc<dyn ChannelOwner>>;

/// Reason why an object was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
	/// The remote side closed the object.
	Closed,
	/// The remote side garbage collected the object.
	GarbageCollected,
}

/// Parent can be either another ChannelOwner or the root Connection.
pub enum ParentOrConnection {
	Parent(Arc<dyn ChannelOwner>),
	Connection(Arc<dyn ConnectionLike>),
}

/// Base trait for all proxied remote objects.
///
/// This trait is sealed: implementors opt in through [`private::Sealed`].
pub trait ChannelOwner: private::Sealed + DowncastSync {
	/// Returns the unique GUID for this object.
	fn guid(&self) -> &str;

	/// Returns the protocol type name (e.g., "Request", "Worker").
	fn type_name(&self) -> &str;

	/// Returns the parent object, if any.
	fn parent(&self) -> Option<Arc<dyn ChannelOwner>>;

	/// Returns the connection this object belongs to.
	fn connection(&self) -> Arc<dyn ConnectionLike>;

	/// Returns the raw initializer JSON from the remote side.
	fn initializer(&self) -> &Value;

	/// Returns the channel for RPC communication.
	fn channel(&self) -> &Channel;

	/// Disposes this object and all its children.
	fn dispose(&self, reason: DisposeReason);

	/// Adopts a child object (moves from old parent to this parent).
	fn adopt(&self, child: Arc<dyn ChannelOwner>);

	/// Adds a child object to this parent's registry.
	fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>);

	/// Removes a child object from this parent's registry.
	fn remove_child(&self, guid: &str);

	/// Handles a protocol event sent to this object.
	fn on_event(&self, method: &str, params: Value);

	/// Returns true if this object was garbage collected.
	fn was_collected(&self) -> bool;
}

impl_downcast!(sync ChannelOwner);

/// Base implementation of ChannelOwner, embedded by every proxy.
///
/// Clones share the children registry and the collected flag, so a proxy
/// handle cloned out of the registry observes the same lifecycle.
#[derive(Clone)]
pub struct ChannelOwnerImpl {
	guid: Arc<str>,
	type_name: String,
	parent: Option<Weak<dyn ChannelOwner>>,
	connection: Arc<dyn ConnectionLike>,
	children: Arc<Mutex<ChildrenRegistry>>,
	channel: Channel,
	initializer: Value,
	was_collected: Arc<AtomicBool>,
}

impl ChannelOwnerImpl {
	/// Creates a new ChannelOwner base implementation.
	pub fn new(parent: ParentOrConnection, type_name: String, guid: Arc<str>, initializer: Value) -> Self {
		let (connection, parent_opt) = match parent {
			ParentOrConnection::Parent(p) => (p.connection(), Some(Arc::downgrade(&p))),
			ParentOrConnection::Connection(c) => (c, None),
		};

		let channel = Channel::new(Arc::clone(&guid), connection.clone());

		Self {
			guid,
			type_name,
			parent: parent_opt,
			connection,
			children: Arc::new(Mutex::new(HashMap::new())),
			channel,
			initializer,
			was_collected: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	pub fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
		self.parent.as_ref().and_then(|p| p.upgrade())
	}

	pub fn connection(&self) -> Arc<dyn ConnectionLike> {
		self.connection.clone()
	}

	pub fn initializer(&self) -> &Value {
		&self.initializer
	}

	pub fn channel(&self) -> &Channel {
		&self.channel
	}

	/// Disposes this object and all children recursively.
	///
	/// Removes the object from its parent and from the connection registry,
	/// so later GUID lookups no longer resolve to it.
	pub fn dispose(&self, reason: DisposeReason) {
		if reason == DisposeReason::GarbageCollected {
			self.was_collected.store(true, Ordering::SeqCst);
		}

		if let Some(parent) = self.parent() {
			parent.remove_child(&self.guid);
		}

		self.connection.unregister_object(&self.guid);

		let children: Vec<_> = self.children.lock().drain().map(|(_, child)| child).collect();

		for child in children {
			child.dispose(reason);
		}

		tracing::debug!(guid = %self.guid, type_name = %self.type_name, ?reason, "Disposed");
	}

	/// Adopts a child object (moves from old parent to this parent).
	pub fn adopt(&self, child: Arc<dyn ChannelOwner>) {
		if let Some(old_parent) = child.parent() {
			old_parent.remove_child(child.guid());
		}
		self.add_child(Arc::from(child.guid()), child);
	}

	pub fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>) {
		self.children.lock().insert(guid, child);
	}

	pub fn remove_child(&self, guid: &str) {
		self.children.lock().remove(guid);
	}

	/// Returns all children of this object.
	pub fn children(&self) -> Vec<Arc<dyn ChannelOwner>> {
		self.children.lock().values().cloned().collect()
	}

	/// Default event handling: log and ignore.
	pub fn on_event(&self, method: &str, params: Value) {
		tracing::debug!(guid = %self.guid, type_name = %self.type_name, method, ?params, "Unhandled event");
	}

	pub fn was_collected(&self) -> bool {
		self.was_collected.load(Ordering::SeqCst)
	}
}

/// Implements the [`ChannelOwner`] trait for a struct with a `base: ChannelOwnerImpl`
/// field by delegating every method except `on_event`.
///
/// The struct must provide an inherent `fn handle_event(&self, method: &str, params: Value)`.
#[macro_export]
macro_rules! delegate_channel_owner {
	($ty:ty) => {
		impl $crate::channel_owner::private::Sealed for $ty {}

		impl $crate::channel_owner::ChannelOwner for $ty {
			fn guid(&self) -> &str {
				self.base.guid()
			}

			fn type_name(&self) -> &str {
				self.base.type_name()
			}

			fn parent(&self) -> Option<::std::sync::Arc<dyn $crate::channel_owner::ChannelOwner>> {
				self.base.parent()
			}

			fn connection(&self) -> ::std::sync::Arc<dyn $crate::connection::ConnectionLike> {
				self.base.connection()
			}

			fn initializer(&self) -> &::serde_json::Value {
				self.base.initializer()
			}

			fn channel(&self) -> &$crate::channel::Channel {
				self.base.channel()
			}

			fn dispose(&self, reason: $crate::channel_owner::DisposeReason) {
				self.base.dispose(reason)
			}

			fn adopt(&self, child: ::std::sync::Arc<dyn $crate::channel_owner::ChannelOwner>) {
				self.base.adopt(child)
			}

			fn add_child(&self, guid: ::std::sync::Arc<str>, child: ::std::sync::Arc<dyn $crate::channel_owner::ChannelOwner>) {
				self.base.add_child(guid, child)
			}

			fn remove_child(&self, guid: &str) {
				self.base.remove_child(guid)
			}

			fn on_event(&self, method: &str, params: ::serde_json::Value) {
				self.handle_event(method, params)
			}

			fn was_collected(&self) -> bool {
				self.base.was_collected()
			}
		}
	};
}
