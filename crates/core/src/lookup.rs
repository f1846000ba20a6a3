//! Typed guid resolution against the connection registry.

use std::sync::Arc;
use std::time::Duration;

use pw_net_runtime::{ChannelOwner, ConnectionLike, Error, Result};

/// Resolves a registered object and downcasts it to `T`.
pub(crate) fn resolve<T>(connection: &Arc<dyn ConnectionLike>, guid: &str, expected: &'static str) -> Result<T>
where
	T: ChannelOwner + Clone,
{
	let object = connection.try_get_object(guid).ok_or_else(|| Error::ObjectNotFound {
		guid: guid.to_string(),
		expected: Some(expected),
	})?;
	downcast(object, expected)
}

/// Like [`resolve`], but waits up to `timeout` for a pending `__create__`.
pub(crate) async fn resolve_wait<T>(connection: &Arc<dyn ConnectionLike>, guid: &str, expected: &'static str, timeout: Duration) -> Result<T>
where
	T: ChannelOwner + Clone,
{
	let object = connection.wait_for_object(guid, timeout).await?;
	downcast(object, expected)
}

fn downcast<T>(object: Arc<dyn ChannelOwner>, expected: &'static str) -> Result<T>
where
	T: ChannelOwner + Clone,
{
	object
		.downcast_ref::<T>()
		.cloned()
		.ok_or_else(|| Error::ProtocolError(format!("Expected {expected} object for {}, got {}", object.guid(), object.type_name())))
}
