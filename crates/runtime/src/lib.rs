//! Runtime layer for remote-object proxies.
//!
//! Owns the connection to the remote side: call/response correlation,
//! event dispatch, the guid registry and the parent/child lifecycle tree.
//! Proxy types live in `pw-net` and plug in through [`ObjectFactory`].

pub mod channel;
pub mod channel_owner;
pub mod connection;
pub mod error;
pub mod transport;

pub use channel::Channel;
pub use channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
pub use connection::{AsyncChannelOwnerResult, Connection, ConnectionLike, ObjectFactory, ObjectStore};
pub use error::{Error, Result};
pub use transport::{RemoteEnd, TransportParts, pipe};
