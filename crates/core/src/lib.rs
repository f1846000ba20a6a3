//! Local proxies for remote network requests, responses, routes and workers.
//!
//! Every remote object the driver creates is mirrored by a proxy registered
//! on a [`Connection`]:
//!
//! - [`Request`] / [`Response`] - immutable request data, redirect chain, lazily fetched body
//! - [`Route`] - an intercepted request that is aborted, continued or fulfilled exactly once
//! - [`Worker`] - web or service worker with expression evaluation and close notification
//! - [`Page`], [`BrowserContext`], [`Frame`] - owners the network objects hang off
//!
//! ```ignore
//! let (parts, remote) = pw_net::pipe();
//! let connection = Arc::new(Connection::new(parts));
//! let root = pw_net::attach(&connection, ProxyOptions::default()).await;
//! tokio::spawn({
//!     let connection = Arc::clone(&connection);
//!     async move { connection.run().await }
//! });
//! ```

mod browser_context;
mod events;
mod frame;
mod handlers;
mod headers;
mod init;
mod js_handle;
mod lookup;
mod normalize;
mod object_factory;
mod page;
mod request;
mod response;
mod root;
mod route;
mod serialize;
mod worker;

pub use browser_context::BrowserContext;
pub use events::{DEFAULT_EVENT_CAPACITY, EventStream, EventWaiter};
pub use frame::Frame;
pub use handlers::Subscription;
pub use headers::Headers;
pub use init::{DEFAULT_OBJECT_TIMEOUT, ProxyOptions, ProxyOptionsBuilder, attach};
pub use js_handle::JsHandle;
pub use normalize::{DefaultNormalizer, NormalizeFuture, Normalizer};
pub use object_factory::{NetworkObjectFactory, UnknownObject};
pub use page::Page;
pub use pw_net_protocol::{ContinueOptions, FulfillBody, FulfillOptions, HeaderEntry, NormalizedContinue, NormalizedFulfill};
pub use pw_net_runtime::{ChannelOwner, Connection, Error, RemoteEnd, Result, pipe};
pub use request::{Request, RequestFailure};
pub use response::Response;
pub use root::Root;
pub use route::{Route, RouteState};
pub use worker::{Worker, WorkerClosed};
