//! Wire types for the network and worker proxies.
//!
//! This crate contains the serde-serializable types exchanged with the remote
//! driver: the immutable initializer payloads handed to each proxy at
//! construction time, and the parameter shapes of the route actions.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization and builders
//! - **1:1 with protocol**: Field names match the driver's camelCase schema
//! - **Stable**: Changes only when the wire protocol changes
//!
//! Proxy behavior (redirect links, lazy payloads, terminal route state) lives
//! in `pw-net`.

pub mod base64_bytes;
pub mod options;
pub mod types;

pub use options::*;
pub use types::*;
