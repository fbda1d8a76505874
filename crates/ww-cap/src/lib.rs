//! Capability runtime for ww.
//!
//! A capability is an exported [`Server`] reachable through one or more
//! [`Client`] references. Clients are explicitly reference counted: every
//! holder calls [`Client::add_ref`] to share and [`Client::release`] (or
//! drops the client) to let go. When the last reference disappears the
//! server's [`Server::shutdown`] hook runs exactly once. This is where the
//! anchor and topic registries hook their own release accounting.
//!
//! Every export carries a [`Policy`] bounding the number of calls that may be
//! in flight at once. A capability whose handler re-enters the same
//! capability while an outer call is outstanding needs more than one slot,
//! so the default is generous.

pub mod client;
pub mod error;
pub mod policy;

pub use client::{CallGuard, Client, Server};
pub use error::{CapError, CapResult};
pub use policy::Policy;
