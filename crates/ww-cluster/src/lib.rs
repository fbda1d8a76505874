//! Anchor namespace for ww.
//!
//! The cluster is addressed as a tree of *anchors*. The root lists the hosts
//! of the membership view, each host is named by its peer id, and every
//! path below a host is a container holding an opaque byte blob.
//!
//! # Key Types
//!
//! - [`PathRegistry`]: Concurrent refcounted trie that materializes path
//!   nodes on demand and prunes them once unreferenced
//! - [`NodeRef`]: Counted handle on one registry node
//! - [`AnchorServer`]: Resolves paths into [`Anchor`] capabilities
//! - [`RoutingTable`]: Read access to the membership view
//! - [`InMemoryRoutingTable`]: Process-local membership view

pub mod anchor;
pub mod container;
pub mod error;
pub mod routing;
pub mod tree;

pub use anchor::{Anchor, AnchorIterator, AnchorKind, AnchorServer};
pub use container::ContainerStore;
pub use error::{ClusterError, ClusterResult};
pub use routing::{InMemoryRoutingTable, RoutingTable};
pub use tree::{Children, NodeRef, PathRegistry, RefNode};
