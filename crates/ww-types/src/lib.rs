//! Foundation types for ww.
//!
//! This crate provides the identity, membership and path types shared by the
//! anchor namespace, the pub/sub namespace and the node host. Every other ww
//! crate depends on `ww-types`.
//!
//! # Key Types
//!
//! - [`PeerId`]: Stable peer identity derived from an ed25519 public key
//! - [`Keypair`]: Signing key from which a [`PeerId`] is derived
//! - [`Record`]: One entry of the cluster membership view
//! - [`path`]: Anchor path parsing, joining and validation

pub mod error;
pub mod path;
pub mod peer;
pub mod record;

pub use error::TypeError;
pub use peer::{Keypair, PeerId};
pub use record::Record;
