//! Topic namespace for ww.
//!
//! Remote callers join topics by name and receive topic capabilities. All
//! capabilities for one name share a single joined topic, tracked by the
//! [`TopicRegistry`] with an explicit reference count. The topic is left on
//! the messaging substrate when the last capability and the last
//! subscription are gone.
//!
//! # Key Types
//!
//! - [`TopicRegistry`]: Lazily joined, refcounted topics keyed by name
//! - [`RefTopic`]: One joined topic with its reference count and scope
//! - [`PubSubServer`] / [`TopicServer`]: The exported capabilities
//! - [`Handler`]: Subscriber-side sink for delivered messages
//! - [`LocalPubSub`]: In-process substrate backed by broadcast channels

pub mod error;
pub mod handler;
pub mod local;
pub mod registry;
pub mod server;
pub mod substrate;
pub mod topic;

pub use error::{PubSubError, PubSubResult};
pub use handler::{ChannelHandler, Handler};
pub use local::LocalPubSub;
pub use registry::{RegistryConfig, TopicRegistry};
pub use server::{PubSubServer, TopicServer};
pub use substrate::{Subscription, Topic, TopicJoiner};
pub use topic::{RefTopic, Teardown};
