//! The messaging substrate the topic registry is layered on.
//!
//! A substrate joins named topics; a joined topic publishes payloads and
//! opens subscriptions. [`LocalPubSub`](crate::LocalPubSub) is the in-process
//! implementation.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::PubSubResult;

/// Joins topics by name.
#[async_trait]
pub trait TopicJoiner: Send + Sync + 'static {
    async fn join(&self, name: &str) -> PubSubResult<Arc<dyn Topic>>;
}

/// A joined topic.
#[async_trait]
pub trait Topic: Send + Sync + 'static {
    async fn publish(&self, data: Bytes) -> PubSubResult<()>;

    async fn subscribe(&self) -> PubSubResult<Box<dyn Subscription>>;

    /// Leave the topic. Pulls on open subscriptions fail afterwards.
    async fn close(&self) -> PubSubResult<()>;
}

/// A stream of messages from one topic.
#[async_trait]
pub trait Subscription: Send + 'static {
    /// Wait for the next message.
    async fn next(&mut self) -> PubSubResult<Bytes>;

    /// Stop receiving. Subsequent pulls fail.
    fn cancel(&mut self);
}
