//! Pub/sub capabilities.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;
use uuid::Uuid;
use ww_cap::{Client, Policy, Server};

use crate::error::PubSubResult;
use crate::handler::Handler;
use crate::registry::TopicRegistry;
use crate::topic::RefTopic;

/// Root pub/sub capability. Joins topics by name.
#[derive(Debug, Clone)]
pub struct PubSubServer {
    registry: TopicRegistry,
    policy: Policy,
}

impl PubSubServer {
    pub fn new(registry: TopicRegistry, policy: Policy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// Join `name`, returning a topic capability.
    ///
    /// Every topic capability holds one reference on the shared topic;
    /// releasing the capability gives it back.
    pub async fn join(&self, name: &str) -> PubSubResult<Client<TopicServer>> {
        let topic = self.registry.get_or_create(name).await?;
        let server = TopicServer {
            topic,
            registry: self.registry.clone(),
        };
        Ok(Client::export(server, &self.policy))
    }
}

impl Server for PubSubServer {}

/// Capability over one joined topic.
pub struct TopicServer {
    topic: Arc<RefTopic>,
    registry: TopicRegistry,
}

impl TopicServer {
    pub fn name(&self) -> &str {
        self.topic.name()
    }

    pub async fn publish(&self, data: Bytes) -> PubSubResult<()> {
        self.registry.publish(&self.topic, data).await
    }

    /// Deliver the topic's messages to `handler` until the topic goes away.
    pub async fn subscribe<H: Handler>(&self, handler: Client<H>) -> PubSubResult<Uuid> {
        self.registry.subscribe(&self.topic, handler).await
    }
}

impl Server for TopicServer {
    fn shutdown(&self) {
        trace!(topic = %self.topic.name(), "topic capability released");
        self.topic.release();
    }
}

impl fmt::Debug for TopicServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicServer")
            .field("topic", &self.topic)
            .finish()
    }
}
