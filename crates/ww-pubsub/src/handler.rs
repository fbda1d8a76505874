use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use ww_cap::{Client, Server};

use crate::error::{PubSubError, PubSubResult};

/// Receives the messages of a subscription.
///
/// Handlers are capabilities: a subscription holds a [`Client`] on its
/// handler and releases it when the subscription ends.
#[async_trait]
pub trait Handler: Server {
    /// Deliver one message. An error ends the subscription.
    async fn handle(&self, msg: Bytes) -> PubSubResult<()>;
}

/// Deliver `msg` through a handler capability.
pub(crate) async fn push<H: Handler>(sink: &Client<H>, msg: Bytes) -> PubSubResult<()> {
    let handler = sink.acquire().await?;
    handler.handle(msg).await
}

/// Handler forwarding every message into an mpsc channel.
///
/// Delivery waits while the channel is full and fails once the receiver is
/// dropped.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelHandler {
    /// A handler and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn from_sender(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

impl Server for ChannelHandler {}

#[async_trait]
impl Handler for ChannelHandler {
    async fn handle(&self, msg: Bytes) -> PubSubResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| PubSubError::Handler("receiver dropped".into()))
    }
}
