use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ww_cap::Client;
use ww_cluster::{AnchorServer, InMemoryRoutingTable, RoutingTable};
use ww_pubsub::{LocalPubSub, PubSubError, PubSubServer, TopicRegistry};
use ww_types::{Keypair, PeerId};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::StatusState;
use crate::heartbeat::Heartbeat;
use crate::router::build_router;

/// A ww node: the anchor and topic namespaces of one peer.
pub struct WwServer {
    config: ServerConfig,
    keypair: Keypair,
    view: Arc<InMemoryRoutingTable>,
    heartbeat: Option<Heartbeat>,
    substrate: LocalPubSub,
    anchors: AnchorServer,
    topics: TopicRegistry,
    shutdown: CancellationToken,
}

impl WwServer {
    /// Build a node from `config`, using the configured identity or a fresh
    /// one. Must run inside a tokio runtime.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let keypair = match &config.identity {
            Some(secret) => Keypair::from_secret_hex(secret)?,
            None => Keypair::generate(),
        };
        Self::with_keypair(config, keypair)
    }

    pub fn with_keypair(config: ServerConfig, keypair: Keypair) -> ServerResult<Self> {
        config.validate()?;

        let view = Arc::new(InMemoryRoutingTable::new());
        let heartbeat = Heartbeat::announce(Arc::clone(&view), keypair.peer_id(), config.ttl());

        let routing: Arc<dyn RoutingTable> = view.clone();
        let anchors = AnchorServer::new(routing, config.policy());

        let substrate = LocalPubSub::with_capacity(config.channel_capacity);
        let topics = TopicRegistry::new(Arc::new(substrate.clone()), config.registry_config())?;

        Ok(Self {
            config,
            keypair,
            view,
            heartbeat: Some(heartbeat),
            substrate,
            anchors,
            topics,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn peer_id(&self) -> PeerId {
        self.keypair.peer_id()
    }

    pub fn view(&self) -> &Arc<InMemoryRoutingTable> {
        &self.view
    }

    pub fn anchors(&self) -> &AnchorServer {
        &self.anchors
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    /// Export the root anchor capability.
    pub fn anchor_client(&self) -> Client<AnchorServer> {
        Client::export(self.anchors.clone(), &self.config.policy())
    }

    /// Export the pub/sub capability.
    pub fn pubsub_client(&self) -> Client<PubSubServer> {
        let server = PubSubServer::new(self.topics.clone(), self.config.policy());
        Client::export(server, &self.config.policy())
    }

    /// Build the status router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(StatusState {
            ns: self.config.ns.clone(),
            peer: self.peer_id(),
            view: Arc::clone(&self.view),
            topics: self.topics.clone(),
        })
    }

    /// Cancelling this token stops [`serve`](WwServer::serve).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the node until the shutdown token fires, then close it.
    pub async fn serve(mut self) -> ServerResult<()> {
        info!(ns = %self.config.ns, peer = %self.peer_id().short_id(), "node started");

        let heartbeat = self
            .heartbeat
            .take()
            .map(|hb| hb.spawn(self.shutdown.child_token()));

        let status = match self.config.status_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!(addr = %listener.local_addr()?, "status endpoint listening");
                let app = self.router();
                let stop = self.shutdown.clone();
                Some(tokio::spawn(async move {
                    axum::serve(listener, app)
                        .with_graceful_shutdown(async move { stop.cancelled().await })
                        .await
                }))
            }
            None => None,
        };

        self.shutdown.cancelled().await;
        self.close().await?;

        if let Some(task) = heartbeat {
            task.await
                .map_err(|e| ServerError::Internal(e.to_string()))?;
        }
        if let Some(task) = status {
            task.await
                .map_err(|e| ServerError::Internal(e.to_string()))??;
        }
        info!(ns = %self.config.ns, "node stopped");
        Ok(())
    }

    /// Stop accepting work and drain the topic registry. Safe to call more
    /// than once.
    pub async fn close(&self) -> ServerResult<()> {
        self.shutdown.cancel();
        self.anchors.close();
        match self.topics.close().await {
            Ok(()) | Err(PubSubError::AlreadyClosed) => {}
            Err(e) => {
                warn!(error = %e, "topic registry did not close cleanly");
                return Err(e.into());
            }
        }
        self.substrate.close();
        Ok(())
    }
}

impl std::fmt::Debug for WwServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WwServer")
            .field("ns", &self.config.ns)
            .field("peer", &self.peer_id())
            .field("anchors", &self.anchors)
            .field("topics", &self.topics)
            .finish()
    }
}
