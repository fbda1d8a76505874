//! Node host for ww.
//!
//! Wires one peer's membership record, anchor namespace and topic namespace
//! together, keeps the record alive with a heartbeat, and optionally serves
//! a read-only HTTP status endpoint.

pub mod config;
pub mod error;
pub mod handler;
pub mod heartbeat;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HealthResponse, PeerEntry, StatusState, TopicEntry};
pub use heartbeat::Heartbeat;
pub use server::WwServer;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use tower::util::ServiceExt;

    async fn get_json<T: DeserializeOwned>(app: axum::Router, uri: &str) -> T {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let server = WwServer::new(ServerConfig::default()).unwrap();
        let health: HealthResponse = get_json(server.router(), "/v1/health").await;
        assert_eq!(health, HealthResponse::default());
    }

    #[tokio::test]
    async fn info_endpoint() {
        let server = WwServer::new(ServerConfig::default()).unwrap();
        let info: serde_json::Value = get_json(server.router(), "/v1/info").await;
        assert_eq!(info["ns"], "ww");
        assert_eq!(info["peer"], server.peer_id().to_hex());
    }

    #[tokio::test]
    async fn peers_endpoint_lists_local_peer() {
        let server = WwServer::new(ServerConfig::default()).unwrap();
        let peers: Vec<PeerEntry> = get_json(server.router(), "/v1/peers").await;
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].peer, server.peer_id().to_hex());
        assert_eq!(peers[0].seq, 0);
        assert_eq!(peers[0].ttl_ms, 10_000);
    }

    #[tokio::test]
    async fn topics_endpoint_reports_refcounts() {
        let server = WwServer::new(ServerConfig::default()).unwrap();
        let pubsub = server.pubsub_client();
        let guard = pubsub.acquire().await.unwrap();
        let _a = guard.join("alpha").await.unwrap();
        let _b = guard.join("alpha").await.unwrap();
        let _c = guard.join("beta").await.unwrap();

        let topics: Vec<TopicEntry> = get_json(server.router(), "/v1/topics").await;
        assert_eq!(
            topics,
            vec![
                TopicEntry { name: "alpha".into(), refs: 2 },
                TopicEntry { name: "beta".into(), refs: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let server = WwServer::new(ServerConfig::default()).unwrap();
        let response = server
            .router()
            .oneshot(Request::builder().uri("/v1/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }
}
