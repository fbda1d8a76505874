use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use ww_cluster::InMemoryRoutingTable;
use ww_pubsub::TopicRegistry;
use ww_types::PeerId;

/// Shared state of the status endpoint.
#[derive(Clone, Debug)]
pub struct StatusState {
    pub ns: String,
    pub peer: PeerId,
    pub view: Arc<InMemoryRoutingTable>,
    pub topics: TopicRegistry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self { status: "ok".into() }
    }
}

/// One live member of the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub peer: String,
    pub seq: u64,
    pub ttl_ms: u64,
    pub remaining_ms: u64,
}

/// One joined topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub name: String,
    pub refs: usize,
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Info handler.
pub async fn info_handler(State(state): State<StatusState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "ww",
        "version": env!("CARGO_PKG_VERSION"),
        "ns": state.ns,
        "peer": state.peer.to_hex(),
    }))
}

/// Live membership, in view order.
pub async fn peers_handler(State(state): State<StatusState>) -> Json<Vec<PeerEntry>> {
    let now = Instant::now();
    let peers = state
        .view
        .snapshot(now)
        .into_iter()
        .map(|r| PeerEntry {
            peer: r.peer.to_hex(),
            seq: r.seq,
            ttl_ms: r.ttl.as_millis() as u64,
            remaining_ms: r.remaining(now).as_millis() as u64,
        })
        .collect();
    Json(peers)
}

/// Joined topics and their reference counts.
pub async fn topics_handler(State(state): State<StatusState>) -> Json<Vec<TopicEntry>> {
    let topics = state
        .topics
        .topics()
        .into_iter()
        .map(|(name, refs)| TopicEntry { name, refs })
        .collect();
    Json(topics)
}
