//! Anchor capabilities.
//!
//! An [`AnchorServer`] turns textual paths into [`Anchor`] capabilities
//! backed by the shared [`PathRegistry`]. The depth of the path picks the
//! anchor variant: the root, a host (one segment naming a live peer) or a
//! container (anything deeper, holding a byte blob).
//!
//! Every anchor pins its registry node for as long as any client of the
//! capability is alive. Releasing the last client shuts the capability down
//! and gives the node back, which prunes it if nothing else refers to it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, trace};
use ww_cap::{Client, Policy, Server};
use ww_types::{path, PeerId, Record};

use crate::container::ContainerStore;
use crate::error::{ClusterError, ClusterResult};
use crate::routing::RoutingTable;
use crate::tree::{NodeRef, PathRegistry};

/// The variant of an anchor, fixed when the anchor is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorKind {
    /// The cluster root. Lists the hosts of the membership view.
    Root,
    /// A host anchor, bound to the membership record of one peer.
    Host(Record),
    /// A container anchor below `host`, storing a blob under `key`.
    Container { host: PeerId, key: String },
}

impl AnchorKind {
    /// The peer an anchor of this kind lives under. `None` for the root.
    pub fn host(&self) -> Option<PeerId> {
        match self {
            AnchorKind::Root => None,
            AnchorKind::Host(record) => Some(record.peer),
            AnchorKind::Container { host, .. } => Some(*host),
        }
    }
}

struct Shared {
    registry: PathRegistry,
    view: Arc<dyn RoutingTable>,
    store: ContainerStore,
    policy: Policy,
    closed: AtomicBool,
}

impl Shared {
    fn ensure_open(&self) -> ClusterResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClusterError::Closed);
        }
        Ok(())
    }
}

/// Entry point of the anchor namespace.
///
/// Cloning yields another handle on the same shared state.
#[derive(Clone)]
pub struct AnchorServer {
    shared: Arc<Shared>,
}

impl AnchorServer {
    /// Create a server with a fresh registry over `view`.
    pub fn new(view: Arc<dyn RoutingTable>, policy: Policy) -> Self {
        Self::with_registry(PathRegistry::new(), view, policy)
    }

    /// Create a server over an existing registry.
    pub fn with_registry(registry: PathRegistry, view: Arc<dyn RoutingTable>, policy: Policy) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                view,
                store: ContainerStore::new(),
                policy,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn registry(&self) -> &PathRegistry {
        &self.shared.registry
    }

    pub fn store(&self) -> &ContainerStore {
        &self.shared.store
    }

    pub fn policy(&self) -> Policy {
        self.shared.policy
    }

    /// Resolve `path` to an anchor capability.
    ///
    /// Fails with [`ClusterError::InvalidPath`] for malformed paths and with
    /// [`ClusterError::UnknownAnchor`] if the first segment does not name a
    /// live peer.
    pub async fn walk(&self, path: &str) -> ClusterResult<Client<Anchor>> {
        let segments = parse_path(path)?;
        self.walk_segments(segments).await
    }

    /// Resolve already-split segments to an anchor capability.
    pub async fn walk_segments(&self, segments: Vec<String>) -> ClusterResult<Client<Anchor>> {
        self.shared.ensure_open()?;
        path::validate(&segments).map_err(|source| ClusterError::InvalidPath {
            path: path::join(&segments),
            source,
        })?;

        let kind = self.classify(&segments).await?;
        let node = self.shared.registry.resolve(&segments);
        debug!(path = %path::join(&segments), depth = segments.len(), "anchor resolved");
        Ok(self.export(kind, node))
    }

    /// List the anchors directly below `path`.
    ///
    /// At the root this enumerates the membership view, one host anchor per
    /// live peer. Anywhere else it lists the live children of the node.
    pub async fn ls(&self, path: &str) -> ClusterResult<AnchorIterator> {
        self.shared.ensure_open()?;
        let segments = parse_path(path)?;
        let Some(host) = self.classify(&segments).await?.host() else {
            return Ok(AnchorIterator::view(Arc::clone(&self.shared)));
        };
        let node = self.shared.registry.resolve(&segments);
        Ok(AnchorIterator::children(Arc::clone(&self.shared), host, &node))
    }

    /// Refuse any further operation. Existing capabilities stay valid until
    /// released. Returns `false` if the server was already closed.
    pub fn close(&self) -> bool {
        let first = !self.shared.closed.swap(true, Ordering::AcqRel);
        if first {
            info!(nodes = self.shared.registry.node_count(), "anchor server closed");
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    async fn classify(&self, segments: &[String]) -> ClusterResult<AnchorKind> {
        let Some(first) = segments.first() else {
            return Ok(AnchorKind::Root);
        };
        let peer =
            PeerId::from_hex(first).map_err(|_| ClusterError::UnknownAnchor(first.clone()))?;
        let record = self
            .shared
            .view
            .lookup(&peer)
            .await?
            .ok_or_else(|| ClusterError::UnknownAnchor(first.clone()))?;

        if segments.len() == 1 {
            Ok(AnchorKind::Host(record))
        } else {
            Ok(AnchorKind::Container {
                host: peer,
                key: path::join(segments),
            })
        }
    }

    fn export(&self, kind: AnchorKind, node: NodeRef) -> Client<Anchor> {
        export_anchor(&self.shared, kind, node)
    }
}

impl Server for AnchorServer {
    fn shutdown(&self) {
        self.close();
    }
}

impl fmt::Debug for AnchorServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnchorServer")
            .field("registry", &self.shared.registry)
            .field("containers", &self.shared.store.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn parse_path(text: &str) -> ClusterResult<Vec<String>> {
    path::parse(text).map_err(|source| ClusterError::InvalidPath {
        path: text.to_string(),
        source,
    })
}

fn export_anchor(shared: &Arc<Shared>, kind: AnchorKind, node: NodeRef) -> Client<Anchor> {
    let anchor = Anchor {
        kind,
        node,
        shared: Arc::clone(shared),
    };
    Client::export(anchor, &shared.policy)
}

/// A resolved point of the anchor namespace.
///
/// Holds one reference on its registry node, given back when the
/// capability shuts down.
pub struct Anchor {
    kind: AnchorKind,
    /// Released by `NodeRef`'s drop when the export is dropped, right after
    /// [`Server::shutdown`] runs.
    node: NodeRef,
    shared: Arc<Shared>,
}

impl Anchor {
    pub fn kind(&self) -> &AnchorKind {
        &self.kind
    }

    /// Path segments, rebuilt from the registry.
    pub fn path(&self) -> Vec<String> {
        self.node.path()
    }

    /// Last path segment. Empty for the root.
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// The peer this anchor lives under, if any.
    pub fn host(&self) -> Option<PeerId> {
        self.kind.host()
    }

    /// Store `data` in this container.
    pub fn set(&self, data: Bytes) -> ClusterResult<()> {
        self.shared.ensure_open()?;
        let key = self.container_key("set")?;
        trace!(key, len = data.len(), "container set");
        self.shared.store.set(key, data);
        Ok(())
    }

    /// Read this container. Empty if nothing was stored.
    pub fn get(&self) -> ClusterResult<Bytes> {
        self.shared.ensure_open()?;
        let key = self.container_key("get")?;
        Ok(self.shared.store.get(key))
    }

    /// Resolve `relative` below this anchor.
    pub async fn walk(&self, relative: &str) -> ClusterResult<Client<Anchor>> {
        let mut segments = self.path();
        segments.extend(parse_path(relative)?);
        self.server().walk_segments(segments).await
    }

    /// List the anchors directly below this one.
    pub fn ls(&self) -> ClusterResult<AnchorIterator> {
        self.shared.ensure_open()?;
        let shared = Arc::clone(&self.shared);
        Ok(match self.kind.host() {
            None => AnchorIterator::view(shared),
            Some(host) => AnchorIterator::children(shared, host, &self.node),
        })
    }

    fn container_key(&self, op: &str) -> ClusterResult<&str> {
        match &self.kind {
            AnchorKind::Container { key, .. } => Ok(key.as_str()),
            AnchorKind::Root => Err(ClusterError::InvalidOperation(format!("{op} on root anchor"))),
            AnchorKind::Host(_) => Err(ClusterError::InvalidOperation(format!("{op} on host anchor"))),
        }
    }

    fn server(&self) -> AnchorServer {
        AnchorServer {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Server for Anchor {
    fn shutdown(&self) {
        trace!(path = %path::join(&self.node.path()), "anchor released");
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("kind", &self.kind)
            .field("path", &path::join(&self.node.path()))
            .finish()
    }
}

enum Source {
    /// Membership view, loaded on the first call to `next`.
    View { records: Option<std::vec::IntoIter<Record>> },
    /// Pinned children of a host or container node.
    Children {
        host: PeerId,
        entries: std::vec::IntoIter<NodeRef>,
    },
}

/// Cursor over the anchors below a path.
///
/// Call [`next`](AnchorIterator::next) until it returns `false`, then check
/// [`err`](AnchorIterator::err). [`finish`](AnchorIterator::finish) releases
/// everything the iterator still holds.
pub struct AnchorIterator {
    shared: Arc<Shared>,
    source: Source,
    current: Option<Client<Anchor>>,
    err: Option<ClusterError>,
}

impl AnchorIterator {
    fn view(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            source: Source::View { records: None },
            current: None,
            err: None,
        }
    }

    fn children(shared: Arc<Shared>, host: PeerId, node: &NodeRef) -> Self {
        Self {
            shared,
            source: Source::Children {
                host,
                entries: node.children().into_iter(),
            },
            current: None,
            err: None,
        }
    }

    /// Advance to the next anchor.
    ///
    /// `timeout` bounds the load of the membership view. Returns `false`
    /// when the listing is exhausted or failed.
    pub async fn next(&mut self, timeout: Duration) -> bool {
        self.current = None;
        if self.err.is_some() {
            return false;
        }
        if let Err(e) = self.shared.ensure_open() {
            self.err = Some(e);
            return false;
        }

        let (kind, node) = match &mut self.source {
            Source::View { records } => {
                if records.is_none() {
                    match tokio::time::timeout(timeout, self.shared.view.iter()).await {
                        Ok(Ok(loaded)) => *records = Some(loaded.into_iter()),
                        Ok(Err(e)) => {
                            self.err = Some(e);
                            return false;
                        }
                        Err(_) => {
                            self.err = Some(ClusterError::Timeout(timeout));
                            return false;
                        }
                    }
                }
                let Some(record) = records.as_mut().and_then(Iterator::next) else {
                    return false;
                };
                let node = self.shared.registry.resolve(&[record.peer.to_hex()]);
                (AnchorKind::Host(record), node)
            }
            Source::Children { host, entries } => {
                let Some(node) = entries.next() else {
                    return false;
                };
                let key = path::join(&node.path());
                (AnchorKind::Container { host: *host, key }, node)
            }
        };

        self.current = Some(export_anchor(&self.shared, kind, node));
        true
    }

    /// A new reference to the anchor the iterator is positioned on.
    pub fn current(&self) -> Option<Client<Anchor>> {
        self.current.as_ref().map(Client::add_ref)
    }

    /// The error that ended iteration, if any.
    pub fn err(&self) -> Option<&ClusterError> {
        self.err.as_ref()
    }

    /// Release the iterator and every node it still pins.
    pub fn finish(self) {
        drop(self);
    }
}

impl fmt::Debug for AnchorIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            Source::View { .. } => "view",
            Source::Children { .. } => "children",
        };
        f.debug_struct("AnchorIterator")
            .field("source", &source)
            .field("err", &self.err)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::InMemoryRoutingTable;
    use async_trait::async_trait;

    const WAIT: Duration = Duration::from_secs(1);

    fn setup(peers: usize) -> (AnchorServer, Arc<InMemoryRoutingTable>, Vec<PeerId>) {
        let table = Arc::new(InMemoryRoutingTable::new());
        let ids: Vec<PeerId> = (0..peers).map(|_| PeerId::ephemeral()).collect();
        for id in &ids {
            table.upsert(Record::new(*id, 0, Duration::from_secs(60)));
        }
        let view: Arc<dyn RoutingTable> = table.clone();
        (AnchorServer::new(view, Policy::default()), table, ids)
    }

    async fn collect(mut it: AnchorIterator) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        while it.next(WAIT).await {
            let anchor = it.current().unwrap();
            paths.push(anchor.try_acquire().unwrap().path());
        }
        assert!(it.err().is_none());
        it.finish();
        paths
    }

    // ---- Walk ----
    #[tokio::test]
    async fn walk_picks_variant_by_depth() {
        let (server, _, ids) = setup(1);
        let host = ids[0].to_hex();

        let root = server.walk("/").await.unwrap();
        assert_eq!(*root.try_acquire().unwrap().kind(), AnchorKind::Root);

        let h = server.walk(&format!("/{host}")).await.unwrap();
        let guard = h.try_acquire().unwrap();
        assert!(matches!(guard.kind(), AnchorKind::Host(r) if r.peer == ids[0]));
        assert_eq!(guard.host(), Some(ids[0]));
        assert_eq!(guard.name(), host);

        let c = server.walk(&format!("/{host}/a/b")).await.unwrap();
        let guard = c.try_acquire().unwrap();
        assert_eq!(
            *guard.kind(),
            AnchorKind::Container {
                host: ids[0],
                key: format!("/{host}/a/b"),
            }
        );
        assert_eq!(guard.path(), vec![host.clone(), "a".into(), "b".into()]);
    }

    #[tokio::test]
    async fn walk_rejects_invalid_path() {
        let (server, _, _) = setup(0);
        let err = server.walk("/a//b").await.unwrap_err();
        assert!(matches!(err, ClusterError::InvalidPath { .. }));

        let err = server.walk_segments(vec!["..".into()]).await.unwrap_err();
        assert!(matches!(err, ClusterError::InvalidPath { .. }));
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn walk_rejects_unknown_host() {
        let (server, _, _) = setup(1);
        let stranger = PeerId::ephemeral().to_hex();

        let err = server.walk(&format!("/{stranger}/x")).await.unwrap_err();
        assert_eq!(err, ClusterError::UnknownAnchor(stranger));

        let err = server.walk("/not-a-peer").await.unwrap_err();
        assert!(matches!(err, ClusterError::UnknownAnchor(_)));
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn releasing_anchor_prunes_registry() {
        let (server, _, ids) = setup(1);
        let anchor = server
            .walk(&format!("/{}/a/b", ids[0]))
            .await
            .unwrap();
        let copy = anchor.add_ref();
        assert_eq!(server.registry().node_count(), 3);

        anchor.release();
        assert_eq!(server.registry().node_count(), 3);
        copy.release();
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn anchor_shutdown_releases_its_node() {
        let (server, _, ids) = setup(1);
        let host = server.walk(&format!("/{}", ids[0])).await.unwrap();
        let leaf = server.walk(&format!("/{}/a", ids[0])).await.unwrap();

        let registry = server.registry();
        let node = registry.resolve(&[ids[0].to_hex()]);
        // Pins: host anchor, the leaf as a child, and `node`.
        assert_eq!(node.ref_count(), 3);

        leaf.release();
        assert_eq!(node.ref_count(), 2);
        host.release();
        assert_eq!(node.ref_count(), 1);
        node.release();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn relative_walk_extends_path() {
        let (server, _, ids) = setup(1);
        let host = server.walk(&format!("/{}", ids[0])).await.unwrap();
        let child = host.try_acquire().unwrap().walk("x/y").await.unwrap();
        assert_eq!(
            child.try_acquire().unwrap().path(),
            vec![ids[0].to_hex(), "x".into(), "y".into()]
        );
    }

    // ---- Containers ----
    #[tokio::test]
    async fn containers_share_store_by_path() {
        let (server, _, ids) = setup(1);
        let path = format!("/{}/data", ids[0]);
        let writer = server.walk(&path).await.unwrap();
        let reader = server.walk(&path).await.unwrap();

        assert!(reader.try_acquire().unwrap().get().unwrap().is_empty());
        writer
            .try_acquire()
            .unwrap()
            .set(Bytes::from_static(b"hello"))
            .unwrap();
        assert_eq!(
            reader.try_acquire().unwrap().get().unwrap(),
            Bytes::from_static(b"hello")
        );
    }

    #[tokio::test]
    async fn set_on_host_or_root_is_invalid() {
        let (server, _, ids) = setup(1);
        let root = server.walk("/").await.unwrap();
        let host = server.walk(&format!("/{}", ids[0])).await.unwrap();

        let err = root.try_acquire().unwrap().set(Bytes::new()).unwrap_err();
        assert!(matches!(err, ClusterError::InvalidOperation(_)));
        let err = host.try_acquire().unwrap().get().unwrap_err();
        assert!(matches!(err, ClusterError::InvalidOperation(_)));
    }

    // ---- Ls ----
    #[tokio::test]
    async fn ls_root_lists_hosts_in_view_order() {
        let (server, table, ids) = setup(3);
        table.upsert(Record::new(PeerId::ephemeral(), 0, Duration::ZERO));

        let paths = collect(server.ls("/").await.unwrap()).await;
        let expected: Vec<Vec<String>> = ids.iter().map(|id| vec![id.to_hex()]).collect();
        assert_eq!(paths, expected);
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn ls_lists_live_children() {
        let (server, _, ids) = setup(1);
        let host = ids[0].to_hex();
        let a = server.walk(&format!("/{host}/a")).await.unwrap();
        let b = server.walk(&format!("/{host}/b/deep")).await.unwrap();

        let paths = collect(server.ls(&format!("/{host}")).await.unwrap()).await;
        assert_eq!(
            paths,
            vec![vec![host.clone(), "a".into()], vec![host.clone(), "b".into()]]
        );

        a.release();
        let paths = collect(server.ls(&format!("/{host}")).await.unwrap()).await;
        assert_eq!(paths, vec![vec![host.clone(), "b".into()]]);

        b.release();
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn listed_children_are_containers() {
        let (server, _, ids) = setup(1);
        let host = server.walk(&format!("/{}", ids[0])).await.unwrap();
        let _leaf = server.walk(&format!("/{}/box", ids[0])).await.unwrap();

        let mut it = host.try_acquire().unwrap().ls().unwrap();
        assert!(it.next(WAIT).await);
        let child = it.current().unwrap();
        it.finish();

        let guard = child.try_acquire().unwrap();
        assert_eq!(guard.host(), Some(ids[0]));
        guard.set(Bytes::from_static(b"v")).unwrap();
    }

    #[tokio::test]
    async fn unfinished_listing_pins_children() {
        let (server, _, ids) = setup(1);
        let host = ids[0].to_hex();
        let leaf = server.walk(&format!("/{host}/a")).await.unwrap();

        let it = server.ls(&format!("/{host}")).await.unwrap();
        leaf.release();
        assert_eq!(server.registry().node_count(), 2);

        it.finish();
        assert!(server.registry().is_empty());
    }

    struct StalledView;

    #[async_trait]
    impl RoutingTable for StalledView {
        async fn iter(&self) -> ClusterResult<Vec<Record>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn view_timeout_is_reported() {
        let server = AnchorServer::new(Arc::new(StalledView), Policy::default());
        let mut it = server.ls("/").await.unwrap();

        let timeout = Duration::from_millis(10);
        assert!(!it.next(timeout).await);
        assert_eq!(it.err(), Some(&ClusterError::Timeout(timeout)));
        assert!(it.current().is_none());
        assert!(!it.next(timeout).await);
    }

    // ---- Close ----
    #[tokio::test]
    async fn closed_server_refuses_operations() {
        let (server, _, ids) = setup(1);
        let container = server.walk(&format!("/{}/c", ids[0])).await.unwrap();

        assert!(server.close());
        assert!(!server.close());
        assert_eq!(server.walk("/").await.unwrap_err(), ClusterError::Closed);
        assert_eq!(
            container.try_acquire().unwrap().get().unwrap_err(),
            ClusterError::Closed
        );

        container.release();
        assert!(server.registry().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_walks_share_nodes() {
        let (server, _, ids) = setup(1);
        let path = format!("/{}/shared", ids[0]);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let server = server.clone();
                let path = path.clone();
                tokio::spawn(async move { server.walk(&path).await.unwrap() })
            })
            .collect();

        let mut anchors = Vec::new();
        for t in tasks {
            anchors.push(t.await.unwrap());
        }
        assert_eq!(server.registry().node_count(), 2);

        drop(anchors);
        assert!(server.registry().is_empty());
    }
}
