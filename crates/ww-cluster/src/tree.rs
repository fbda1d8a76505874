//! Refcounted path registry.
//!
//! The registry is a trie of [`RefNode`]s. A node's reference count is the
//! number of live [`NodeRef`] handles on it plus the number of children in
//! its map. Each child therefore keeps its parent alive, and a node leaves
//! its parent's map exactly when its count crosses zero. Removal cascades
//! upward, one level at a time, through ancestors that lose their last
//! reference as a result.
//!
//! Locks are per node and only one is held at a time. A count is only ever
//! raised from zero while holding the parent's lock (a lookup through the
//! parent's map), and removal re-checks the count under the parent's write
//! lock, so a concurrent re-resolution of the same segment either keeps the
//! node alive or finds it already gone.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{trace, warn};

/// A single node of the path trie.
pub struct RefNode {
    name: String,
    parent: Option<Weak<RefNode>>,
    refs: AtomicUsize,
    children: RwLock<HashMap<String, Arc<RefNode>>>,
}

impl RefNode {
    fn root() -> Self {
        Self {
            name: String::new(),
            parent: None,
            refs: AtomicUsize::new(0),
            children: RwLock::new(HashMap::new()),
        }
    }

    fn child(name: &str, parent: Weak<RefNode>) -> Self {
        Self {
            name: name.to_string(),
            parent: Some(parent),
            refs: AtomicUsize::new(0),
            children: RwLock::new(HashMap::new()),
        }
    }

    /// Segment name. Empty for the root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` for the registry root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Current reference count.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Segments from the root down to this node, rebuilt from parent links.
    pub fn path(&self) -> Vec<String> {
        let mut segments = Vec::new();
        if self.is_root() {
            return segments;
        }
        segments.push(self.name.clone());

        let mut cursor = self.parent.as_ref().and_then(Weak::upgrade);
        while let Some(node) = cursor {
            if node.is_root() {
                break;
            }
            segments.push(node.name.clone());
            cursor = node.parent.as_ref().and_then(Weak::upgrade);
        }
        segments.reverse();
        segments
    }

    /// Take a reference on the named child, creating it if needed.
    ///
    /// Creating a child also takes one reference on `self`, held for as long
    /// as the child stays in the map.
    fn pin_child(self: &Arc<Self>, name: &str) -> Arc<RefNode> {
        {
            let children = self.children.read();
            if let Some(child) = children.get(name) {
                child.refs.fetch_add(1, Ordering::AcqRel);
                return Arc::clone(child);
            }
        }

        let mut children = self.children.write();
        let child = children.entry(name.to_string()).or_insert_with(|| {
            self.refs.fetch_add(1, Ordering::AcqRel);
            trace!(parent = %self.name, child = name, "node created");
            Arc::new(RefNode::child(name, Arc::downgrade(self)))
        });
        child.refs.fetch_add(1, Ordering::AcqRel);
        Arc::clone(child)
    }
}

impl fmt::Debug for RefNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefNode")
            .field("name", &self.name)
            .field("refs", &self.ref_count())
            .field("children", &self.children.read().len())
            .finish()
    }
}

fn acquire(node: &Arc<RefNode>) -> NodeRef {
    node.refs.fetch_add(1, Ordering::AcqRel);
    NodeRef {
        node: Arc::clone(node),
    }
}

/// Drop one reference on `node`, pruning it and its ancestors as they
/// cross zero.
fn release(node: &Arc<RefNode>) {
    let mut node = Arc::clone(node);
    loop {
        let prev = match node
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => prev,
            Err(_) => {
                warn!(node = %node.name, "release of node with no references ignored");
                return;
            }
        };
        if prev != 1 {
            return;
        }

        // The root is never removed. A parent that no longer exists means
        // the whole registry has been dropped.
        let Some(parent) = node.parent.as_ref().and_then(Weak::upgrade) else {
            return;
        };

        {
            let mut siblings = parent.children.write();
            let linked = siblings
                .get(&node.name)
                .is_some_and(|current| Arc::ptr_eq(current, &node));
            if !linked || node.refs.load(Ordering::Acquire) != 0 {
                return;
            }
            siblings.remove(&node.name);
        }
        trace!(parent = %parent.name, child = %node.name, "node pruned");

        // Drop the reference the removed child held on its parent.
        node = parent;
    }
}

/// A counted handle on a [`RefNode`].
///
/// Cloning takes another reference. Dropping (or [`NodeRef::release`])
/// gives it back, pruning the node once nothing refers to it.
pub struct NodeRef {
    node: Arc<RefNode>,
}

impl NodeRef {
    /// Resolve `segments` relative to this node.
    ///
    /// Missing nodes are created along the way. The returned handle holds
    /// exactly one reference on the target; an empty sequence yields a new
    /// reference to this node.
    pub fn walk<S: AsRef<str>>(&self, segments: &[S]) -> NodeRef {
        let mut current = acquire(&self.node);
        for segment in segments {
            let child = current.node.pin_child(segment.as_ref());
            // Safe to let go: the pinned child keeps `current` referenced.
            current = NodeRef { node: child };
        }
        current
    }

    /// Snapshot of the live children, each pinned until the snapshot is
    /// released.
    pub fn children(&self) -> Children {
        let children = self.node.children.read();
        let mut entries: Vec<NodeRef> = children.values().map(acquire).collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Children { entries }
    }

    /// Segment name of the node. Empty for the root.
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// Full path of the node.
    pub fn path(&self) -> Vec<String> {
        self.node.path()
    }

    /// Number of segments between the root and this node.
    pub fn depth(&self) -> usize {
        self.path().len()
    }

    pub fn is_root(&self) -> bool {
        self.node.is_root()
    }

    /// Current reference count of the node.
    pub fn ref_count(&self) -> usize {
        self.node.ref_count()
    }

    /// Returns `true` if both handles refer to the same node object.
    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Give the reference back.
    pub fn release(self) {
        drop(self);
    }
}

impl Clone for NodeRef {
    fn clone(&self) -> Self {
        acquire(&self.node)
    }
}

impl Drop for NodeRef {
    fn drop(&mut self) {
        release(&self.node);
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("path", &self.path())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Point-in-time snapshot of a node's children.
///
/// Every entry is pinned; dropping the snapshot (or calling
/// [`Children::release`]) releases all of them together.
#[derive(Debug)]
pub struct Children {
    entries: Vec<NodeRef>,
}

impl Children {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Child names in lexical order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(NodeRef::name).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeRef> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&NodeRef> {
        self.entries.iter().find(|n| n.name() == name)
    }

    /// Release every pinned child at once.
    pub fn release(self) {
        drop(self);
    }
}

impl IntoIterator for Children {
    type Item = NodeRef;
    type IntoIter = std::vec::IntoIter<NodeRef>;

    /// Hand each pinned child over to the caller, who then releases them
    /// individually.
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Concurrent trie of refcounted nodes rooted at the cluster root.
///
/// Cloning yields another handle on the same tree.
#[derive(Clone)]
pub struct PathRegistry {
    root: Arc<RefNode>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self {
            root: Arc::new(RefNode::root()),
        }
    }

    /// A reference to the root node.
    pub fn root(&self) -> NodeRef {
        acquire(&self.root)
    }

    /// Resolve an absolute path, creating missing nodes.
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> NodeRef {
        self.resolve_from(&self.root(), segments)
    }

    /// Resolve `segments` relative to `base`.
    pub fn resolve_from<S: AsRef<str>>(&self, base: &NodeRef, segments: &[S]) -> NodeRef {
        base.walk(segments)
    }

    /// Pinned snapshot of `node`'s children.
    pub fn children(&self, node: &NodeRef) -> Children {
        node.children()
    }

    /// Returns `true` if no node other than the root is live.
    pub fn is_empty(&self) -> bool {
        self.root.children.read().is_empty()
    }

    /// Number of live nodes, excluding the root.
    pub fn node_count(&self) -> usize {
        fn count(node: &RefNode) -> usize {
            let children = node.children.read();
            children.len() + children.values().map(|c| count(c)).sum::<usize>()
        }
        count(&self.root)
    }
}

impl Default for PathRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PathRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRegistry")
            .field("nodes", &self.node_count())
            .finish()
    }
}
