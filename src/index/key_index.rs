//! Hierarchical key namespace
//!
//! A flat `path → slot` map behind one `RwLock`. Lookups take the read
//! lock; only the creation of missing nodes takes the write lock, and only
//! for as long as it takes to insert them. Each node carries a payload `T`
//! (the store hangs a key's series off it) plus its last-known status.
//!
//! Nodes can be reserved before they are published. A reserved node is
//! invisible to every query until `publish` marks it and its ancestors, so
//! a writer can hold a node while its write is still in flight without a
//! failed write leaving namespace entries behind.

use crate::index::Status;
use crate::storage::{KeyPath, ValueType};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// A node in the namespace
#[derive(Debug)]
pub struct KeyNode<T> {
    path: KeyPath,
    status: AtomicU8,
    published: AtomicBool,
    value_type: Mutex<Option<ValueType>>,
    data: T,
}

impl<T> KeyNode<T> {
    fn new(path: KeyPath, data: T) -> Self {
        Self {
            path,
            status: AtomicU8::new(Status::Unknown as u8),
            published: AtomicBool::new(false),
            value_type: Mutex::new(None),
            data,
        }
    }

    /// Visible to queries
    pub fn is_published(&self) -> bool {
        self.published.load(Ordering::Acquire)
    }

    pub fn path(&self) -> &KeyPath {
        &self.path
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Declared type of the newest data, `None` for pure folders
    pub fn value_type(&self) -> Option<ValueType> {
        *self.value_type.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_value_type(&self, value_type: ValueType) {
        *self.value_type.lock().unwrap_or_else(|e| e.into_inner()) = Some(value_type);
    }
}

/// Snapshot of a namespace node handed to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Key {
    pub path: KeyPath,
    /// Direct children, lexical by segment
    pub children: Vec<KeyPath>,
    pub status: Status,
    #[serde(rename = "type")]
    pub value_type: Option<ValueType>,
}

impl Key {
    /// Leaf keys hold data; folders do not
    pub fn is_leaf(&self) -> bool {
        self.value_type.is_some()
    }
}

struct Slot<T> {
    node: Arc<KeyNode<T>>,
    children: BTreeSet<String>,
}

/// The namespace tree
pub struct KeyIndex<T> {
    nodes: RwLock<HashMap<KeyPath, Slot<T>>>,
}

impl<T: Default> Default for KeyIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> KeyIndex<T> {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        let root = KeyPath::root();
        let node = KeyNode::new(root.clone(), T::default());
        node.published.store(true, Ordering::Release);
        nodes.insert(
            root,
            Slot {
                node: Arc::new(node),
                children: BTreeSet::new(),
            },
        );
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Create and publish every missing node along `path` and return the
    /// terminal one. Idempotent.
    pub fn ensure_path(&self, path: &KeyPath) -> Arc<KeyNode<T>> {
        let node = self.reserve_path(path);
        self.publish(path);
        node
    }

    /// Create every missing node along `path` without publishing it and
    /// return the terminal one. Already published nodes stay published.
    pub fn reserve_path(&self, path: &KeyPath) -> Arc<KeyNode<T>> {
        if let Some(node) = self.get(path) {
            return node;
        }

        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        let mut parent: Option<KeyPath> = None;
        for prefix in path.prefixes() {
            if !nodes.contains_key(&prefix) {
                if let (Some(parent_path), Some(name)) = (&parent, prefix.name()) {
                    if let Some(parent_slot) = nodes.get_mut(parent_path) {
                        parent_slot.children.insert(name.to_string());
                    }
                }
                tracing::trace!(path = %prefix, "Created key node");
                nodes.insert(
                    prefix.clone(),
                    Slot {
                        node: Arc::new(KeyNode::new(prefix.clone(), T::default())),
                        children: BTreeSet::new(),
                    },
                );
            }
            parent = Some(prefix);
        }

        let slot = nodes.entry(path.clone()).or_insert_with(|| Slot {
            node: Arc::new(KeyNode::new(path.clone(), T::default())),
            children: BTreeSet::new(),
        });
        Arc::clone(&slot.node)
    }
}

impl<T> KeyIndex<T> {
    /// Make `path` and its ancestors visible
    pub fn publish(&self, path: &KeyPath) {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        for prefix in path.prefixes() {
            if let Some(slot) = nodes.get(&prefix) {
                slot.node.published.store(true, Ordering::Release);
            }
        }
    }

    /// Published or reserved
    fn get(&self, path: &KeyPath) -> Option<Arc<KeyNode<T>>> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes.get(path).map(|slot| Arc::clone(&slot.node))
    }

    pub fn lookup(&self, path: &KeyPath) -> Option<Arc<KeyNode<T>>> {
        self.get(path).filter(|node| node.is_published())
    }

    /// Direct children of `path` in lexical order, `None` if `path` is unknown
    pub fn list_children(&self, path: &KeyPath) -> Option<Vec<Arc<KeyNode<T>>>> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        let slot = Self::visible(&nodes, path)?;
        Some(
            slot.children
                .iter()
                .filter_map(|name| path.child(name).ok())
                .filter_map(|child| Self::visible(&nodes, &child))
                .map(|s| Arc::clone(&s.node))
                .collect(),
        )
    }

    /// Snapshot of a node, `None` if `path` is unknown
    pub fn key(&self, path: &KeyPath) -> Option<Key> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        Self::visible(&nodes, path).map(|slot| Self::snapshot(&nodes, path, slot))
    }

    /// Snapshots of the direct children of `path`
    pub fn child_keys(&self, path: &KeyPath) -> Option<Vec<Key>> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        let slot = Self::visible(&nodes, path)?;
        Some(
            slot.children
                .iter()
                .filter_map(|name| path.child(name).ok())
                .filter_map(|child| {
                    Self::visible(&nodes, &child).map(|s| Self::snapshot(&nodes, &child, s))
                })
                .collect(),
        )
    }

    fn visible<'a>(nodes: &'a HashMap<KeyPath, Slot<T>>, path: &KeyPath) -> Option<&'a Slot<T>> {
        nodes.get(path).filter(|slot| slot.node.is_published())
    }

    fn snapshot(nodes: &HashMap<KeyPath, Slot<T>>, path: &KeyPath, slot: &Slot<T>) -> Key {
        Key {
            path: path.clone(),
            children: slot
                .children
                .iter()
                .filter_map(|name| path.child(name).ok())
                .filter(|child| Self::visible(nodes, child).is_some())
                .collect(),
            status: slot.node.status(),
            value_type: slot.node.value_type(),
        }
    }

    /// Every published node, root included
    pub fn nodes(&self) -> Vec<Arc<KeyNode<T>>> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes
            .values()
            .filter(|slot| slot.node.is_published())
            .map(|slot| Arc::clone(&slot.node))
            .collect()
    }

    /// Number of published nodes, root included
    pub fn len(&self) -> usize {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes.values().filter(|slot| slot.node.is_published()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> KeyPath {
        KeyPath::parse(s).unwrap()
    }

    #[test]
    fn test_root_exists() {
        let index: KeyIndex<()> = KeyIndex::new();
        assert!(index.lookup(&KeyPath::root()).is_some());
        assert_eq!(index.len(), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_ensure_path_creates_intermediates() {
        let index: KeyIndex<()> = KeyIndex::new();
        let node = index.ensure_path(&path("a.b.c"));
        assert_eq!(node.path(), &path("a.b.c"));
        assert_eq!(index.len(), 4);

        assert!(index.lookup(&path("a")).is_some());
        assert!(index.lookup(&path("a.b")).is_some());
        assert!(index.lookup(&path("a.c")).is_none());
    }

    #[test]
    fn test_ensure_path_is_idempotent() {
        let index: KeyIndex<()> = KeyIndex::new();
        let first = index.ensure_path(&path("x.y"));
        let second = index.ensure_path(&path("x.y"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_children_are_lexical_and_stable() {
        let index: KeyIndex<()> = KeyIndex::new();
        for p in ["s.zeta", "s.alpha", "s.mid", "s.alpha.deep"] {
            index.ensure_path(&path(p));
        }

        let names: Vec<String> = index
            .list_children(&path("s"))
            .unwrap()
            .iter()
            .map(|n| n.path().to_string())
            .collect();
        assert_eq!(names, vec!["s.alpha", "s.mid", "s.zeta"]);

        let again: Vec<KeyPath> = index
            .child_keys(&path("s"))
            .unwrap()
            .into_iter()
            .map(|k| k.path)
            .collect();
        assert_eq!(again, vec![path("s.alpha"), path("s.mid"), path("s.zeta")]);

        let root_children = index.child_keys(&KeyPath::root()).unwrap();
        assert_eq!(root_children.len(), 1);
        assert_eq!(root_children[0].children, vec![path("s.alpha"), path("s.mid"), path("s.zeta")]);
    }

    #[test]
    fn test_unknown_path() {
        let index: KeyIndex<()> = KeyIndex::new();
        assert!(index.key(&path("nope")).is_none());
        assert!(index.list_children(&path("nope")).is_none());
    }

    #[test]
    fn test_status_and_type() {
        let index: KeyIndex<()> = KeyIndex::new();
        let node = index.ensure_path(&path("a.b"));
        assert_eq!(node.status(), Status::Unknown);

        node.set_status(Status::Idle);
        node.set_value_type(ValueType::Float);

        let key = index.key(&path("a.b")).unwrap();
        assert_eq!(key.status, Status::Idle);
        assert!(key.is_leaf());
        assert!(!index.key(&path("a")).unwrap().is_leaf());
    }

    #[test]
    fn test_reserved_nodes_stay_hidden_until_published() {
        let index: KeyIndex<()> = KeyIndex::new();
        index.ensure_path(&path("a"));
        let reserved = index.reserve_path(&path("a.b.c"));
        assert!(!reserved.is_published());

        assert!(index.lookup(&path("a.b")).is_none());
        assert!(index.lookup(&path("a.b.c")).is_none());
        assert!(index.key(&path("a")).unwrap().children.is_empty());
        assert!(index.child_keys(&path("a")).unwrap().is_empty());
        assert_eq!(index.len(), 2);

        // a second reservation hands out the same node
        assert!(Arc::ptr_eq(&reserved, &index.reserve_path(&path("a.b.c"))));

        index.publish(&path("a.b.c"));
        assert!(reserved.is_published());
        assert!(index.lookup(&path("a.b")).is_some());
        assert_eq!(index.key(&path("a")).unwrap().children, vec![path("a.b")]);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_concurrent_creation() {
        let index: Arc<KeyIndex<()>> = Arc::new(KeyIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        index.ensure_path(&path(&format!("root.t{}.k{}", t % 4, i)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // root + "root" + 4 thread folders + 4 * 50 leaves
        assert_eq!(index.len(), 1 + 1 + 4 + 200);
        assert_eq!(index.list_children(&path("root")).unwrap().len(), 4);
    }
}
