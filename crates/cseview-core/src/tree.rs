//! Path-addressed tree of record and statistics.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::node::{ChildMap, LoadState, NodePath, ResourceNode};

/// Summary statistics for a (possibly partially loaded) tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total number of branches, loaded or not.
    pub branches: u64,
    /// Total number of leaves.
    pub leaves: u64,
    /// Branches whose children have not been fetched yet.
    pub unloaded_branches: u64,
    /// Maximum depth reached (root = 0).
    pub max_depth: u32,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of nodes, root included.
    pub fn total_nodes(&self) -> u64 {
        self.branches + self.leaves
    }

    /// Check if every branch has been fetched.
    pub fn is_complete(&self) -> bool {
        self.unloaded_branches == 0
    }

    fn record(&mut self, node: &ResourceNode, depth: u32) {
        self.max_depth = self.max_depth.max(depth);
        if node.is_leaf() {
            self.leaves += 1;
        } else {
            self.branches += 1;
            if node.children.is_none() {
                self.unloaded_branches += 1;
            }
        }
    }
}

/// The authoritative local copy of the remote tree.
///
/// The root pointer is swapped as one step on every merge. A merge
/// path-copies only the ancestor chain of its target, so sibling subtrees
/// stay shared with earlier snapshots and concurrent merges on disjoint
/// paths never clobber each other.
#[derive(Debug)]
pub struct TreeStore {
    root: RwLock<Arc<ResourceNode>>,
    loading: Mutex<HashSet<NodePath>>,
}

impl TreeStore {
    /// Create a store holding only `root`.
    pub fn new(root: ResourceNode) -> Self {
        Self {
            root: RwLock::new(Arc::new(root)),
            loading: Mutex::new(HashSet::new()),
        }
    }

    /// Snapshot of the current tree.
    pub fn root(&self) -> Arc<ResourceNode> {
        Arc::clone(&self.root.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Find the node at `path`.
    pub fn lookup(&self, path: &NodePath) -> Option<Arc<ResourceNode>> {
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            if node.path == *path {
                return Some(node);
            }
            if node.path.is_ancestor_of(path) {
                stack.extend(node.children().cloned());
            }
        }
        None
    }

    /// Attach `children` to the unloaded branch at `path`.
    ///
    /// Rebuilds the ancestors of `path` from the current root and swaps the
    /// root pointer. Siblings of every rebuilt node are carried over by
    /// reference.
    pub fn merge_subtree(&self, path: &NodePath, children: ChildMap) -> Result<(), MergeError> {
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        let rebuilt = path_copy(&root, path, Arc::new(children))?;
        *root = rebuilt;
        tracing::debug!(path = %path, "merged subtree");
        Ok(())
    }

    /// Mark `path` as being expanded. Returns false if it already was.
    pub fn mark_loading(&self, path: &NodePath) -> bool {
        self.loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone())
    }

    /// Remove `path` from the loading set.
    pub fn clear_loading(&self, path: &NodePath) {
        self.loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    /// Check if `path` is currently being expanded.
    pub fn is_loading(&self, path: &NodePath) -> bool {
        self.loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    /// Mark `path` loading for as long as the returned guard lives.
    ///
    /// Returns `None` if another expansion of `path` is already running.
    pub fn begin_loading(&self, path: &NodePath) -> Option<LoadingGuard<'_>> {
        self.mark_loading(path).then(|| LoadingGuard {
            store: self,
            path: path.clone(),
        })
    }

    /// Loading state of `path`, or `None` if no node lives there.
    pub fn load_state(&self, path: &NodePath) -> Option<LoadState> {
        if self.is_loading(path) {
            return Some(LoadState::Loading);
        }
        self.lookup(path).map(|node| {
            if node.is_loaded() {
                LoadState::Loaded
            } else {
                LoadState::Unloaded
            }
        })
    }

    /// Every node path in pre-order, siblings in listing order.
    pub fn paths(&self) -> Vec<NodePath> {
        let mut paths = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            paths.push(node.path.clone());
            stack.extend(node.children().rev().cloned());
        }
        paths
    }

    /// Compute statistics over the current snapshot.
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::new();
        let mut stack = vec![(self.root(), 0u32)];
        while let Some((node, depth)) = stack.pop() {
            stats.record(&node, depth);
            stack.extend(node.children().map(|child| (Arc::clone(child), depth + 1)));
        }
        stats
    }
}

/// Clears a loading mark when dropped.
#[derive(Debug)]
pub struct LoadingGuard<'a> {
    store: &'a TreeStore,
    path: NodePath,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.clear_loading(&self.path);
    }
}

/// Rebuild the chain from `root` down to `path` with new children at the
/// target.
fn path_copy(
    root: &Arc<ResourceNode>,
    path: &NodePath,
    children: Arc<ChildMap>,
) -> Result<Arc<ResourceNode>, MergeError> {
    let not_found = || MergeError::NotFound { path: path.clone() };

    let mut ancestors: Vec<Arc<ResourceNode>> = Vec::new();
    let mut current = Arc::clone(root);
    while current.path != *path {
        if !current.path.is_ancestor_of(path) {
            return Err(not_found());
        }
        let next = current
            .children()
            .find(|child| child.path.contains(path))
            .cloned()
            .ok_or_else(not_found)?;
        ancestors.push(current);
        current = next;
    }

    if current.is_leaf() {
        return Err(MergeError::NotABranch { path: path.clone() });
    }
    if current.children.is_some() {
        return Err(MergeError::AlreadyLoaded { path: path.clone() });
    }

    let mut rebuilt = Arc::new(current.with_children(children));
    while let Some(parent) = ancestors.pop() {
        let mut siblings = parent.children.as_deref().cloned().unwrap_or_default();
        siblings.insert(rebuilt.name.clone(), rebuilt);
        rebuilt = Arc::new(parent.with_children(Arc::new(siblings)));
    }
    Ok(rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(parent: &NodePath, name: &str) -> (compact_str::CompactString, Arc<ResourceNode>) {
        let path = parent.join(name);
        let node = ResourceNode::branch(name, path.clone(), format!("http://cse/{path}"), name);
        (name.into(), Arc::new(node))
    }

    fn leaf(parent: &NodePath, name: &str) -> (compact_str::CompactString, Arc<ResourceNode>) {
        let node = ResourceNode::leaf(name, parent.join(name), name.into());
        (name.into(), Arc::new(node))
    }

    #[test]
    fn test_tree_stats_default() {
        let stats = TreeStats::default();
        assert_eq!(stats.total_nodes(), 0);
        assert!(stats.is_complete());
    }

    #[test]
    fn test_merge_then_lookup() {
        let store = TreeStore::new(ResourceNode::root("cse", "http://cse", "id0"));
        let root = NodePath::new("cse");
        store
            .merge_subtree(&root, ChildMap::from_iter([branch(&root, "a"), leaf(&root, "b")]))
            .unwrap();

        let a = store.lookup(&root.join("a")).unwrap();
        assert!(a.is_branch());
        assert_eq!(store.load_state(&a.path), Some(LoadState::Unloaded));
        assert_eq!(store.load_state(&root), Some(LoadState::Loaded));
        assert_eq!(store.load_state(&NodePath::new("cse/zz")), None);
    }

    #[test]
    fn test_merge_rejects_leaf_and_reload() {
        let store = TreeStore::new(ResourceNode::root("cse", "http://cse", "id0"));
        let root = NodePath::new("cse");
        store
            .merge_subtree(&root, ChildMap::from_iter([leaf(&root, "b")]))
            .unwrap();

        assert_eq!(
            store.merge_subtree(&root.join("b"), ChildMap::new()),
            Err(MergeError::NotABranch { path: root.join("b") })
        );
        assert_eq!(
            store.merge_subtree(&root, ChildMap::new()),
            Err(MergeError::AlreadyLoaded { path: root.clone() })
        );
        assert_eq!(
            store.merge_subtree(&root.join("nope"), ChildMap::new()),
            Err(MergeError::NotFound { path: root.join("nope") })
        );
    }

    #[test]
    fn test_loading_guard_clears_on_drop() {
        let store = TreeStore::new(ResourceNode::root("cse", "http://cse", "id0"));
        let root = NodePath::new("cse");
        {
            let guard = store.begin_loading(&root);
            assert!(guard.is_some());
            assert!(store.begin_loading(&root).is_none());
            assert_eq!(store.load_state(&root), Some(LoadState::Loading));
        }
        assert!(!store.is_loading(&root));
    }

    #[test]
    fn test_paths_pre_order() {
        let store = TreeStore::new(ResourceNode::root("cse", "http://cse", "id0"));
        let root = NodePath::new("cse");
        store
            .merge_subtree(&root, ChildMap::from_iter([branch(&root, "a"), leaf(&root, "b")]))
            .unwrap();
        let a = root.join("a");
        store
            .merge_subtree(&a, ChildMap::from_iter([leaf(&a, "x")]))
            .unwrap();

        let paths: Vec<_> = store.paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, ["cse", "cse/a", "cse/a/x", "cse/b"]);

        let stats = store.stats();
        assert_eq!(stats.branches, 2);
        assert_eq!(stats.leaves, 2);
        assert_eq!(stats.max_depth, 2);
        assert!(stats.is_complete());
    }
}
