//! Resource node types.

use std::fmt;
use std::sync::Arc;

use compact_str::{CompactString, format_compact};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Children of a branch keyed by name, in the order the remote listing
/// returned them.
pub type ChildMap = IndexMap<CompactString, Arc<ResourceNode>>;

/// Globally unique handle of a node: ancestor names joined with `/`,
/// starting at the root's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(CompactString);

impl NodePath {
    /// Create a path from its string form.
    pub fn new(path: impl Into<CompactString>) -> Self {
        Self(path.into())
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the child called `name`.
    pub fn join(&self, name: &str) -> Self {
        Self(format_compact!("{}/{}", self.0, name))
    }

    /// Check whether `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        other
            .0
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Check whether `other` is this path or lies below it.
    pub fn contains(&self, other: &NodePath) -> bool {
        self == other || self.is_ancestor_of(other)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for NodePath {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

impl AsRef<str> for NodePath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Everything needed to query a branch for its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Path of the branch whose children are requested.
    pub path: NodePath,
    /// Address to send the listing request to.
    pub address: CompactString,
    /// Parent identifier that direct children declare.
    pub remote_parent_id: CompactString,
}

impl Container {
    pub fn new(
        path: NodePath,
        address: impl Into<CompactString>,
        remote_parent_id: impl Into<CompactString>,
    ) -> Self {
        Self {
            path,
            address: address.into(),
            remote_parent_id: remote_parent_id.into(),
        }
    }
}

/// Leaf or branch, with the attributes only that kind carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Terminal node with an opaque payload.
    Leaf { content: serde_json::Value },
    /// Expandable container.
    Branch {
        /// Address to query for this node's own children.
        address: CompactString,
        /// Identifier the children of this node declare as their parent.
        remote_parent_id: CompactString,
    },
}

impl NodeKind {
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Leaf { .. })
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, NodeKind::Branch { .. })
    }
}

/// Loading state of a path in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// A single resource in the tree.
///
/// Nodes are immutable once created except for `children`, which the
/// store replaces exactly once by path-copying the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Resource name, unique among siblings.
    pub name: CompactString,

    /// Full path from the root.
    pub path: NodePath,

    /// Node type and associated attributes.
    #[serde(flatten)]
    pub kind: NodeKind,

    /// Children (branches only). `None` until fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Arc<ChildMap>>,
}

impl ResourceNode {
    /// Create a leaf node.
    pub fn leaf(name: impl Into<CompactString>, path: NodePath, content: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            path,
            kind: NodeKind::Leaf { content },
            children: None,
        }
    }

    /// Create an unloaded branch node.
    pub fn branch(
        name: impl Into<CompactString>,
        path: NodePath,
        address: impl Into<CompactString>,
        remote_parent_id: impl Into<CompactString>,
    ) -> Self {
        Self {
            name: name.into(),
            path,
            kind: NodeKind::Branch {
                address: address.into(),
                remote_parent_id: remote_parent_id.into(),
            },
            children: None,
        }
    }

    /// Create the root branch from the base container descriptor.
    pub fn root(
        name: impl Into<CompactString>,
        address: impl Into<CompactString>,
        remote_id: impl Into<CompactString>,
    ) -> Self {
        let name = name.into();
        let path = NodePath::new(name.clone());
        Self::branch(name, path, address, remote_id)
    }

    /// Return a copy of this node holding `children`.
    ///
    /// Leaves are returned unchanged.
    pub fn with_children(&self, children: Arc<ChildMap>) -> Self {
        let mut node = self.clone();
        if node.is_branch() {
            node.children = Some(children);
        }
        node
    }

    pub fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }

    pub fn is_branch(&self) -> bool {
        self.kind.is_branch()
    }

    /// Whether nothing remains to fetch for this node itself.
    pub fn is_loaded(&self) -> bool {
        self.is_leaf() || self.children.is_some()
    }

    /// Listing request target for a branch.
    pub fn container(&self) -> Option<Container> {
        match &self.kind {
            NodeKind::Branch {
                address,
                remote_parent_id,
            } => Some(Container::new(
                self.path.clone(),
                address.clone(),
                remote_parent_id.clone(),
            )),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Content of a leaf.
    pub fn content(&self) -> Option<&serde_json::Value> {
        match &self.kind {
            NodeKind::Leaf { content } => Some(content),
            NodeKind::Branch { .. } => None,
        }
    }

    /// Leaf content as shown to a user: strings verbatim, anything else as
    /// compact JSON.
    pub fn display_content(&self) -> Option<String> {
        self.content().map(|content| match content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Look up a direct child by name.
    pub fn child(&self, name: &str) -> Option<&Arc<ResourceNode>> {
        self.children.as_ref().and_then(|children| children.get(name))
    }

    /// Number of loaded direct children.
    pub fn child_count(&self) -> usize {
        self.children.as_ref().map_or(0, |children| children.len())
    }

    /// Iterate over loaded direct children.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = &Arc<ResourceNode>> {
        self.children.iter().flat_map(|children| children.values())
    }
}
