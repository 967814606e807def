//! Core types and the tree store for cseview.
//!
//! This crate provides the fundamental data structures shared by the
//! fetch and sync crates: resource nodes, node paths, the path-addressed
//! tree store, session configuration and error types.

mod config;
mod error;
mod node;
mod tree;

pub use config::{ExpansionMode, SyncConfig, SyncConfigBuilder, SyncConfigBuilderError};
pub use error::{FetchError, MergeError};
pub use node::{ChildMap, Container, LoadState, NodeKind, NodePath, ResourceNode};
pub use tree::{LoadingGuard, TreeStats, TreeStore};
