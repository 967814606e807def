//! Error types for cseview-sync.

use cseview_core::{FetchError, MergeError, NodePath};
use thiserror::Error;

/// Errors that can occur while resolving a path on demand.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("No node at {path}")]
    NotFound { path: NodePath },

    #[error("{path} does not belong to this tree")]
    OutsideTree { path: NodePath },

    #[error("{path} is a leaf and has no children")]
    NotABranch { path: NodePath },

    #[error("{path} is being loaded by another task")]
    Busy { path: NodePath },

    #[error("Failed to load {path}: {source}")]
    Fetch {
        path: NodePath,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Result type alias for resolve operations.
pub type ResolveResult<T> = Result<T, ResolveError>;
