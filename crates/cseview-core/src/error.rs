//! Error types for fetching and merging.

use std::fmt::Display;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::NodePath;

/// Errors that can occur while retrieving a container listing.
///
/// Messages are captured as strings so the error can be cloned into
/// progress events and shown next to the node it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("Request to {address} failed: {message}")]
    Transport {
        address: CompactString,
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("Request to {address} returned HTTP {status}")]
    Status { address: CompactString, status: u16 },

    /// The response body could not be decoded.
    #[error("Could not decode response from {address}: {message}")]
    Decode {
        address: CompactString,
        message: String,
    },

    /// The base address did not describe a base container.
    #[error("No base container descriptor at {address}")]
    MissingBase { address: CompactString },

    /// The work was cancelled before the request was issued.
    #[error("Operation cancelled")]
    Cancelled,
}

impl FetchError {
    /// Create a transport error with address context.
    pub fn transport(address: impl Into<CompactString>, err: impl Display) -> Self {
        Self::Transport {
            address: address.into(),
            message: err.to_string(),
        }
    }

    /// Create a decode error with address context.
    pub fn decode(address: impl Into<CompactString>, err: impl Display) -> Self {
        Self::Decode {
            address: address.into(),
            message: err.to_string(),
        }
    }

    /// Check if this error only reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors returned by [`TreeStore::merge_subtree`](crate::TreeStore::merge_subtree).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("No node at path {path}")]
    NotFound { path: NodePath },

    #[error("Node at {path} is a leaf and cannot hold children")]
    NotABranch { path: NodePath },

    #[error("Children of {path} are already loaded")]
    AlreadyLoaded { path: NodePath },
}
