//! Container listing retrieval and subtree expansion for cseview.
//!
//! # Overview
//!
//! `cseview-fetch` talks to the management platform and turns its flat
//! descendant listings into resource nodes:
//!
//! - **[`ResourceClient`]** abstracts the remote source; [`HttpResourceClient`]
//!   is the `reqwest` implementation
//! - **[`NodeFetcher`]** keeps the direct children of one container and
//!   classifies them as leaves or branches
//! - **[`DepthFirstExpander`]** resolves an entire subtree with a bounded
//!   number of concurrent requests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cseview_core::{Container, NodePath, SyncConfig};
//! use cseview_fetch::{DepthFirstExpander, HttpResourceClient, NodeFetcher};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), cseview_core::FetchError> {
//! let config = SyncConfig::new("http://localhost:8080/cse-in");
//! let client = Arc::new(HttpResourceClient::new(&config)?);
//! let expander = DepthFirstExpander::new(NodeFetcher::new(client));
//!
//! let container = Container::new(NodePath::new("cse-in"), config.base(), "id-in");
//! let subtree = expander
//!     .expand_subtree(&container, &CancellationToken::new())
//!     .await?;
//! println!("{} top-level children", subtree.children.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod expander;
mod fetcher;
mod wire;

#[cfg(any(test, feature = "fixture"))]
pub mod fixture;

pub use client::{DISCOVERY_QUERY, HttpResourceClient, ResourceClient, discovery_url};
pub use expander::{DEFAULT_MAX_IN_FLIGHT, DepthFirstExpander, Subtree, SubtreeFailure};
pub use fetcher::{NodeFetcher, classify_listing};
pub use wire::{BaseDescriptor, BaseResponse, GroupItem, Listing, ListingEntry, ResultGroup};

// Re-export core types for convenience
pub use cseview_core::{ChildMap, Container, FetchError, NodeKind, NodePath, ResourceNode};
