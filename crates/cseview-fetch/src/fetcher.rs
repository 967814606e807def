//! One-hop retrieval and classification of a container's children.

use std::sync::Arc;

use cseview_core::{ChildMap, Container, FetchError, ResourceNode};

use crate::client::ResourceClient;
use crate::wire::{Listing, ListingEntry};

/// Fetches the direct children of a container.
#[derive(Clone)]
pub struct NodeFetcher {
    client: Arc<dyn ResourceClient>,
}

impl NodeFetcher {
    /// Create a fetcher on top of `client`.
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    /// Retrieve the listing for `container` and keep its direct children.
    pub async fn fetch_children(&self, container: &Container) -> Result<ChildMap, FetchError> {
        let listing = self
            .client
            .retrieve_listing(&container.address)
            .await
            .inspect_err(|e| {
                tracing::debug!(path = %container.path, error = %e, "listing request failed");
            })?;

        let children = classify_listing(&listing, container);
        tracing::debug!(
            path = %container.path,
            children = children.len(),
            "fetched children"
        );
        Ok(children)
    }
}

impl std::fmt::Debug for NodeFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeFetcher").finish_non_exhaustive()
    }
}

/// Turn a flat listing into the direct children of `container`.
///
/// Entries whose parent id differs from the container's are deeper
/// descendants and are dropped. Entries with content become leaves,
/// everything else an unloaded branch.
pub fn classify_listing(listing: &Listing, container: &Container) -> ChildMap {
    let mut children = ChildMap::new();

    for entry in listing.entries() {
        if entry.pi.as_deref() != Some(container.remote_parent_id.as_str()) {
            continue;
        }
        let Some(name) = entry.rn.as_ref() else {
            tracing::debug!(path = %container.path, "skipping entry without a name");
            continue;
        };
        if children.contains_key(name) {
            tracing::warn!(
                path = %container.path,
                name = %name,
                "duplicate resource name in listing, keeping the first"
            );
            continue;
        }

        let node = classify_entry(entry, name, container);
        children.insert(name.clone(), Arc::new(node));
    }

    children
}

fn classify_entry(entry: &ListingEntry, name: &str, container: &Container) -> ResourceNode {
    let path = container.path.join(name);
    match &entry.con {
        Some(content) => ResourceNode::leaf(name, path, content.clone()),
        None => ResourceNode::branch(
            name,
            path,
            format!("{}/{}", container.address, name),
            entry.ri.clone().unwrap_or_default(),
        ),
    }
}
