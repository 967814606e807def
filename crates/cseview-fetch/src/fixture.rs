//! In-memory [`ResourceClient`] serving a canned hierarchy.
//!
//! Listings are generated the way a full-descendant discovery answers:
//! every descendant of the requested container, flat, grouped by resource
//! type, with parent ids pointing at the real parent.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use compact_str::{CompactString, format_compact};

use cseview_core::FetchError;

use crate::client::ResourceClient;
use crate::wire::{BaseDescriptor, Listing, ListingEntry};

/// A node of a fixture hierarchy.
#[derive(Debug, Clone)]
pub enum FixtureNode {
    Leaf {
        name: CompactString,
        content: serde_json::Value,
    },
    Branch {
        name: CompactString,
        children: Vec<FixtureNode>,
    },
}

impl FixtureNode {
    pub fn leaf(name: impl Into<CompactString>, content: impl Into<serde_json::Value>) -> Self {
        Self::Leaf {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn branch(name: impl Into<CompactString>, children: Vec<FixtureNode>) -> Self {
        Self::Branch {
            name: name.into(),
            children,
        }
    }

    fn name(&self) -> &CompactString {
        match self {
            Self::Leaf { name, .. } | Self::Branch { name, .. } => name,
        }
    }
}

/// Canned [`ResourceClient`] that records every request it serves.
#[derive(Debug, Default)]
pub struct FixtureClient {
    base: HashMap<String, BaseDescriptor>,
    listings: HashMap<String, Listing>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<String>>,
}

impl FixtureClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `children` below a base container called `root_name` at
    /// `base_address`. The base container's id is `ri-0`.
    pub fn tree(base_address: &str, root_name: &str, children: Vec<FixtureNode>) -> Self {
        let mut client = Self::new();
        client.base.insert(
            base_address.to_string(),
            BaseDescriptor {
                rn: root_name.into(),
                ri: "ri-0".into(),
            },
        );

        let mut next_id = 1usize;
        client.add_container(base_address, "ri-0", &children, &mut next_id);
        client
    }

    /// Answer requests after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every request to `address` fail with a transport error.
    pub fn fail(&self, address: &str) {
        self.lock_failing().insert(address.to_string());
    }

    /// Let requests to `address` succeed again.
    pub fn recover(&self, address: &str) {
        self.lock_failing().remove(address);
    }

    /// Addresses requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of requests served so far.
    pub fn request_count(&self) -> usize {
        self.requests().len()
    }

    /// Number of requests made to `address`.
    pub fn requests_to(&self, address: &str) -> usize {
        self.requests().iter().filter(|a| *a == address).count()
    }

    fn lock_failing(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.failing
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register the listing for the container at `address` and recurse
    /// into its branches. Returns the flat descendant entries.
    fn add_container(
        &mut self,
        address: &str,
        id: &str,
        children: &[FixtureNode],
        next_id: &mut usize,
    ) -> Vec<(&'static str, ListingEntry)> {
        let mut descendants = Vec::new();

        for child in children {
            let child_id = format_compact!("ri-{next_id}");
            *next_id += 1;

            match child {
                FixtureNode::Leaf { name, content } => descendants.push((
                    "m2m:cin",
                    ListingEntry {
                        rn: Some(name.clone()),
                        ri: Some(child_id),
                        pi: Some(id.into()),
                        con: Some(content.clone()),
                    },
                )),
                FixtureNode::Branch { children, .. } => {
                    descendants.push((
                        "m2m:cnt",
                        ListingEntry {
                            rn: Some(child.name().clone()),
                            ri: Some(child_id.clone()),
                            pi: Some(id.into()),
                            con: None,
                        },
                    ));
                    let child_address = format!("{address}/{}", child.name());
                    descendants.extend(self.add_container(&child_address, &child_id, children, next_id));
                }
            }
        }

        let mut listing = Listing::default();
        for (tag, entry) in &descendants {
            listing.push(tag, entry.clone());
        }
        self.listings.insert(address.to_string(), listing);
        descendants
    }

    async fn serve(&self, address: &str) -> Result<(), FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(address.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.lock_failing().contains(address) {
            return Err(FetchError::transport(address, "connection reset"));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceClient for FixtureClient {
    async fn retrieve_base(&self, address: &str) -> Result<BaseDescriptor, FetchError> {
        self.serve(address).await?;
        self.base
            .get(address)
            .cloned()
            .ok_or_else(|| FetchError::MissingBase {
                address: address.into(),
            })
    }

    async fn retrieve_listing(&self, address: &str) -> Result<Listing, FetchError> {
        self.serve(address).await?;
        self.listings
            .get(address)
            .cloned()
            .ok_or(FetchError::Status {
                address: address.into(),
                status: 404,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_listing_is_flat() {
        let client = FixtureClient::tree(
            "http://cse/base",
            "base",
            vec![FixtureNode::branch(
                "a",
                vec![FixtureNode::branch("b", vec![FixtureNode::leaf("c", "1")])],
            )],
        );

        let listing = client.retrieve_listing("http://cse/base").await.unwrap();
        let names: Vec<_> = listing
            .entries()
            .filter_map(|e| e.rn.as_deref())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(listing.groups.len(), 2);

        let nested = client.retrieve_listing("http://cse/base/a/b").await.unwrap();
        assert_eq!(nested.entries().count(), 1);
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_fixture_failure_toggle() {
        let client = FixtureClient::tree("http://cse/base", "base", vec![]);
        client.fail("http://cse/base");
        assert!(client.retrieve_listing("http://cse/base").await.is_err());
        client.recover("http://cse/base");
        assert!(client.retrieve_listing("http://cse/base").await.is_ok());
    }
}
