//! Depth-first expansion of whole subtrees.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;

use cseview_core::{ChildMap, Container, FetchError, NodePath};

use crate::fetcher::NodeFetcher;

/// Default cap on listing requests in flight within one expansion.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// A branch below the expansion root whose listing could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeFailure {
    pub path: NodePath,
    pub error: FetchError,
}

/// Result of a full expansion.
#[derive(Debug, Clone, Default)]
pub struct Subtree {
    /// Direct children of the expanded container, populated to the leaves.
    pub children: ChildMap,
    /// Nested branches left unloaded because their fetch failed.
    pub failures: Vec<SubtreeFailure>,
    /// Number of listing requests issued.
    pub requests: usize,
}

impl Subtree {
    /// Check if every branch below the root was resolved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resolves every descendant of a container.
///
/// Works from an explicit stack of containers still to fetch, so deep
/// hierarchies never grow the call stack. Up to `max_in_flight` listings are
/// requested concurrently; siblings therefore resolve in no particular
/// order, but a subtree is only returned once all of it is known.
#[derive(Debug, Clone)]
pub struct DepthFirstExpander {
    fetcher: NodeFetcher,
    max_in_flight: usize,
}

impl DepthFirstExpander {
    pub fn new(fetcher: NodeFetcher) -> Self {
        Self {
            fetcher,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Set the concurrent request cap (at least one).
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Fetch only the direct children of `container`.
    pub async fn expand_one_level(
        &self,
        container: &Container,
        cancel: &CancellationToken,
    ) -> Result<ChildMap, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.fetcher.fetch_children(container) => result,
        }
    }

    /// Fetch the whole subtree below `container`.
    ///
    /// Fails only if the container's own listing fails or `cancel` fires.
    /// Deeper failures leave the affected branch unloaded and are listed in
    /// [`Subtree::failures`].
    pub async fn expand_subtree(
        &self,
        container: &Container,
        cancel: &CancellationToken,
    ) -> Result<Subtree, FetchError> {
        let top = self.expand_one_level(container, cancel).await?;

        let mut pending: Vec<Container> = Vec::new();
        push_branches(&mut pending, &top);

        // Listings in the order they arrived; a parent always precedes its
        // children.
        let mut listings: Vec<(NodePath, ChildMap)> = vec![(container.path.clone(), top)];
        let mut failures = Vec::new();
        let mut requests = 1;
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.max_in_flight {
                if cancel.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }
                let Some(next) = pending.pop() else {
                    break;
                };
                let fetcher = self.fetcher.clone();
                requests += 1;
                in_flight.push(async move {
                    let result = fetcher.fetch_children(&next).await;
                    (next, result)
                });
            }

            let completed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                completed = in_flight.next() => completed,
            };
            let Some((done, result)) = completed else {
                break;
            };

            match result {
                Ok(children) => {
                    push_branches(&mut pending, &children);
                    listings.push((done.path, children));
                }
                Err(error) => {
                    tracing::warn!(path = %done.path, error = %error, "leaving branch unloaded");
                    failures.push(SubtreeFailure {
                        path: done.path,
                        error,
                    });
                }
            }
        }

        let children = assemble(&container.path, listings);
        tracing::debug!(
            path = %container.path,
            requests,
            failures = failures.len(),
            "expanded subtree"
        );
        Ok(Subtree {
            children,
            failures,
            requests,
        })
    }
}

/// Queue the branches of `children` so the first one is popped first.
fn push_branches(pending: &mut Vec<Container>, children: &ChildMap) {
    pending.extend(
        children
            .values()
            .rev()
            .filter_map(|child| child.container()),
    );
}

/// Attach every fetched listing to its branch, deepest first.
fn assemble(root: &NodePath, listings: Vec<(NodePath, ChildMap)>) -> ChildMap {
    let mut built: HashMap<NodePath, ChildMap> = HashMap::with_capacity(listings.len());

    for (path, mut children) in listings.into_iter().rev() {
        for child in children.values_mut() {
            if let Some(grandchildren) = built.remove(&child.path) {
                *child = Arc::new(child.with_children(Arc::new(grandchildren)));
            }
        }
        built.insert(path, children);
    }

    built.remove(root).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;
    use crate::fixture::{FixtureClient, FixtureNode};
    use cseview_core::{NodeKind, ResourceNode};

    const BASE: &str = "http://cse/root";

    fn three_level() -> Vec<FixtureNode> {
        vec![
            FixtureNode::branch(
                "b1",
                vec![FixtureNode::leaf("l1", "one"), FixtureNode::leaf("l2", "two")],
            ),
            FixtureNode::branch(
                "b2",
                vec![FixtureNode::leaf("l3", "three"), FixtureNode::leaf("l4", "four")],
            ),
        ]
    }

    fn root_container() -> Container {
        Container::new(NodePath::new("root"), BASE, "ri-0")
    }

    fn expander(client: FixtureClient) -> (DepthFirstExpander, Arc<FixtureClient>) {
        let client = Arc::new(client);
        let expander = DepthFirstExpander::new(NodeFetcher::new(client.clone()));
        (expander, client)
    }

    fn collect_paths(children: &ChildMap, out: &mut Vec<NodePath>) {
        for child in children.values() {
            out.push(child.path.clone());
            if let Some(grandchildren) = &child.children {
                collect_paths(grandchildren, out);
            }
        }
    }

    #[tokio::test]
    async fn test_depth_first_completeness() {
        let (expander, client) = expander(FixtureClient::tree(BASE, "root", three_level()));
        let subtree = expander
            .expand_subtree(&root_container(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(subtree.is_complete());
        assert_eq!(subtree.requests, 3);
        assert_eq!(client.request_count(), 3);
        assert_eq!(subtree.children.len(), 2);

        for (branch, expected) in [("b1", ["one", "two"]), ("b2", ["three", "four"])] {
            let node = &subtree.children[branch];
            assert!(node.is_branch());
            let leaves: Vec<_> = node
                .children()
                .map(|leaf| {
                    assert!(leaf.is_leaf());
                    leaf.display_content().unwrap()
                })
                .collect();
            assert_eq!(leaves, expected);
        }
    }

    #[tokio::test]
    async fn test_leaves_are_never_requested() {
        let (expander, client) = expander(FixtureClient::tree(BASE, "root", three_level()));
        expander
            .expand_subtree(&root_container(), &CancellationToken::new())
            .await
            .unwrap();

        let requested: HashSet<_> = client.requests().into_iter().collect();
        let expected: HashSet<_> = [BASE, "http://cse/root/b1", "http://cse/root/b2"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(requested, expected);
    }

    #[tokio::test]
    async fn test_deep_chain_paths_are_unique() {
        let mut node = FixtureNode::leaf("bottom", "x");
        for depth in (0..200).rev() {
            node = FixtureNode::branch(format!("d{depth}"), vec![node, FixtureNode::leaf("side", depth)]);
        }
        let (expander, _) = expander(FixtureClient::tree(BASE, "root", vec![node]));
        let subtree = expander
            .expand_subtree(&root_container(), &CancellationToken::new())
            .await
            .unwrap();

        let mut paths = Vec::new();
        collect_paths(&subtree.children, &mut paths);
        let unique: HashSet<_> = paths.iter().collect();
        assert_eq!(paths.len(), unique.len());
        assert_eq!(paths.len(), 200 * 2 + 1);
    }

    #[tokio::test]
    async fn test_top_level_failure_is_an_error() {
        let (expander, _) = expander(FixtureClient::tree(BASE, "root", three_level()));
        let missing = Container::new(NodePath::new("root/nope"), "http://cse/root/nope", "ri-x");
        let err = expander
            .expand_subtree(&missing, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_nested_failure_leaves_branch_unloaded() {
        let client = FixtureClient::tree(BASE, "root", three_level());
        client.fail("http://cse/root/b2");
        let (expander, _) = expander(client);

        let subtree = expander
            .expand_subtree(&root_container(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(subtree.failures.len(), 1);
        assert_eq!(subtree.failures[0].path.as_str(), "root/b2");
        assert_eq!(subtree.children["b1"].child_count(), 2);
        assert!(subtree.children["b2"].children.is_none());
    }

    #[tokio::test]
    async fn test_one_level_keeps_branches_unloaded() {
        let (expander, client) = expander(FixtureClient::tree(BASE, "root", three_level()));
        let children = expander
            .expand_one_level(&root_container(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(client.request_count(), 1);
        assert!(children.values().all(|c| c.children.is_none()));
        assert!(matches!(children["b1"].kind, NodeKind::Branch { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (expander, client) = expander(FixtureClient::tree(BASE, "root", three_level()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = expander.expand_subtree(&root_container(), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_cap_limits_concurrency() {
        let branches = (0..6)
            .map(|i| FixtureNode::branch(format!("b{i}"), vec![FixtureNode::leaf("v", i)]))
            .collect();
        let client = FixtureClient::tree(BASE, "root", branches).with_delay(Duration::from_secs(1));
        let (expander, _) = expander(client);
        let expander = expander.with_max_in_flight(2);

        let start = tokio::time::Instant::now();
        let subtree = expander
            .expand_subtree(&root_container(), &CancellationToken::new())
            .await
            .unwrap();

        // One request for the root, then six in waves of two.
        assert_eq!(start.elapsed(), Duration::from_secs(4));
        assert_eq!(subtree.children.len(), 6);
        assert!(subtree.children.values().all(|c: &Arc<ResourceNode>| c.child_count() == 1));
    }
}
