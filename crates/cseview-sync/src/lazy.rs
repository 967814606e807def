//! On-demand expansion of branches the user opens.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use cseview_core::{ExpansionMode, FetchError, MergeError, NodePath, TreeStore};
use cseview_fetch::{DepthFirstExpander, SubtreeFailure};

use crate::event::SyncEvent;

/// Result of a single [`LazyExpander::expand`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpandOutcome {
    /// Children were fetched and merged.
    Expanded {
        children: usize,
        failures: Vec<SubtreeFailure>,
    },
    /// The branch already has its children.
    AlreadyLoaded,
    /// Another expansion of the same branch is in flight.
    AlreadyLoading,
    /// The path names a leaf.
    NotABranch,
    /// No node lives at the path.
    NotFound,
    /// The fetch failed; the branch stays unloaded.
    Failed(FetchError),
    /// The store refused the merge.
    Rejected(MergeError),
}

impl ExpandOutcome {
    /// Whether the branch is loaded after this call.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Expanded { .. } | Self::AlreadyLoaded)
    }
}

/// Expands branches on request, at most once per path at a time.
#[derive(Debug, Clone)]
pub struct LazyExpander {
    store: Arc<TreeStore>,
    expander: DepthFirstExpander,
    mode: ExpansionMode,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<SyncEvent>>,
}

impl LazyExpander {
    pub fn new(store: Arc<TreeStore>, expander: DepthFirstExpander, mode: ExpansionMode) -> Self {
        Self {
            store,
            expander,
            mode,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Abort in-flight expansions when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report `Expanded` / `ExpandFailed` on `events`.
    ///
    /// Delivery is best effort: when `events` is full the event is dropped
    /// and the expansion still completes.
    pub fn with_events(mut self, events: mpsc::Sender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Fetch and merge the children of the branch at `path`.
    ///
    /// Repeated calls while a fetch is pending, or after the branch is
    /// loaded, do nothing.
    pub async fn expand(&self, path: &NodePath) -> ExpandOutcome {
        let Some(node) = self.store.lookup(path) else {
            tracing::debug!(path = %path, "expand requested for unknown path");
            return ExpandOutcome::NotFound;
        };
        let Some(container) = node.container() else {
            return ExpandOutcome::NotABranch;
        };
        if node.children.is_some() {
            return ExpandOutcome::AlreadyLoaded;
        }
        let Some(guard) = self.store.begin_loading(path) else {
            return ExpandOutcome::AlreadyLoading;
        };
        // The background loader may have merged between lookup and marking.
        if self.store.lookup(path).is_some_and(|node| node.is_loaded()) {
            return ExpandOutcome::AlreadyLoaded;
        }

        let fetched = match self.mode {
            ExpansionMode::Full => self
                .expander
                .expand_subtree(&container, &self.cancel)
                .await
                .map(|subtree| (subtree.children, subtree.failures)),
            ExpansionMode::Shallow => self
                .expander
                .expand_one_level(&container, &self.cancel)
                .await
                .map(|children| (children, Vec::new())),
        };

        let outcome = match fetched {
            Ok((children, failures)) => {
                let count = children.len();
                match self.store.merge_subtree(path, children) {
                    Ok(()) | Err(MergeError::AlreadyLoaded { .. }) => ExpandOutcome::Expanded {
                        children: count,
                        failures,
                    },
                    Err(err) => {
                        tracing::warn!(path = %path, error = %err, "could not merge expansion");
                        ExpandOutcome::Rejected(err)
                    }
                }
            }
            Err(error) => {
                tracing::debug!(path = %path, error = %error, "expansion failed");
                ExpandOutcome::Failed(error)
            }
        };
        drop(guard);

        self.notify(path, &outcome);
        outcome
    }

    fn notify(&self, path: &NodePath, outcome: &ExpandOutcome) {
        let Some(events) = &self.events else {
            return;
        };
        let event = match outcome {
            ExpandOutcome::Expanded { children, .. } => SyncEvent::Expanded {
                path: path.clone(),
                children: *children,
            },
            ExpandOutcome::Failed(error) => SyncEvent::ExpandFailed {
                path: path.clone(),
                error: error.clone(),
            },
            _ => return,
        };
        match events.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(path = %path, event = event.kind(), "surface channel full, dropping event");
            }
        }
    }
}
