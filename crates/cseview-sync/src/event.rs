//! Events exchanged with the display surface.

use cseview_core::{FetchError, NodePath};
use strum::IntoStaticStr;

use crate::lazy::ExpandOutcome;
use crate::progress::{SyncComplete, SyncProgress};

/// Notification sent from the engine to the display surface.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
pub enum SyncEvent {
    /// A background batch finished.
    Progress(SyncProgress),
    /// The background loader merged the subtree at `path`.
    SubtreeLoaded { path: NodePath },
    /// A branch could not be fetched; it stays unloaded.
    SubtreeFailed { path: NodePath, error: FetchError },
    /// The progress indicator can be hidden.
    ProgressFinished,
    /// The background loader stopped.
    Complete(SyncComplete),
    /// An on-demand expansion finished; the branch can be shown open.
    Expanded { path: NodePath, children: usize },
    /// An on-demand expansion failed; interacting again retries it.
    ExpandFailed { path: NodePath, error: FetchError },
}

impl SyncEvent {
    /// Short name of the event kind, for logs.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

/// Interaction raised by the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The user opened the branch at this path.
    ExpandBranch(NodePath),
    /// The user selected the leaf at this path.
    SelectLeaf(NodePath),
}

/// What the engine answers to a [`SurfaceEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceResponse {
    /// Result of an expansion request.
    Expansion(ExpandOutcome),
    /// Content of the selected leaf, ready to display.
    Content(String),
    /// The selected node is a branch.
    NotALeaf(NodePath),
    /// Nothing lives at the selected path.
    NotFound(NodePath),
}
