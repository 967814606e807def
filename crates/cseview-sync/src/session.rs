//! A browsing session: the root, the store and the loaders around it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cseview_core::{FetchError, NodePath, ResourceNode, SyncConfig, TreeStore};
use cseview_fetch::{DepthFirstExpander, NodeFetcher, ResourceClient};

use crate::error::{ResolveError, ResolveResult};
use crate::event::{SurfaceEvent, SurfaceResponse, SyncEvent};
use crate::lazy::{ExpandOutcome, LazyExpander};
use crate::scheduler::{ProgressiveBatchScheduler, ProgressiveLoad, start_progressive_load};

/// Everything needed to browse one base container.
#[derive(Debug)]
pub struct Session {
    config: SyncConfig,
    store: Arc<TreeStore>,
    expander: DepthFirstExpander,
    lazy: LazyExpander,
    cancel: CancellationToken,
}

impl Session {
    /// Fetch the base container and its first level, and seed the store.
    ///
    /// Fails if the base container cannot be retrieved or listed.
    pub async fn bootstrap(
        client: Arc<dyn ResourceClient>,
        config: SyncConfig,
    ) -> Result<Self, FetchError> {
        let base = config.base().to_string();
        let descriptor = client.retrieve_base(&base).await?;
        tracing::info!(name = %descriptor.rn, id = %descriptor.ri, "connected to base container");

        let expander = DepthFirstExpander::new(NodeFetcher::new(client))
            .with_max_in_flight(config.max_in_flight);
        let cancel = CancellationToken::new();

        let root = ResourceNode::root(descriptor.rn, base, descriptor.ri);
        let first_level = match root.container() {
            Some(container) => expander.expand_one_level(&container, &cancel).await?,
            None => Default::default(),
        };
        tracing::debug!(children = first_level.len(), "loaded first level");

        let store = Arc::new(TreeStore::new(root.with_children(Arc::new(first_level))));
        let lazy = LazyExpander::new(store.clone(), expander.clone(), config.expansion_mode)
            .with_cancellation(cancel.child_token());

        Ok(Self {
            config,
            store,
            expander,
            lazy,
            cancel,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TreeStore> {
        &self.store
    }

    /// Report on-demand expansions on `events`.
    pub fn attach_surface(&mut self, events: mpsc::Sender<SyncEvent>) {
        self.lazy = self.lazy.clone().with_events(events);
    }

    /// Populate every first-level branch in the background.
    pub fn start_background(&self) -> ProgressiveLoad {
        let initial: Vec<_> = self.store.root().children().cloned().collect();
        let scheduler =
            ProgressiveBatchScheduler::new(self.store.clone(), self.expander.clone(), &self.config);
        start_progressive_load(scheduler, initial, self.cancel.child_token())
    }

    /// Expand the branch at `path` on demand.
    pub async fn expand(&self, path: &NodePath) -> ExpandOutcome {
        self.lazy.expand(path).await
    }

    /// Answer an interaction from the display surface.
    pub async fn handle(&self, event: SurfaceEvent) -> SurfaceResponse {
        match event {
            SurfaceEvent::ExpandBranch(path) => SurfaceResponse::Expansion(self.expand(&path).await),
            SurfaceEvent::SelectLeaf(path) => match self.store.lookup(&path) {
                None => SurfaceResponse::NotFound(path),
                Some(node) => match node.display_content() {
                    Some(content) => SurfaceResponse::Content(content),
                    None => SurfaceResponse::NotALeaf(path),
                },
            },
        }
    }

    /// Find the node at `path`, loading every branch on the way.
    ///
    /// A branch at `path` itself is loaded too, so its children can be
    /// listed.
    pub async fn resolve(&self, path: &NodePath) -> ResolveResult<Arc<ResourceNode>> {
        let root = self.store.root();
        let rest = if path == &root.path {
            ""
        } else {
            path.as_str()
                .strip_prefix(root.path.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .ok_or_else(|| ResolveError::OutsideTree { path: path.clone() })?
        };

        let mut current = root.path.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            self.ensure_loaded(&current).await?;
            current = current.join(segment);
        }

        let node = self
            .store
            .lookup(&current)
            .ok_or_else(|| ResolveError::NotFound {
                path: current.clone(),
            })?;
        if node.is_branch() && !node.is_loaded() {
            self.ensure_loaded(&current).await?;
            return self
                .store
                .lookup(&current)
                .ok_or(ResolveError::NotFound { path: current });
        }
        Ok(node)
    }

    async fn ensure_loaded(&self, path: &NodePath) -> ResolveResult<()> {
        match self.lazy.expand(path).await {
            ExpandOutcome::Expanded { .. } | ExpandOutcome::AlreadyLoaded => Ok(()),
            ExpandOutcome::AlreadyLoading => Err(ResolveError::Busy { path: path.clone() }),
            ExpandOutcome::NotABranch => Err(ResolveError::NotABranch { path: path.clone() }),
            ExpandOutcome::NotFound => Err(ResolveError::NotFound { path: path.clone() }),
            ExpandOutcome::Failed(source) => Err(ResolveError::Fetch {
                path: path.clone(),
                source,
            }),
            ExpandOutcome::Rejected(err) => Err(err.into()),
        }
    }

    /// Stop every loader started from this session.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
