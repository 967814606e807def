//! Progressive and on-demand population of the cseview tree.
//!
//! A [`Session`] seeds the [`TreeStore`](cseview_core::TreeStore) with the
//! base container and its first level. From there two loaders fill it in:
//!
//! - **[`ProgressiveBatchScheduler`]** walks the first level in fixed-size
//!   batches, pausing between them, and reports [`SyncEvent::Progress`]
//! - **[`LazyExpander`]** loads a branch immediately when the user opens it
//!
//! Both mark a branch as loading before fetching, so neither fetches a
//! subtree the other is already working on.

mod error;
mod event;
mod lazy;
mod progress;
mod scheduler;
mod session;

pub use error::{ResolveError, ResolveResult};
pub use event::{SurfaceEvent, SurfaceResponse, SyncEvent};
pub use lazy::{ExpandOutcome, LazyExpander};
pub use progress::{SyncComplete, SyncProgress};
pub use scheduler::{ProgressiveBatchScheduler, ProgressiveLoad, start_progressive_load};
pub use session::Session;
