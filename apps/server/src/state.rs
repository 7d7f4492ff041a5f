//! Shared handler state.

use std::sync::Arc;

use seoforge_core::pipeline::PipelineDeps;
use seoforge_core::workspace::{WorkspaceLocks, WorkspaceRoot};
use seoforge_ledger::Ledger;

pub(crate) struct AppState {
    pub root: WorkspaceRoot,
    pub locks: WorkspaceLocks,
    pub ledger: Arc<Ledger>,
    pub deps: PipelineDeps,
    pub search_augmented: bool,
}

impl AppState {
    pub(crate) fn new(
        root: WorkspaceRoot,
        ledger: Arc<Ledger>,
        deps: PipelineDeps,
        search_augmented: bool,
    ) -> Self {
        Self {
            root,
            locks: WorkspaceLocks::new(),
            ledger,
            deps,
            search_augmented,
        }
    }
}
