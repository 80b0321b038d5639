//! The installer backend contract the engine invokes (spec.md §6.1).
//!
//! The core never inspects how a backend performs its work; it hands over a
//! resource and a name and gets back a state, or a state and a name and gets
//! back nothing. Concrete backends live under `crate::installers`.

use crate::core::reconciler::ActionType;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared cooperative-cancellation flag, set by the first task in a layer
/// to fail (spec.md §5 "Cancellation and timeouts"). Cloning shares the same
/// underlying flag.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Conveys which action a backend is performing, so it may pick a strategy
/// (e.g. clean install vs in-place upgrade) without the core inspecting the
/// installation method (spec.md §6.1).
pub struct ActionContext {
    pub action_type: ActionType,
    pub cancel: CancellationToken,
}

impl ActionContext {
    pub fn new(action_type: ActionType, cancel: CancellationToken) -> Self {
        Self { action_type, cancel }
    }
}

/// Generic over `(R: resource spec, S: persisted state)`. Four concrete
/// parameterisations exist, one per installable resource kind: `Runtime`,
/// `Installer`, `InstallerRepository`, `Tool`. `ToolSet` has no backend of
/// its own (it is expanded into `Tool`s before the executor ever sees it).
pub trait Installer<R, S> {
    fn install(&self, ctx: &ActionContext, resource: &R, name: &str) -> anyhow::Result<S>;
    fn remove(&self, ctx: &ActionContext, state: &S, name: &str) -> anyhow::Result<()>;
}
