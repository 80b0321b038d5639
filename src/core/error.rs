// Error taxonomy for the resolver/reconciler/executor core.
//
// Every core function returns `Result<T, CoreError>`. The CLI boundary
// (`commands/*`) converts a top-level `CoreError` into an exit code and a
// colored message; it never needs to match on these variants itself.

use crate::core::graph::{CyclePath, NodeId};
use std::path::PathBuf;

/// Errors produced while planning or executing a `devrig apply`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A resource's own `validate()` rejected it, before any graph was built.
    #[error("invalid configuration for {node}: {reason}")]
    Config { node: NodeId, reason: String },

    /// The resolver found a cycle among the declared resources.
    #[error("dependency cycle detected: {path}")]
    Cycle { path: CyclePath },

    /// A `Runtime` removal was requested while a surviving `Tool` still depends on it.
    #[error("cannot remove {runtime}: still required by tool '{dependent}'")]
    RemovalBlocked { runtime: NodeId, dependent: String },

    /// `ToolSet` expansion produced a name that collides with another resource.
    #[error("name conflict: '{name}' is declared more than once ({first} and {second})")]
    NameConflict {
        name: String,
        first: NodeId,
        second: NodeId,
    },

    /// The state lock file is already held by another process.
    #[error("state file {0} is locked by another devrig process")]
    LockConflict(PathBuf),

    /// Reading or writing the persisted state document failed.
    #[error("state I/O error at {path}: {source}")]
    StateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to (de)serialize the persisted state document.
    #[error("state serialization error: {0}")]
    StateFormat(#[from] serde_json::Error),

    /// An installer backend failed to install or remove a resource.
    #[error("{action} failed for {node} '{name}': {source}")]
    Installer {
        action: &'static str,
        node: NodeId,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Cooperative cancellation: a sibling task in the same layer failed, or a
    /// deadline passed, and this task observed it at a suspension point.
    #[error("cancelled")]
    Cancelled,

    /// An internal engine precondition failed (e.g. the worker pool for the
    /// configured parallelism could not be built).
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
