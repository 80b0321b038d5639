//! The resource/graph/resolver/reconciler/cache/executor core.
//!
//! Everything under this module is independent of the CLI, the YAML config
//! front-end and the installer backends - it only knows about `Resource`s,
//! `NodeId`s and the `UserState` it persists.

pub mod cache;
pub mod error;
pub mod executor;
pub mod graph;
pub mod installer;
pub mod lock;
pub mod reconciler;
pub mod resolver;
pub mod resource;
pub mod state;

pub use error::{CoreError, CoreResult};
pub use resource::{Kind, Ref, Resource};
