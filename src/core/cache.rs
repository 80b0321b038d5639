//! Single in-memory `UserState` cache behind one mutex, with a dirty flag and
//! per-kind `StateStore` views (spec.md §4.4).

use crate::core::error::{CoreError, CoreResult};
use crate::core::state::{InstallerRepositoryState, InstallerState, RuntimeState, ToolState, UserState};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Owns the aggregate `UserState` and the disk path it is flushed to.
/// Per-kind stores hold only a `&StateCache` back-reference (spec.md §3,
/// "ownership").
pub struct StateCache {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    state: UserState,
    dirty: bool,
}

impl StateCache {
    /// Reads `path` if it exists, otherwise starts from an empty `UserState`
    /// (spec.md §4.3 step 3, §6.2 "missing top-level keys deserialise as
    /// empty maps").
    pub fn load(path: &Path) -> CoreResult<Self> {
        let state = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| CoreError::StateIo {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&contents)?
        } else {
            UserState::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner { state, dirty: false }),
        })
    }

    /// Writes the in-memory state to disk iff the dirty flag is set, via a
    /// temp-file-then-rename so a crash never leaves a half-written document
    /// (spec.md §4.4).
    pub fn flush(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock().expect("state cache mutex poisoned");
        if !inner.dirty {
            return Ok(());
        }

        let serialized = serde_json::to_string_pretty(&inner.state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized).map_err(|source| CoreError::StateIo {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| CoreError::StateIo {
            path: self.path.clone(),
            source,
        })?;
        inner.dirty = false;
        Ok(())
    }

    /// A consistent point-in-time copy, safe to call only between layers
    /// (spec.md §4.4 `Snapshot()`).
    pub fn snapshot(&self) -> UserState {
        self.inner.lock().expect("state cache mutex poisoned").state.clone()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut UserState) -> T) -> T {
        let mut inner = self.inner.lock().expect("state cache mutex poisoned");
        let result = f(&mut inner.state);
        inner.dirty = true;
        result
    }
}

macro_rules! state_store {
    ($name:ident, $state_ty:ty, $field:ident) => {
        #[doc = concat!("`StateStore` view over `UserState::", stringify!($field), "`.")]
        pub struct $name<'a> {
            cache: &'a StateCache,
        }

        impl<'a> $name<'a> {
            pub fn new(cache: &'a StateCache) -> Self {
                Self { cache }
            }

            pub fn load(&self, name: &str) -> Option<$state_ty> {
                self.cache
                    .inner
                    .lock()
                    .expect("state cache mutex poisoned")
                    .state
                    .$field
                    .get(name)
                    .cloned()
            }

            pub fn save(&self, name: &str, state: $state_ty) {
                self.cache.with_state(|s| {
                    s.$field.insert(name.to_string(), state);
                });
            }

            pub fn delete(&self, name: &str) {
                self.cache.with_state(|s| {
                    s.$field.remove(name);
                });
            }

            pub fn names(&self) -> Vec<String> {
                self.cache
                    .inner
                    .lock()
                    .expect("state cache mutex poisoned")
                    .state
                    .$field
                    .keys()
                    .cloned()
                    .collect()
            }
        }
    };
}

state_store!(RuntimeStore, RuntimeState, runtimes);
state_store!(InstallerStore, InstallerState, installers);
state_store!(InstallerRepositoryStore, InstallerRepositoryState, installer_repositories);
state_store!(ToolStore, ToolState, tools);
