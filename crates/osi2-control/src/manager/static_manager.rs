//! In-process plugin manager.
//!
//! Libraries are described in Rust with [`StaticLibrary`] and made available
//! under a path. Loading one "opens" it from that table instead of from the
//! filesystem, so hosts can link plugins statically and still drive them
//! through the same control layer. It also counts every call it receives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    join_path, ApiObject, DestroyResult, LibraryId, LoadedLibrary, ManagerError, PluginManager,
    Result,
};
use crate::adapter::{Capabilities, ObjectAdapter};

type Factory = Arc<dyn Fn(Capabilities) -> Option<ApiObject> + Send + Sync>;
type DestroyHook = Arc<dyn Fn(&ApiObject) -> std::result::Result<(), i32> + Send + Sync>;

/// A plugin library described in Rust.
#[derive(Clone, Default)]
pub struct StaticLibrary {
    factories: HashMap<String, Factory>,
    destroy_hooks: HashMap<String, DestroyHook>,
    init_fails: bool,
    exit_code: i32,
}

impl StaticLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `api_name`.
    pub fn with_factory<F>(mut self, api_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Capabilities) -> Option<ApiObject> + Send + Sync + 'static,
    {
        self.factories.insert(api_name.into(), Arc::new(factory));
        self
    }

    /// Run `hook` before an object of `api_name` is dropped. An `Err` code
    /// rejects the destruction and the object is handed back.
    pub fn with_destroy_hook<F>(mut self, api_name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&ApiObject) -> std::result::Result<(), i32> + Send + Sync + 'static,
    {
        self.destroy_hooks.insert(api_name.into(), Arc::new(hook));
        self
    }

    /// Make the init step fail on load.
    pub fn with_failing_init(mut self) -> Self {
        self.init_fails = true;
        self
    }

    /// Make the exit step return `code` on unload.
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// APIs this library can build.
    pub fn apis(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

/// Number of calls received per manager operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerCalls {
    pub load: usize,
    pub unload: usize,
    pub create: usize,
    pub destroy: usize,
    pub default_dir: usize,
}

impl ManagerCalls {
    pub fn total(&self) -> usize {
        self.load + self.unload + self.create + self.destroy + self.default_dir
    }
}

#[derive(Default)]
struct CallCounters {
    load: AtomicUsize,
    unload: AtomicUsize,
    create: AtomicUsize,
    destroy: AtomicUsize,
    default_dir: AtomicUsize,
}

struct OpenLibrary {
    id: LibraryId,
    path: String,
    library: StaticLibrary,
}

#[derive(Default)]
struct StaticState {
    next_id: u64,
    available: HashMap<String, StaticLibrary>,
    /// Open libraries in load order.
    open: Vec<OpenLibrary>,
}

/// Plugin manager over libraries registered from Rust code.
#[derive(Default)]
pub struct StaticPluginManager {
    default_dir: String,
    state: Mutex<StaticState>,
    calls: CallCounters,
}

impl StaticPluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory reported by [`PluginManager::default_plugin_dir`].
    pub fn with_default_dir(mut self, dir: impl Into<String>) -> Self {
        self.default_dir = dir.into();
        self
    }

    /// Make `library` loadable as `lib_name` inside `dir`.
    pub fn provide(&self, dir: Option<&str>, lib_name: &str, library: StaticLibrary) {
        let path = join_path(dir, lib_name);
        tracing::debug!(path = %path, "Static library available");
        self.state.lock().available.insert(path, library);
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> ManagerCalls {
        ManagerCalls {
            load: self.calls.load.load(Ordering::Relaxed),
            unload: self.calls.unload.load(Ordering::Relaxed),
            create: self.calls.create.load(Ordering::Relaxed),
            destroy: self.calls.destroy.load(Ordering::Relaxed),
            default_dir: self.calls.default_dir.load(Ordering::Relaxed),
        }
    }

    /// Whether a library with this id is open.
    pub fn is_open(&self, id: LibraryId) -> bool {
        self.state.lock().open.iter().any(|l| l.id == id)
    }

    /// Paths of the open libraries, in load order.
    pub fn open_paths(&self) -> Vec<String> {
        self.state.lock().open.iter().map(|l| l.path.clone()).collect()
    }
}

impl PluginManager for StaticPluginManager {
    fn load_one_lib(&self, lib_name: &str, dir: Option<&str>) -> Result<LoadedLibrary> {
        self.calls.load.fetch_add(1, Ordering::Relaxed);
        let path = join_path(dir, lib_name);
        let mut state = self.state.lock();

        if let Some(open) = state.open.iter().find(|l| l.path == path) {
            return Ok(LoadedLibrary {
                id: open.id,
                already_loaded: true,
            });
        }

        let library = state
            .available
            .get(&path)
            .cloned()
            .ok_or_else(|| ManagerError::OpenFailed {
                path: path.clone(),
                reason: "no such static library".to_string(),
            })?;
        if library.init_fails {
            return Err(ManagerError::InitFailed(path));
        }

        state.next_id += 1;
        let id = LibraryId::new(state.next_id);
        state.open.push(OpenLibrary { id, path, library });

        Ok(LoadedLibrary {
            id,
            already_loaded: false,
        })
    }

    fn unload_one_lib(&self, lib_name: &str, dir: Option<&str>) -> Result<()> {
        self.calls.unload.fetch_add(1, Ordering::Relaxed);
        let path = join_path(dir, lib_name);
        let mut state = self.state.lock();

        let index = state
            .open
            .iter()
            .position(|l| l.path == path)
            .ok_or_else(|| ManagerError::NotLoaded(path.clone()))?;

        let code = state.open[index].library.exit_code;
        if code != 0 {
            return Err(ManagerError::ExitFailed { path, code });
        }
        state.open.remove(index);
        Ok(())
    }

    fn create_object(
        &self,
        api_name: &str,
        library: LibraryId,
        adapter: &dyn ObjectAdapter,
    ) -> Option<ApiObject> {
        self.calls.create.fetch_add(1, Ordering::Relaxed);
        let factory = {
            let state = self.state.lock();
            state
                .open
                .iter()
                .filter(|l| library.is_unknown() || l.id == library)
                .find_map(|l| l.library.factories.get(api_name).cloned())?
        };
        factory(adapter.capabilities())
    }

    fn destroy_object(
        &self,
        api_name: &str,
        library: LibraryId,
        object: ApiObject,
    ) -> DestroyResult {
        self.calls.destroy.fetch_add(1, Ordering::Relaxed);
        let hook = {
            let state = self.state.lock();
            let owner = state.open.iter().find(|l| {
                (library.is_unknown() || l.id == library)
                    && l.library.factories.contains_key(api_name)
            });
            match owner {
                Some(owner) => owner.library.destroy_hooks.get(api_name).cloned(),
                None if library.is_unknown() => {
                    return Err((object, ManagerError::UnknownApi(api_name.to_string())));
                }
                None => return Err((object, ManagerError::UnknownLibrary(library))),
            }
        };

        if let Some(hook) = hook {
            if let Err(code) = hook(&object) {
                return Err((
                    object,
                    ManagerError::DestroyRejected {
                        api_name: api_name.to_string(),
                        code,
                    },
                ));
            }
        }
        drop(object);
        Ok(())
    }

    fn default_plugin_dir(&self) -> String {
        self.calls.default_dir.fetch_add(1, Ordering::Relaxed);
        self.default_dir.clone()
    }
}
