//! Native plugin manager using libloading.
//!
//! Loads plugin libraries (.so, .dylib, .dll) at runtime, keeps them open
//! while they are bound, and routes object construction to the factories
//! each library lists in its descriptor.

use std::ffi::c_void;
use std::path::PathBuf;
use std::ptr::NonNull;

use libloading::{Library, Symbol};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::descriptor::{
    parse_descriptor, ParsedRegistration, PluginExitFn, PluginInitFn, PLUGIN_EXIT_SYMBOL,
    PLUGIN_INIT_SYMBOL,
};
use super::{
    join_path, ApiObject, DestroyResult, LibraryId, LoadedLibrary, ManagerError, PluginManager,
    Result,
};
use crate::adapter::ObjectAdapter;
use crate::config::env_vars;

/// Configuration for [`NativePluginManager`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeManagerConfig {
    /// Directory used when a load names no directory.
    pub default_plugin_dir: Option<PathBuf>,
}

impl NativeManagerConfig {
    pub fn with_default_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            default_plugin_dir: Some(dir.into()),
        }
    }

    /// Build from `OSI2_MANAGER_PLUGIN_DIR`.
    pub fn from_env() -> Self {
        Self {
            default_plugin_dir: std::env::var_os(env_vars::MANAGER_PLUGIN_DIR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// The configured directory, else `<data-local>/osi2/plugins`, else empty.
    pub fn resolved_default_dir(&self) -> String {
        self.default_plugin_dir
            .clone()
            .or_else(|| dirs::data_local_dir().map(|d| d.join("osi2").join("plugins")))
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Object built by a native factory.
#[derive(Debug)]
pub struct NativeObject {
    ptr: NonNull<c_void>,
    api_name: String,
    library: LibraryId,
}

// SAFETY: the pointer is only dereferenced by the owning plugin's destroy
// function, and objects are moved between threads only as opaque handles.
unsafe impl Send for NativeObject {}

impl NativeObject {
    /// Raw pointer for handing the object back to plugin code.
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    /// Library whose factory built this object.
    pub fn library(&self) -> LibraryId {
        self.library
    }
}

/// A library held open by the manager.
struct NativeLibrary {
    id: LibraryId,
    path: String,
    registrations: Vec<ParsedRegistration>,
    exit_fn: Option<PluginExitFn>,
    live_objects: usize,
    // Dropped last so function pointers above never outlive the mapping.
    _library: Library,
}

impl NativeLibrary {
    fn registration(&self, api_name: &str) -> Option<&ParsedRegistration> {
        self.registrations.iter().find(|r| r.api_name == api_name)
    }
}

#[derive(Default)]
struct NativeState {
    next_id: u64,
    /// Libraries in load order.
    libraries: Vec<NativeLibrary>,
}

impl NativeState {
    fn by_path(&self, path: &str) -> Option<&NativeLibrary> {
        self.libraries.iter().find(|l| l.path == path)
    }

    fn by_id_mut(&mut self, id: LibraryId) -> Option<&mut NativeLibrary> {
        self.libraries.iter_mut().find(|l| l.id == id)
    }
}

/// Plugin manager backed by dynamic libraries.
pub struct NativePluginManager {
    config: NativeManagerConfig,
    state: RwLock<NativeState>,
}

impl NativePluginManager {
    pub fn new(config: NativeManagerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(NativeState::default()),
        }
    }

    /// Ids of the libraries currently open, in load order.
    pub fn loaded_libraries(&self) -> Vec<(LibraryId, String)> {
        self.state
            .read()
            .libraries
            .iter()
            .map(|l| (l.id, l.path.clone()))
            .collect()
    }

    fn open(path: &str, id: LibraryId) -> Result<NativeLibrary> {
        let library = unsafe {
            Library::new(path).map_err(|e| ManagerError::OpenFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?
        };

        let init_fn: PluginInitFn = unsafe {
            let sym: Symbol<PluginInitFn> = library
                .get(PLUGIN_INIT_SYMBOL)
                .map_err(|_| ManagerError::MissingInit(path.to_string()))?;
            *sym
        };

        let exit_fn: Option<PluginExitFn> = unsafe {
            library
                .get::<PluginExitFn>(PLUGIN_EXIT_SYMBOL)
                .ok()
                .map(|sym| *sym)
        };

        let registrations = unsafe {
            let descriptor = init_fn();
            parse_descriptor(descriptor).map_err(|e| {
                tracing::warn!(path, error = %e, "Plugin init returned an unusable descriptor");
                ManagerError::InitFailed(path.to_string())
            })?
        };

        Ok(NativeLibrary {
            id,
            path: path.to_string(),
            registrations,
            exit_fn,
            live_objects: 0,
            _library: library,
        })
    }
}

impl Default for NativePluginManager {
    fn default() -> Self {
        Self::new(NativeManagerConfig::from_env())
    }
}

impl PluginManager for NativePluginManager {
    fn load_one_lib(&self, lib_name: &str, dir: Option<&str>) -> Result<LoadedLibrary> {
        let path = join_path(dir, lib_name);
        let mut state = self.state.write();

        if let Some(existing) = state.by_path(&path) {
            return Ok(LoadedLibrary {
                id: existing.id,
                already_loaded: true,
            });
        }

        let id = LibraryId::new(state.next_id + 1);
        let library = Self::open(&path, id)?;
        state.next_id += 1;

        tracing::info!(
            path = %path,
            id = %id,
            apis = library.registrations.len(),
            "Loaded native plugin library"
        );
        state.libraries.push(library);

        Ok(LoadedLibrary {
            id,
            already_loaded: false,
        })
    }

    fn unload_one_lib(&self, lib_name: &str, dir: Option<&str>) -> Result<()> {
        let path = join_path(dir, lib_name);
        let mut state = self.state.write();

        let index = state
            .libraries
            .iter()
            .position(|l| l.path == path)
            .ok_or_else(|| ManagerError::NotLoaded(path.clone()))?;

        if let Some(exit_fn) = state.libraries[index].exit_fn {
            let code = unsafe { exit_fn() };
            if code != 0 {
                return Err(ManagerError::ExitFailed { path, code });
            }
        }

        let library = state.libraries.remove(index);
        if library.live_objects > 0 {
            tracing::warn!(
                path = %library.path,
                live_objects = library.live_objects,
                "Unloading library with live objects"
            );
        }
        drop(library);

        tracing::info!(path = %path, "Unloaded native plugin library");
        Ok(())
    }

    fn create_object(
        &self,
        api_name: &str,
        library: LibraryId,
        adapter: &dyn ObjectAdapter,
    ) -> Option<ApiObject> {
        let mut state = self.state.write();

        let candidate = state.libraries.iter_mut().find(|l| {
            (library.is_unknown() || l.id == library) && l.registration(api_name).is_some()
        })?;
        let create = candidate.registration(api_name)?.create;

        let raw = unsafe { create(adapter.capabilities().bits()) };
        let ptr = NonNull::new(raw)?;
        candidate.live_objects += 1;

        Some(Box::new(NativeObject {
            ptr,
            api_name: api_name.to_string(),
            library: candidate.id,
        }))
    }

    fn destroy_object(
        &self,
        api_name: &str,
        library: LibraryId,
        object: ApiObject,
    ) -> DestroyResult {
        let native = match object.downcast::<NativeObject>() {
            Ok(native) => native,
            Err(object) => {
                return Err((object, ManagerError::ForeignObject(api_name.to_string())));
            }
        };

        // An unrestricted object still knows which library built it.
        let owner = if library.is_unknown() {
            native.library
        } else {
            library
        };

        let mut state = self.state.write();
        let Some(lib) = state.by_id_mut(owner) else {
            return Err((native as ApiObject, ManagerError::UnknownLibrary(owner)));
        };
        let Some(destroy) = lib.registration(api_name).map(|r| r.destroy) else {
            return Err((native as ApiObject, ManagerError::UnknownApi(api_name.to_string())));
        };

        let code = unsafe { destroy(native.as_ptr()) };
        if code != 0 {
            return Err((
                native as ApiObject,
                ManagerError::DestroyRejected {
                    api_name: api_name.to_string(),
                    code,
                },
            ));
        }
        lib.live_objects = lib.live_objects.saturating_sub(1);
        Ok(())
    }

    fn default_plugin_dir(&self) -> String {
        self.config.resolved_default_dir()
    }
}

impl Drop for NativePluginManager {
    fn drop(&mut self) {
        for library in self.state.get_mut().libraries.drain(..) {
            if let Some(exit_fn) = library.exit_fn {
                let code = unsafe { exit_fn() };
                if code != 0 {
                    tracing::warn!(path = %library.path, code, "Plugin exit function failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DefaultAdapter;

    #[test]
    fn test_config_default_dir() {
        let config = NativeManagerConfig::with_default_dir("/opt/osi2/plugins");
        assert_eq!(config.resolved_default_dir(), "/opt/osi2/plugins");
    }

    #[test]
    fn test_load_missing_library() {
        let manager = NativePluginManager::new(NativeManagerConfig::default());
        let result = manager.load_one_lib("libOsi2NopeShim.so", Some("/nonexistent/osi2"));
        assert!(matches!(result, Err(ManagerError::OpenFailed { .. })));
        assert!(manager.loaded_libraries().is_empty());
    }

    #[test]
    fn test_unload_not_loaded() {
        let manager = NativePluginManager::new(NativeManagerConfig::default());
        let result = manager.unload_one_lib("libOsi2ClpShim.so", None);
        assert!(matches!(result, Err(ManagerError::NotLoaded(p)) if p == "libOsi2ClpShim.so"));
    }

    #[test]
    fn test_create_without_libraries() {
        let manager = NativePluginManager::new(NativeManagerConfig::default());
        assert!(manager
            .create_object("SolverInterface", LibraryId::UNKNOWN, &DefaultAdapter)
            .is_none());
    }

    #[test]
    fn test_destroy_foreign_object_is_returned() {
        let manager = NativePluginManager::new(NativeManagerConfig::default());
        let object: ApiObject = Box::new(5u8);
        let (object, err) = manager
            .destroy_object("SolverInterface", LibraryId::UNKNOWN, object)
            .unwrap_err();
        assert!(matches!(err, ManagerError::ForeignObject(_)));
        assert_eq!(object.downcast_ref::<u8>(), Some(&5));
    }
}
