//! Plugin manager collaborator.
//!
//! The manager owns the mechanics of opening and closing shared libraries and
//! of routing object construction to the factories a library registers. The
//! control layer only talks to it through [`PluginManager`].
//!
//! ## Implementations
//!
//! - [`NativePluginManager`]: dynamic libraries (.so, .dylib, .dll) via libloading
//! - [`StaticPluginManager`]: factories registered from Rust code, for
//!   statically linked plugins and tests
//!
//! A single manager is shared process-wide through [`global`].

use std::any::Any;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::ObjectAdapter;

pub mod descriptor;
pub mod global;
pub mod native;
pub mod static_manager;

pub use native::{NativeManagerConfig, NativePluginManager};
pub use static_manager::{StaticLibrary, StaticPluginManager};

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, ManagerError>;

/// Opaque object produced by a plugin factory.
pub type ApiObject = Box<dyn Any + Send>;

/// Shared handle to a plugin manager.
pub type SharedPluginManager = Arc<dyn PluginManager>;

/// Outcome of a failed destruction: the object comes back with the cause.
pub type DestroyResult = std::result::Result<(), (ApiObject, ManagerError)>;

/// Opaque identifier the manager assigns to one loaded library.
///
/// [`LibraryId::UNKNOWN`] (zero) means "no specific library".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(u64);

impl LibraryId {
    /// Sentinel for "no specific library" or "unknown association".
    pub const UNKNOWN: LibraryId = LibraryId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_unknown(self) -> bool {
        self.0 == 0
    }
}

impl Display for LibraryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Successful result of [`PluginManager::load_one_lib`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedLibrary {
    /// Identifier of the (possibly pre-existing) library.
    pub id: LibraryId,
    /// The manager already had this library loaded.
    pub already_loaded: bool,
}

/// Errors reported by a plugin manager.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// The shared library could not be opened.
    #[error("Failed to open library {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// The library does not export an init entry point.
    #[error("Library {0} has no init function")]
    MissingInit(String),

    /// The init entry point reported failure.
    #[error("Init function of {0} failed")]
    InitFailed(String),

    /// The library is not loaded.
    #[error("Library {0} is not loaded")]
    NotLoaded(String),

    /// The exit entry point reported failure.
    #[error("Exit function of {path} failed with code {code}")]
    ExitFailed { path: String, code: i32 },

    /// No registered factory handles the API.
    #[error("No factory registered for API '{0}'")]
    UnknownApi(String),

    /// The library id does not belong to a loaded library.
    #[error("Unknown library id {0}")]
    UnknownLibrary(LibraryId),

    /// The object is not of the type the factory produced.
    #[error("Object type does not match API '{0}'")]
    ForeignObject(String),

    /// The plugin's destroy function reported failure.
    #[error("Destroy function for API '{api_name}' failed with code {code}")]
    DestroyRejected { api_name: String, code: i32 },

    /// Other error.
    #[error("Plugin manager error: {0}")]
    Other(#[from] anyhow::Error),
}

/// The low-level load/unload/create/destroy protocol.
///
/// Implementations are process-wide and shared, so every method takes
/// `&self` and guards its own state.
pub trait PluginManager: Send + Sync {
    /// Load `lib_name`, from `dir` when given.
    fn load_one_lib(&self, lib_name: &str, dir: Option<&str>) -> Result<LoadedLibrary>;

    /// Unload a library previously loaded with the same name and directory.
    fn unload_one_lib(&self, lib_name: &str, dir: Option<&str>) -> Result<()>;

    /// Create an object implementing `api_name`. A non-sentinel `library`
    /// restricts the search to that library.
    fn create_object(
        &self,
        api_name: &str,
        library: LibraryId,
        adapter: &dyn ObjectAdapter,
    ) -> Option<ApiObject>;

    /// Destroy an object created for `api_name`.
    fn destroy_object(&self, api_name: &str, library: LibraryId, object: ApiObject)
        -> DestroyResult;

    /// Directory searched when the caller supplies none.
    fn default_plugin_dir(&self) -> String;
}

/// Join a directory and a file name with the platform separator.
///
/// An empty or absent directory yields the file name alone.
pub fn join_path(dir: Option<&str>, lib_name: &str) -> String {
    match dir {
        Some(dir) if !dir.is_empty() => {
            format!("{}{}{}", dir, std::path::MAIN_SEPARATOR, lib_name)
        }
        _ => lib_name.to_string(),
    }
}
