//! The control instance.
//!
//! A [`Control`] binds plugin libraries to short names, creates objects from
//! them and routes each object back to its library on destruction. All
//! library mechanics are delegated to a
//! [`PluginManager`](crate::manager::PluginManager).
//!
//! ## Example
//!
//! ```ignore
//! let mut control = Control::new();
//! control.load_from("clp", "libClpShim.so", None)?;
//! let (solver, _) = control.create_object("SolverInterface", Some("clp"))?;
//! control.destroy_object(solver)?;
//! control.unload("clp")?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use crate::adapter::{DefaultAdapter, ObjectAdapter};
use crate::config::ControlConfig;
use crate::diagnostics::{
    ControlEvent, DiagnosticSink, InitOrigin, LogLevel, SinkHandle, SinkOwnership,
};
use crate::error::{ControlError, DestroyFailure, Result};
use crate::manager::{global, join_path, LibraryId, ManagerError, SharedPluginManager};
use crate::object::{ObjectIdentity, PluginObject};
use crate::registry::{LibraryBinding, PluginRegistry};
use crate::status::Status;

/// Conventional file name of the plugin library for `short_name`:
/// `lib` + `Osi2` + capitalised short name + `Shim` + platform suffix.
///
/// Returns `None` for an empty short name.
pub fn library_file_name(short_name: &str) -> Option<String> {
    let mut chars = short_name.chars();
    let first = chars.next()?;
    let capitalised: String = first.to_uppercase().chain(chars).collect();
    Some(format!(
        "libOsi2{}Shim{}",
        capitalised,
        std::env::consts::DLL_SUFFIX
    ))
}

/// Where a control gets its plugin manager from.
#[derive(Clone)]
enum ManagerSource {
    /// Resolved from the process-wide slot on first use.
    Global(Option<SharedPluginManager>),
    /// Supplied by the caller.
    Injected(SharedPluginManager),
}

/// Plugin control layer.
///
/// Not synchronised: callers sharing a control across threads must
/// serialise access themselves.
pub struct Control {
    config: ControlConfig,
    registry: PluginRegistry,
    manager: ManagerSource,
    sink: SinkHandle,
}

impl Control {
    /// A control with the default configuration and a private tracing sink.
    pub fn new() -> Self {
        Self::with_config(ControlConfig::default())
    }

    pub fn with_config(config: ControlConfig) -> Self {
        Self::from_parts(config, SinkHandle::owned_default())
    }

    /// Report through `sink`, which stays shared with the caller.
    pub fn with_shared_sink(config: ControlConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self::from_parts(config, SinkHandle::Shared(sink))
    }

    /// Report through `sink`, which the control owns from now on.
    pub fn with_owned_sink(config: ControlConfig, sink: Box<dyn DiagnosticSink>) -> Self {
        Self::from_parts(config, SinkHandle::Owned(sink))
    }

    fn from_parts(config: ControlConfig, sink: SinkHandle) -> Self {
        let control = Self {
            config,
            registry: PluginRegistry::new(),
            manager: ManagerSource::Global(None),
            sink,
        };
        control.report(ControlEvent::Initialized {
            origin: InitOrigin::Default,
        });
        control
    }

    /// Use `manager` instead of the process-wide one.
    pub fn with_manager(mut self, manager: SharedPluginManager) -> Self {
        self.set_manager(manager);
        self
    }

    // ========================================================================
    // Manager
    // ========================================================================

    pub fn set_manager(&mut self, manager: SharedPluginManager) {
        self.manager = ManagerSource::Injected(manager);
    }

    /// Forget the cached or injected manager. The next operation resolves
    /// the process-wide one again.
    pub fn reset_manager(&mut self) {
        self.manager = ManagerSource::Global(None);
    }

    /// The manager in use, without resolving one.
    pub fn manager(&self) -> Option<&SharedPluginManager> {
        match &self.manager {
            ManagerSource::Global(cached) => cached.as_ref(),
            ManagerSource::Injected(manager) => Some(manager),
        }
    }

    fn resolve_manager(&mut self) -> Result<SharedPluginManager> {
        let resolved = match &mut self.manager {
            ManagerSource::Injected(manager) => Some(manager.clone()),
            ManagerSource::Global(Some(cached)) => Some(cached.clone()),
            ManagerSource::Global(cache) => {
                *cache = global::get();
                cache.clone()
            }
        };
        resolved.ok_or_else(|| {
            self.report(ControlEvent::ManagerUnavailable);
            ControlError::ManagerUnavailable
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn log_level(&self) -> LogLevel {
        self.config.log_level
    }

    pub fn sink_ownership(&self) -> SinkOwnership {
        self.sink.ownership()
    }

    /// Whether both controls report through the same shared sink.
    pub fn shares_sink_with(&self, other: &Control) -> bool {
        self.sink.aliases(&other.sink)
    }

    pub fn default_plugin_dir(&self) -> Option<&std::path::Path> {
        self.config.default_plugin_dir.as_deref()
    }

    pub fn set_default_plugin_dir(&mut self, dir: Option<PathBuf>) {
        self.config.default_plugin_dir = dir;
    }

    pub fn binding(&self, short_name: &str) -> Option<&LibraryBinding> {
        self.registry.get(short_name)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &LibraryBinding> {
        self.registry.iter()
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn short_name_of(&self, id: LibraryId) -> Option<&str> {
        self.registry.short_name_of(id)
    }

    pub fn full_path_of(&self, id: LibraryId) -> Option<String> {
        self.registry.full_path_of(id)
    }

    fn report(&self, event: ControlEvent) {
        self.sink.report(&event, self.config.log_level);
    }

    // ========================================================================
    // Libraries
    // ========================================================================

    /// Load `lib_name` from `dir` and bind it to `short_name`.
    ///
    /// An already bound short name returns [`Status::AlreadyLoaded`] without
    /// contacting the manager. A library the manager already had open is
    /// bound as well and also reports [`Status::AlreadyLoaded`].
    pub fn load_from(
        &mut self,
        short_name: &str,
        lib_name: &str,
        dir: Option<&str>,
    ) -> Result<Status> {
        if let Some(binding) = self.registry.get(short_name) {
            self.report(ControlEvent::LibraryAlreadyRegistered {
                short_name: short_name.to_string(),
                path: binding.full_path(),
            });
            return Ok(Status::AlreadyLoaded);
        }

        let manager = self.resolve_manager()?;
        let dir = dir.filter(|d| !d.is_empty());
        let path = join_path(dir, lib_name);

        match manager.load_one_lib(lib_name, dir) {
            Ok(loaded) => {
                self.registry.insert(LibraryBinding::new(
                    short_name,
                    lib_name,
                    dir.map(String::from),
                    loaded.id,
                ));
                self.report(ControlEvent::LibraryLoaded {
                    short_name: short_name.to_string(),
                    path,
                    library_id: loaded.id,
                    adopted: loaded.already_loaded,
                });
                Ok(if loaded.already_loaded {
                    Status::AlreadyLoaded
                } else {
                    Status::LoadedOk
                })
            }
            Err(source) => {
                self.report(ControlEvent::LibraryLoadFailed {
                    short_name: short_name.to_string(),
                    path: path.clone(),
                    reason: source.to_string(),
                });
                Err(ControlError::LoadFailed {
                    short_name: short_name.to_string(),
                    path,
                    source,
                })
            }
        }
    }

    /// Load `lib_name` from the configured default directory, falling back
    /// to the manager's.
    pub fn load_with(&mut self, short_name: &str, lib_name: &str) -> Result<Status> {
        let configured = self
            .config
            .default_plugin_dir
            .as_ref()
            .map(|d| d.to_string_lossy().into_owned())
            .filter(|d| !d.is_empty());

        let dir = match configured {
            Some(dir) => dir,
            None => self.resolve_manager()?.default_plugin_dir(),
        };
        self.load_from(short_name, lib_name, Some(&dir))
    }

    /// Load the conventionally named library for `short_name`.
    pub fn load(&mut self, short_name: &str) -> Result<Status> {
        let Some(lib_name) = library_file_name(short_name) else {
            self.report(ControlEvent::InvalidShortName {
                short_name: short_name.to_string(),
            });
            return Err(ControlError::InvalidShortName(short_name.to_string()));
        };
        self.load_with(short_name, &lib_name)
    }

    /// Unload the library bound to `short_name` and drop the binding.
    pub fn unload(&mut self, short_name: &str) -> Result<Status> {
        let Some(binding) = self.registry.get(short_name).cloned() else {
            self.report(ControlEvent::LibraryNotRegistered {
                short_name: short_name.to_string(),
            });
            return Err(ControlError::NotRegistered(short_name.to_string()));
        };

        let manager = self.resolve_manager()?;
        let path = binding.full_path();

        match manager.unload_one_lib(&binding.lib_name, binding.dir.as_deref()) {
            Ok(()) => {
                self.registry.remove(short_name);
                self.report(ControlEvent::LibraryUnloaded {
                    short_name: short_name.to_string(),
                    path,
                });
                Ok(Status::UnloadedOk)
            }
            Err(source) => {
                // The manager no longer knows the library; the binding is stale.
                if matches!(source, ManagerError::NotLoaded(_)) {
                    self.registry.remove(short_name);
                }
                self.report(ControlEvent::LibraryUnloadFailed {
                    short_name: short_name.to_string(),
                    path: path.clone(),
                    reason: source.to_string(),
                });
                Err(ControlError::UnloadFailed {
                    short_name: short_name.to_string(),
                    path,
                    source,
                })
            }
        }
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Create an object implementing `api_name`, from the library bound to
    /// `short_name` when one is given.
    pub fn create_object(
        &mut self,
        api_name: &str,
        short_name: Option<&str>,
    ) -> Result<(PluginObject, Status)> {
        self.create_object_with(api_name, short_name, &DefaultAdapter)
    }

    /// Like [`create_object`](Self::create_object), negotiating capabilities
    /// through `adapter`.
    ///
    /// A short name with no binding does not fail the call: the object may
    /// come from any library and the status is
    /// [`Status::CreatedRestrictionIgnored`].
    pub fn create_object_with(
        &mut self,
        api_name: &str,
        short_name: Option<&str>,
        adapter: &dyn ObjectAdapter,
    ) -> Result<(PluginObject, Status)> {
        let manager = self.resolve_manager()?;
        let restriction = short_name.filter(|s| !s.is_empty());

        let library_id = match restriction {
            None => LibraryId::UNKNOWN,
            Some(short) => match self.registry.get(short) {
                Some(binding) => binding.library_id,
                None => {
                    self.report(ControlEvent::RestrictionIgnored {
                        short_name: short.to_string(),
                        api_name: api_name.to_string(),
                    });
                    LibraryId::UNKNOWN
                }
            },
        };

        let Some(inner) = manager.create_object(api_name, library_id, adapter) else {
            self.report(ControlEvent::ObjectCreateFailed {
                api_name: api_name.to_string(),
                library: restriction.map(String::from),
            });
            return Err(ControlError::CreateFailed {
                api_name: api_name.to_string(),
                library: restriction.map(String::from),
            });
        };

        self.report(ControlEvent::ObjectCreated {
            api_name: api_name.to_string(),
            library: self.registry.short_name_of(library_id).map(String::from),
        });

        let status = if restriction.is_some() && library_id.is_unknown() {
            Status::CreatedRestrictionIgnored
        } else {
            Status::CreatedOk
        };
        let object = PluginObject::tracked(inner, ObjectIdentity::new(api_name, library_id));
        Ok((object, status))
    }

    /// Destroy `object` through the library that built it.
    ///
    /// On failure the object is handed back inside the [`DestroyFailure`].
    pub fn destroy_object(
        &mut self,
        object: PluginObject,
    ) -> std::result::Result<Status, DestroyFailure> {
        let manager = match self.resolve_manager() {
            Ok(manager) => manager,
            Err(error) => return Err(DestroyFailure { object, error }),
        };

        let Some(identity) = object.identity().cloned() else {
            self.report(ControlEvent::MissingIdentity);
            return Err(DestroyFailure {
                object,
                error: ControlError::MissingIdentity,
            });
        };

        let library = self
            .registry
            .short_name_of(identity.library_id)
            .map(String::from);
        let (inner, _) = object.into_parts();

        match manager.destroy_object(&identity.api_name, identity.library_id, inner) {
            Ok(()) => {
                self.report(ControlEvent::ObjectDestroyed {
                    api_name: identity.api_name.clone(),
                    library,
                });
                Ok(if identity.library_id.is_unknown() {
                    Status::DestroyedOkUnknownLib
                } else {
                    Status::DestroyedOk
                })
            }
            Err((inner, source)) => {
                self.report(ControlEvent::ObjectDestroyFailed {
                    api_name: identity.api_name.clone(),
                    library: library.clone(),
                    reason: source.to_string(),
                });
                let error = ControlError::DestroyFailed {
                    api_name: identity.api_name.clone(),
                    library,
                    source,
                };
                Err(DestroyFailure {
                    object: PluginObject::tracked(inner, identity),
                    error,
                })
            }
        }
    }
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Control {
    /// Copies the registry and manager handle. An owned sink is deep-copied,
    /// a shared one is aliased.
    fn clone(&self) -> Self {
        let control = Self {
            config: self.config.clone(),
            registry: self.registry.clone(),
            manager: self.manager.clone(),
            sink: self.sink.clone(),
        };
        control.report(ControlEvent::Initialized {
            origin: InitOrigin::Copy,
        });
        control
    }

    fn clone_from(&mut self, source: &Self) {
        self.config.clone_from(&source.config);
        self.registry.clone_from(&source.registry);
        self.manager = source.manager.clone();
        // Dropping the previous handle releases an owned sink only.
        self.sink = source.sink.clone();
        self.report(ControlEvent::Initialized {
            origin: InitOrigin::Copy,
        });
    }
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Control")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("has_manager", &self.manager().is_some())
            .field("sink", &self.sink)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use crate::manager::global::test_support;
    use crate::manager::{ApiObject, PluginManager, StaticLibrary, StaticPluginManager};

    fn manager_with_clp(dir: Option<&str>) -> Arc<StaticPluginManager> {
        let manager = Arc::new(StaticPluginManager::new().with_default_dir("plugins"));
        manager.provide(
            dir,
            "libClpShim.so",
            StaticLibrary::new().with_factory("SolverInterface", |_| {
                Some(Box::new(String::from("clp")) as ApiObject)
            }),
        );
        manager
    }

    fn control(manager: &Arc<StaticPluginManager>) -> (Control, Arc<RecordingSink>) {
        let sink = RecordingSink::shared();
        let control = Control::with_shared_sink(
            ControlConfig::default().with_log_level(LogLevel::Debug),
            sink.clone(),
        )
        .with_manager(manager.clone());
        (control, sink)
    }

    #[test]
    fn test_library_file_name() {
        let suffix = std::env::consts::DLL_SUFFIX;
        assert_eq!(
            library_file_name("clp").unwrap(),
            format!("libOsi2ClpShim{}", suffix)
        );
        assert_eq!(
            library_file_name("Glpk").unwrap(),
            format!("libOsi2GlpkShim{}", suffix)
        );
        assert!(library_file_name("").is_none());
    }

    #[test]
    fn test_load_reports_events() {
        let manager = manager_with_clp(None);
        let (mut control, sink) = control(&manager);

        assert_eq!(
            control.load_from("clp", "libClpShim.so", None).unwrap(),
            Status::LoadedOk
        );
        assert_eq!(sink.kinds(), vec!["initialized", "library_loaded"]);
        assert_eq!(control.binding("clp").unwrap().lib_name, "libClpShim.so");
    }

    #[test]
    fn test_adopts_library_the_manager_already_had() {
        let manager = manager_with_clp(None);
        manager.load_one_lib("libClpShim.so", None).unwrap();
        let (mut control, _sink) = control(&manager);

        assert_eq!(
            control.load_from("clp", "libClpShim.so", None).unwrap(),
            Status::AlreadyLoaded
        );
        assert!(control.binding("clp").is_some());
    }

    #[test]
    fn test_failed_load_leaves_registry_unchanged() {
        let manager = manager_with_clp(None);
        let (mut control, sink) = control(&manager);

        let err = control.load_from("glpk", "libGlpkShim.so", None).unwrap_err();
        assert_eq!(err.status(), Status::LoadFailed);
        assert!(matches!(
            err,
            ControlError::LoadFailed {
                source: ManagerError::OpenFailed { .. },
                ..
            }
        ));
        assert!(control.registry().is_empty());
        assert_eq!(sink.kinds().last(), Some(&"library_load_failed"));
    }

    #[test]
    fn test_load_with_prefers_configured_dir() {
        let manager = manager_with_clp(Some("custom"));
        let (mut control, _sink) = control(&manager);
        control.set_default_plugin_dir(Some(PathBuf::from("custom")));

        assert_eq!(
            control.load_with("clp", "libClpShim.so").unwrap(),
            Status::LoadedOk
        );
        assert_eq!(manager.calls().default_dir, 0);
        assert_eq!(control.binding("clp").unwrap().dir.as_deref(), Some("custom"));
    }

    #[test]
    fn test_load_with_falls_back_to_manager_dir() {
        let manager = manager_with_clp(Some("plugins"));
        let (mut control, _sink) = control(&manager);

        assert_eq!(
            control.load_with("clp", "libClpShim.so").unwrap(),
            Status::LoadedOk
        );
        assert_eq!(manager.calls().default_dir, 1);
    }

    #[test]
    fn test_load_empty_short_name() {
        let manager = manager_with_clp(None);
        let (mut control, sink) = control(&manager);

        let err = control.load("").unwrap_err();
        assert!(matches!(err, ControlError::InvalidShortName(_)));
        assert_eq!(err.status(), Status::LoadFailed);
        assert_eq!(manager.calls().total(), 0);
        assert_eq!(sink.kinds().last(), Some(&"invalid_short_name"));
    }

    #[test]
    fn test_unload_failure_keeps_binding() {
        let manager = Arc::new(StaticPluginManager::new());
        manager.provide(None, "libClpShim.so", StaticLibrary::new().with_exit_code(2));
        let (mut control, _sink) = control(&manager);
        control.load_from("clp", "libClpShim.so", None).unwrap();

        let err = control.unload("clp").unwrap_err();
        assert_eq!(err.status(), Status::UnloadFailed);
        assert!(control.binding("clp").is_some());
    }

    #[test]
    fn test_unload_drops_stale_binding() {
        let manager = manager_with_clp(None);
        let (mut control, _sink) = control(&manager);
        control.load_from("clp", "libClpShim.so", None).unwrap();
        manager.unload_one_lib("libClpShim.so", None).unwrap();

        let err = control.unload("clp").unwrap_err();
        assert!(matches!(
            err,
            ControlError::UnloadFailed {
                source: ManagerError::NotLoaded(_),
                ..
            }
        ));
        assert!(control.binding("clp").is_none());
    }

    #[test]
    fn test_create_failure_reports_restriction() {
        let manager = manager_with_clp(None);
        let (mut control, _sink) = control(&manager);
        control.load_from("clp", "libClpShim.so", None).unwrap();

        let err = control
            .create_object("ProblemInterface", Some("clp"))
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::CreateFailed { ref library, .. } if library.as_deref() == Some("clp")
        ));
    }

    #[test]
    fn test_destroy_failure_returns_object() {
        let manager = Arc::new(StaticPluginManager::new());
        manager.provide(
            None,
            "libClpShim.so",
            StaticLibrary::new()
                .with_factory("SolverInterface", |_| Some(Box::new(9u8) as ApiObject))
                .with_destroy_hook("SolverInterface", |_| Err(-1)),
        );
        let (mut control, sink) = control(&manager);
        control.load_from("clp", "libClpShim.so", None).unwrap();
        let (object, _) = control.create_object("SolverInterface", Some("clp")).unwrap();

        let failure = control.destroy_object(object).unwrap_err();
        assert_eq!(failure.status(), Status::DestroyFailed);
        let (object, _) = failure.into_parts();
        assert_eq!(object.downcast_ref::<u8>(), Some(&9));
        assert_eq!(object.api_name(), Some("SolverInterface"));
        assert_eq!(sink.kinds().last(), Some(&"object_destroy_failed"));
    }

    #[test]
    fn test_resolves_and_caches_global_manager() {
        let _guard = test_support::lock_slot();
        global::reset();

        let mut control = Control::with_config(ControlConfig::default());
        let err = control.load_from("clp", "libClpShim.so", None).unwrap_err();
        assert!(matches!(err, ControlError::ManagerUnavailable));

        let manager = manager_with_clp(None);
        global::install(manager.clone());
        assert_eq!(
            control.load_from("clp", "libClpShim.so", None).unwrap(),
            Status::LoadedOk
        );

        // The cached handle survives the slot being emptied.
        global::reset();
        assert!(control.manager().is_some());
        assert_eq!(control.unload("clp").unwrap(), Status::UnloadedOk);

        control.reset_manager();
        assert!(control.manager().is_none());
    }

    #[test]
    fn test_clone_from_adopts_source_sink() {
        let manager = manager_with_clp(None);
        let (mut source, sink) = control(&manager);
        source.load_from("clp", "libClpShim.so", None).unwrap();

        let mut target =
            Control::with_owned_sink(ControlConfig::default(), Box::new(RecordingSink::new()));
        assert_eq!(target.sink_ownership(), SinkOwnership::Owned);

        target.clone_from(&source);
        assert_eq!(target.sink_ownership(), SinkOwnership::Shared);
        assert!(target.shares_sink_with(&source));
        assert!(target.binding("clp").is_some());
        assert_eq!(sink.kinds().last(), Some(&"initialized"));
    }
}
