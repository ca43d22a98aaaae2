//! Native Plugin Tests
//!
//! Drives `Control` over `NativePluginManager` with the `osi2-test-plugin`
//! cdylib, which cargo builds next to the test binaries:
//! - Descriptor export and parsing
//! - Restricted and unrestricted creation
//! - Destruction routed to the owning library
//! - Exit function on unload

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{const_mutex, Mutex, MutexGuard};

use osi2_control::manager::native::NativeObject;
use osi2_control::{
    Capabilities, Control, ControlConfig, ControlError, LibraryId, LogLevel, ManagerError,
    NativeManagerConfig, NativePluginManager, RecordingSink, Status,
};

// The plugin's live-object count is process-wide; its exit function reads it.
static PLUGIN_LOCK: Mutex<()> = const_mutex(());

fn lock_plugin() -> MutexGuard<'static, ()> {
    PLUGIN_LOCK.lock()
}

/// Directory and file name of the built test plugin.
fn test_plugin() -> (String, String) {
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap();
    let prefix = format!("{}osi2_test_plugin", DLL_PREFIX);

    for dir in [deps, deps.parent().unwrap_or(deps)] {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(DLL_SUFFIX) {
                return (dir.to_string_lossy().into_owned(), name);
            }
        }
    }
    panic!("osi2-test-plugin library not found next to {}", exe.display());
}

fn capabilities_of(native: &NativeObject) -> u64 {
    unsafe { *(native.as_ptr() as *const u64) }
}

fn setup(dir: &str) -> (Control, Arc<NativePluginManager>, Arc<RecordingSink>) {
    let manager = Arc::new(NativePluginManager::new(
        NativeManagerConfig::with_default_dir(Path::new(dir)),
    ));
    let sink = RecordingSink::shared();
    let control = Control::with_shared_sink(
        ControlConfig::default().with_log_level(LogLevel::Debug),
        sink.clone(),
    )
    .with_manager(manager.clone());
    (control, manager, sink)
}

#[test]
fn test_native_round_trip() {
    let _guard = lock_plugin();
    let (dir, lib_name) = test_plugin();
    let (mut control, manager, _sink) = setup(&dir);

    assert_eq!(
        control.load_from("solver", &lib_name, Some(&dir)).unwrap(),
        Status::LoadedOk
    );
    let id = control.binding("solver").unwrap().library_id;
    assert!(!id.is_unknown());

    // Restricted to the bound library.
    let caps = Capabilities::MESSAGES | Capabilities::WARM_START;
    let (restricted, status) = control
        .create_object_with("SolverInterface", Some("solver"), &caps)
        .unwrap();
    assert_eq!(status, Status::CreatedOk);
    assert_eq!(restricted.library_id(), Some(id));
    let native = restricted.downcast_ref::<NativeObject>().unwrap();
    assert_eq!(native.api_name(), "SolverInterface");
    assert_eq!(native.library(), id);
    assert_eq!(capabilities_of(native), caps.bits());

    // Unregistered restriction: any library, sentinel identity.
    let (unrestricted, status) = control
        .create_object("SolverInterface", Some("cbc"))
        .unwrap();
    assert_eq!(status, Status::CreatedRestrictionIgnored);
    assert_eq!(unrestricted.library_id(), Some(LibraryId::UNKNOWN));
    assert_eq!(
        unrestricted.downcast_ref::<NativeObject>().unwrap().library(),
        id
    );

    // The exit function refuses while objects are alive.
    let err = control.unload("solver").unwrap_err();
    assert!(matches!(
        err,
        ControlError::UnloadFailed {
            source: ManagerError::ExitFailed { code: 1, .. },
            ..
        }
    ));
    assert!(control.binding("solver").is_some());

    assert_eq!(
        control.destroy_object(restricted).unwrap(),
        Status::DestroyedOk
    );
    // Routed through the library recorded inside the object.
    assert_eq!(
        control.destroy_object(unrestricted).unwrap(),
        Status::DestroyedOkUnknownLib
    );

    assert_eq!(control.unload("solver").unwrap(), Status::UnloadedOk);
    assert!(manager.loaded_libraries().is_empty());

    // Reload from the manager's default directory.
    assert_eq!(
        control.load_with("solver", &lib_name).unwrap(),
        Status::LoadedOk
    );
    assert_ne!(control.binding("solver").unwrap().library_id, id);
    assert_eq!(control.unload("solver").unwrap(), Status::UnloadedOk);
}

#[test]
fn test_native_unknown_api() {
    let _guard = lock_plugin();
    let (dir, lib_name) = test_plugin();
    let (mut control, _manager, sink) = setup(&dir);
    control.load_from("solver", &lib_name, Some(&dir)).unwrap();

    let err = control
        .create_object("ProblemInterface", Some("solver"))
        .unwrap_err();
    assert_eq!(err.status(), Status::CreateFailed);
    assert_eq!(sink.kinds().last(), Some(&"object_create_failed"));

    assert_eq!(control.unload("solver").unwrap(), Status::UnloadedOk);
}

#[test]
fn test_native_already_open_library() {
    let _guard = lock_plugin();
    let (dir, lib_name) = test_plugin();
    let (mut first, manager, _sink) = setup(&dir);
    first.load_from("solver", &lib_name, Some(&dir)).unwrap();

    // A second control over the same manager adopts the open library.
    let mut second =
        Control::with_config(ControlConfig::default()).with_manager(manager.clone());
    assert_eq!(
        second.load_from("other", &lib_name, Some(&dir)).unwrap(),
        Status::AlreadyLoaded
    );
    assert_eq!(
        second.binding("other").unwrap().library_id,
        first.binding("solver").unwrap().library_id
    );
    assert_eq!(manager.loaded_libraries().len(), 1);

    assert_eq!(first.unload("solver").unwrap(), Status::UnloadedOk);
}
