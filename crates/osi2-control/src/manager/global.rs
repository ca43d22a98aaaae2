//! Process-wide plugin manager slot.
//!
//! There is one manager per process; every [`Control`](crate::Control) that
//! is not given a manager explicitly resolves it from here on first use and
//! caches the handle.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::{NativeManagerConfig, NativePluginManager, SharedPluginManager};

static GLOBAL_MANAGER: Lazy<RwLock<Option<SharedPluginManager>>> = Lazy::new(|| RwLock::new(None));

/// Get the installed manager, if any.
pub fn get() -> Option<SharedPluginManager> {
    GLOBAL_MANAGER.read().clone()
}

/// Install `manager` as the process-wide manager, returning the previous one.
pub fn install(manager: SharedPluginManager) -> Option<SharedPluginManager> {
    let previous = GLOBAL_MANAGER.write().replace(manager);
    if previous.is_some() {
        tracing::debug!("Replaced global plugin manager");
    }
    previous
}

/// Remove the process-wide manager, returning it.
///
/// Controls that already cached the old handle keep using it until their
/// cache is reset.
pub fn reset() -> Option<SharedPluginManager> {
    GLOBAL_MANAGER.write().take()
}

/// Get the installed manager, installing a native one built from `config`
/// when the slot is empty.
pub fn get_or_init_native(config: NativeManagerConfig) -> SharedPluginManager {
    let mut slot = GLOBAL_MANAGER.write();
    slot.get_or_insert_with(|| {
        tracing::info!(
            default_dir = %config.resolved_default_dir(),
            "Installing native plugin manager"
        );
        Arc::new(NativePluginManager::new(config)) as SharedPluginManager
    })
    .clone()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::StaticPluginManager;

    #[test]
    fn test_install_get_reset() {
        let _guard = test_support::lock_slot();
        reset();
        assert!(get().is_none());

        let manager: SharedPluginManager = Arc::new(StaticPluginManager::new());
        assert!(install(manager.clone()).is_none());
        let resolved = get().expect("manager installed");
        assert!(Arc::ptr_eq(&resolved, &manager));

        let removed = reset().expect("manager removed");
        assert!(Arc::ptr_eq(&removed, &manager));
        assert!(get().is_none());
    }

    #[test]
    fn test_get_or_init_native_keeps_existing() {
        let _guard = test_support::lock_slot();
        reset();

        let manager: SharedPluginManager = Arc::new(StaticPluginManager::new());
        install(manager.clone());
        let resolved = get_or_init_native(NativeManagerConfig::default());
        assert!(Arc::ptr_eq(&resolved, &manager));

        reset();
        let native = get_or_init_native(NativeManagerConfig::with_default_dir("/opt/osi2"));
        assert_eq!(native.default_plugin_dir(), "/opt/osi2");
        reset();
    }
}
