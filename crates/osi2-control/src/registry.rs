//! Short-name registry.
//!
//! Maps each short name a caller loaded a library under to the binding the
//! manager handed back. Owned by one [`Control`](crate::Control).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manager::{join_path, LibraryId};

/// One loaded library, as seen by the control layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryBinding {
    pub short_name: String,
    /// File name handed to the manager.
    pub lib_name: String,
    /// Directory handed to the manager, if any.
    pub dir: Option<String>,
    pub library_id: LibraryId,
    pub loaded_at: DateTime<Utc>,
}

impl LibraryBinding {
    pub fn new(
        short_name: impl Into<String>,
        lib_name: impl Into<String>,
        dir: Option<String>,
        library_id: LibraryId,
    ) -> Self {
        Self {
            short_name: short_name.into(),
            lib_name: lib_name.into(),
            dir: dir.filter(|d| !d.is_empty()),
            library_id,
            loaded_at: Utc::now(),
        }
    }

    /// `dir` and `lib_name` joined with the platform separator.
    pub fn full_path(&self) -> String {
        join_path(self.dir.as_deref(), &self.lib_name)
    }
}

/// Short name to binding map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginRegistry {
    bindings: HashMap<String, LibraryBinding>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, short_name: &str) -> Option<&LibraryBinding> {
        self.bindings.get(short_name)
    }

    pub fn contains(&self, short_name: &str) -> bool {
        self.bindings.contains_key(short_name)
    }

    /// Insert a binding under its short name. An existing binding is kept and
    /// `false` is returned.
    pub fn insert(&mut self, binding: LibraryBinding) -> bool {
        if self.bindings.contains_key(&binding.short_name) {
            return false;
        }
        self.bindings.insert(binding.short_name.clone(), binding);
        true
    }

    pub fn remove(&mut self, short_name: &str) -> Option<LibraryBinding> {
        self.bindings.remove(short_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LibraryBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Short name bound to `id`. The sentinel id never matches.
    pub fn short_name_of(&self, id: LibraryId) -> Option<&str> {
        self.by_id(id).map(|b| b.short_name.as_str())
    }

    /// Full path of the library bound to `id`.
    pub fn full_path_of(&self, id: LibraryId) -> Option<String> {
        self.by_id(id).map(LibraryBinding::full_path)
    }

    fn by_id(&self, id: LibraryId) -> Option<&LibraryBinding> {
        if id.is_unknown() {
            return None;
        }
        self.bindings.values().find(|b| b.library_id == id)
    }
}
