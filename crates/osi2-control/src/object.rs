//! Created objects and their provenance.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::manager::{ApiObject, LibraryId};

/// Which API an object implements and which library built it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIdentity {
    pub api_name: String,
    /// [`LibraryId::UNKNOWN`] when creation was not restricted to a library.
    pub library_id: LibraryId,
}

impl ObjectIdentity {
    pub fn new(api_name: impl Into<String>, library_id: LibraryId) -> Self {
        Self {
            api_name: api_name.into(),
            library_id,
        }
    }
}

/// An object produced by a plugin, owned by the caller until destroyed.
pub struct PluginObject {
    inner: ApiObject,
    identity: Option<ObjectIdentity>,
}

impl PluginObject {
    pub(crate) fn tracked(inner: ApiObject, identity: ObjectIdentity) -> Self {
        Self {
            inner,
            identity: Some(identity),
        }
    }

    /// Wrap an object that was not created through a control.
    pub fn untracked(inner: ApiObject) -> Self {
        Self {
            inner,
            identity: None,
        }
    }

    pub fn identity(&self) -> Option<&ObjectIdentity> {
        self.identity.as_ref()
    }

    pub fn api_name(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.api_name.as_str())
    }

    pub fn library_id(&self) -> Option<LibraryId> {
        self.identity.as_ref().map(|i| i.library_id)
    }

    /// Drop the identity, leaving the object untracked.
    pub fn strip_identity(&mut self) -> Option<ObjectIdentity> {
        self.identity.take()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.inner.downcast_mut::<T>()
    }

    /// Give up tracking and take the raw object.
    pub fn into_inner(self) -> ApiObject {
        self.inner
    }

    pub(crate) fn into_parts(self) -> (ApiObject, Option<ObjectIdentity>) {
        (self.inner, self.identity)
    }
}

impl fmt::Debug for PluginObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginObject")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
