//! Status taxonomy for control operations.
//!
//! Every control operation resolves to exactly one [`Status`]. Successful
//! outcomes carry non-negative codes, failures carry negative codes. The
//! integer form is stable and is what the CLI prints.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Outcome of a load, unload, create or destroy operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Library loaded and initialised.
    LoadedOk,
    /// Short name already bound, or the manager already had the library.
    AlreadyLoaded,
    /// Library unloaded and its binding removed.
    UnloadedOk,
    /// Object created.
    CreatedOk,
    /// Object created, but the requested library restriction was not honoured.
    CreatedRestrictionIgnored,
    /// Object destroyed by its owning library.
    DestroyedOk,
    /// Object destroyed, but the owning library was never known.
    DestroyedOkUnknownLib,

    /// No plugin manager could be resolved.
    NoManager,
    /// The manager failed to load the library.
    LoadFailed,
    /// The short name has no binding.
    NotRegistered,
    /// The manager failed to unload the library.
    UnloadFailed,
    /// The manager could not create the object.
    CreateFailed,
    /// The object carries no identity.
    NoIdentity,
    /// The manager failed to destroy the object.
    DestroyFailed,
}

impl Status {
    /// All statuses, successes first.
    pub const ALL: [Status; 14] = [
        Status::LoadedOk,
        Status::AlreadyLoaded,
        Status::UnloadedOk,
        Status::CreatedOk,
        Status::CreatedRestrictionIgnored,
        Status::DestroyedOk,
        Status::DestroyedOkUnknownLib,
        Status::NoManager,
        Status::LoadFailed,
        Status::NotRegistered,
        Status::UnloadFailed,
        Status::CreateFailed,
        Status::NoIdentity,
        Status::DestroyFailed,
    ];

    /// Integer code for this status.
    pub const fn code(self) -> i32 {
        match self {
            Status::LoadedOk => 0,
            Status::AlreadyLoaded => 1,
            Status::UnloadedOk => 2,
            Status::CreatedOk => 3,
            Status::CreatedRestrictionIgnored => 4,
            Status::DestroyedOk => 5,
            Status::DestroyedOkUnknownLib => 6,
            Status::NoManager => -1,
            Status::LoadFailed => -2,
            Status::NotRegistered => -3,
            Status::UnloadFailed => -4,
            Status::CreateFailed => -5,
            Status::NoIdentity => -6,
            Status::DestroyFailed => -7,
        }
    }

    /// Whether the operation achieved its purpose.
    pub const fn is_success(self) -> bool {
        self.code() >= 0
    }

    /// Stable snake_case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::LoadedOk => "loaded_ok",
            Status::AlreadyLoaded => "already_loaded",
            Status::UnloadedOk => "unloaded_ok",
            Status::CreatedOk => "created_ok",
            Status::CreatedRestrictionIgnored => "created_restriction_ignored",
            Status::DestroyedOk => "destroyed_ok",
            Status::DestroyedOkUnknownLib => "destroyed_ok_unknown_lib",
            Status::NoManager => "no_manager",
            Status::LoadFailed => "load_failed",
            Status::NotRegistered => "not_registered",
            Status::UnloadFailed => "unload_failed",
            Status::CreateFailed => "create_failed",
            Status::NoIdentity => "no_identity",
            Status::DestroyFailed => "destroy_failed",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// A status code outside the known taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown status code: {0}")]
pub struct UnknownStatusCode(pub i32);

impl TryFrom<i32> for Status {
    type Error = UnknownStatusCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Status::ALL
            .iter()
            .copied()
            .find(|status| status.code() == code)
            .ok_or(UnknownStatusCode(code))
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}
