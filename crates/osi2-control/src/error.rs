//! Error types for the control layer.
//!
//! Failures are returned as values. Each [`ControlError`] maps onto one
//! [`Status`] so callers that only care about the taxonomy can use
//! [`ControlError::status`].

use crate::manager::ManagerError;
use crate::object::PluginObject;
use crate::status::Status;

/// Result type alias for control operations.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors produced by [`Control`](crate::Control) operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// No plugin manager is installed or injected.
    #[error("No plugin manager available")]
    ManagerUnavailable,

    /// The short name cannot be turned into a library name.
    #[error("Invalid short name: {0:?}")]
    InvalidShortName(String),

    /// The manager failed to load the library.
    #[error("Failed to load library {path} for '{short_name}': {source}")]
    LoadFailed {
        short_name: String,
        path: String,
        #[source]
        source: ManagerError,
    },

    /// No binding exists for the short name.
    #[error("Library '{0}' is not registered")]
    NotRegistered(String),

    /// The manager failed to unload the library.
    #[error("Failed to unload library {path} for '{short_name}': {source}")]
    UnloadFailed {
        short_name: String,
        path: String,
        #[source]
        source: ManagerError,
    },

    /// The manager returned no object.
    #[error("Failed to create object for API '{api_name}'{}", restriction_suffix(.library))]
    CreateFailed {
        api_name: String,
        library: Option<String>,
    },

    /// The object has no identity and cannot be routed to its library.
    #[error("Object carries no identity information")]
    MissingIdentity,

    /// The manager refused to destroy the object.
    #[error("Failed to destroy object for API '{api_name}'{}: {source}", restriction_suffix(.library))]
    DestroyFailed {
        api_name: String,
        library: Option<String>,
        #[source]
        source: ManagerError,
    },
}

fn restriction_suffix(library: &Option<String>) -> String {
    match library {
        Some(name) => format!(" from library '{}'", name),
        None => String::new(),
    }
}

impl ControlError {
    /// The status this error resolves to.
    pub fn status(&self) -> Status {
        match self {
            ControlError::ManagerUnavailable => Status::NoManager,
            ControlError::InvalidShortName(_) | ControlError::LoadFailed { .. } => {
                Status::LoadFailed
            }
            ControlError::NotRegistered(_) => Status::NotRegistered,
            ControlError::UnloadFailed { .. } => Status::UnloadFailed,
            ControlError::CreateFailed { .. } => Status::CreateFailed,
            ControlError::MissingIdentity => Status::NoIdentity,
            ControlError::DestroyFailed { .. } => Status::DestroyFailed,
        }
    }

    /// The integer code of [`ControlError::status`].
    pub fn code(&self) -> i32 {
        self.status().code()
    }
}

/// A failed destruction. The object is handed back, identity intact, so the
/// caller can retry or account for the leak.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct DestroyFailure {
    pub object: PluginObject,
    #[source]
    pub error: ControlError,
}

impl DestroyFailure {
    pub fn status(&self) -> Status {
        self.error.status()
    }

    /// Split into the returned object and the cause.
    pub fn into_parts(self) -> (PluginObject, ControlError) {
        (self.object, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ControlError::ManagerUnavailable.status(), Status::NoManager);
        assert_eq!(
            ControlError::NotRegistered("clp".into()).status(),
            Status::NotRegistered
        );
        assert_eq!(ControlError::MissingIdentity.code(), -6);
        assert_eq!(
            ControlError::InvalidShortName(String::new()).status(),
            Status::LoadFailed
        );
    }

    #[test]
    fn test_create_failed_message() {
        let err = ControlError::CreateFailed {
            api_name: "SolverInterface".into(),
            library: Some("clp".into()),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create object for API 'SolverInterface' from library 'clp'"
        );

        let err = ControlError::CreateFailed {
            api_name: "SolverInterface".into(),
            library: None,
        };
        assert_eq!(
            err.to_string(),
            "Failed to create object for API 'SolverInterface'"
        );
    }
}
