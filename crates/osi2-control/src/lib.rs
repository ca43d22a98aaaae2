//! Osi2 plugin control layer.
//!
//! Loads plugin libraries under short names, creates objects from them and
//! routes every object back to the library that built it on destruction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Control                                      │
//! │  PluginRegistry   short name -> binding      │
//! │  SinkHandle       diagnostics (owned/shared) │
//! └──────────────┬───────────────────────────────┘
//!                │ Arc<dyn PluginManager>
//! ┌──────────────▼───────────────────────────────┐
//! │ NativePluginManager  (libloading)            │
//! │ StaticPluginManager  (in-process factories)  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod adapter;
pub mod config;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod manager;
pub mod object;
pub mod registry;
pub mod status;

pub use adapter::{Capabilities, DefaultAdapter, ObjectAdapter};
pub use config::{ConfigError, ControlConfig};
pub use control::{library_file_name, Control};
pub use diagnostics::{
    ControlEvent, DiagnosticSink, LogLevel, RecordingSink, SinkHandle, TracingSink,
};
pub use error::{ControlError, DestroyFailure, Result};
pub use manager::{
    ApiObject, LibraryId, ManagerError, NativeManagerConfig, NativePluginManager, PluginManager,
    SharedPluginManager, StaticLibrary, StaticPluginManager,
};
pub use object::{ObjectIdentity, PluginObject};
pub use registry::{LibraryBinding, PluginRegistry};
pub use status::{Status, UnknownStatusCode};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commonly used types.
pub mod prelude {
    pub use crate::adapter::{Capabilities, ObjectAdapter};
    pub use crate::config::ControlConfig;
    pub use crate::control::Control;
    pub use crate::diagnostics::{DiagnosticSink, LogLevel};
    pub use crate::error::{ControlError, Result};
    pub use crate::manager::{LibraryId, PluginManager, SharedPluginManager};
    pub use crate::object::PluginObject;
    pub use crate::status::Status;
}
