//! Diagnostic reporting.
//!
//! Every state transition of a [`Control`](crate::Control) is described by a
//! [`ControlEvent`] and handed to a [`DiagnosticSink`] together with the
//! control's [`LogLevel`]. The sink decides what to do with it; the default
//! [`TracingSink`] forwards it to `tracing`.
//!
//! ## Ownership
//!
//! A control either owns its sink ([`SinkHandle::Owned`]) or shares one the
//! caller supplied ([`SinkHandle::Shared`]). Cloning a control deep-copies an
//! owned sink and aliases a shared one.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{env_vars, ConfigError};
use crate::manager::LibraryId;

/// Diagnostic threshold. Higher levels let more events through.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum LogLevel {
    Quiet = 0,
    Errors = 1,
    Warnings = 2,
    #[default]
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(level: u8) -> Self {
        match level {
            0 => LogLevel::Quiet,
            1 => LogLevel::Errors,
            2 => LogLevel::Warnings,
            3 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    /// Whether an event of `severity` passes this threshold.
    pub fn permits(self, severity: Severity) -> bool {
        self.as_u8() >= severity.min_level().as_u8()
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Errors => "errors",
            LogLevel::Warnings => "warnings",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    /// Accepts a level name or a number; numbers above 4 mean `debug`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Ok(LogLevel::from_u8(n));
        }
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "off" | "none" => Ok(LogLevel::Quiet),
            "errors" | "error" => Ok(LogLevel::Errors),
            "warnings" | "warning" | "warn" => Ok(LogLevel::Warnings),
            "info" => Ok(LogLevel::Info),
            "debug" | "verbose" => Ok(LogLevel::Debug),
            _ => Err(ConfigError::InvalidLogLevel(s.to_string())),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

static DEFAULT_LOG_LEVEL: Lazy<AtomicU8> = Lazy::new(|| {
    let level = std::env::var(env_vars::LOG_LEVEL)
        .ok()
        .and_then(|v| v.parse::<LogLevel>().ok())
        .unwrap_or_default();
    AtomicU8::new(level.as_u8())
});

/// Process-wide log level picked up by controls at construction.
pub fn default_log_level() -> LogLevel {
    LogLevel::from_u8(DEFAULT_LOG_LEVEL.load(Ordering::Relaxed))
}

/// Change the process-wide log level. Existing controls keep theirs.
pub fn set_default_log_level(level: LogLevel) {
    DEFAULT_LOG_LEVEL.store(level.as_u8(), Ordering::Relaxed);
}

/// Severity of a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    /// Lowest level at which this severity is shown.
    pub const fn min_level(self) -> LogLevel {
        match self {
            Severity::Error => LogLevel::Errors,
            Severity::Warning => LogLevel::Warnings,
            Severity::Info => LogLevel::Info,
            Severity::Debug => LogLevel::Debug,
        }
    }
}

/// How a control came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitOrigin {
    Default,
    Copy,
}

/// One state transition of a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    Initialized {
        origin: InitOrigin,
    },
    ManagerUnavailable,
    InvalidShortName {
        short_name: String,
    },
    LibraryAlreadyRegistered {
        short_name: String,
        path: String,
    },
    LibraryLoaded {
        short_name: String,
        path: String,
        library_id: LibraryId,
        /// The manager had the library open before this load.
        adopted: bool,
    },
    LibraryLoadFailed {
        short_name: String,
        path: String,
        reason: String,
    },
    LibraryNotRegistered {
        short_name: String,
    },
    LibraryUnloaded {
        short_name: String,
        path: String,
    },
    LibraryUnloadFailed {
        short_name: String,
        path: String,
        reason: String,
    },
    RestrictionIgnored {
        short_name: String,
        api_name: String,
    },
    ObjectCreated {
        api_name: String,
        library: Option<String>,
    },
    ObjectCreateFailed {
        api_name: String,
        library: Option<String>,
    },
    MissingIdentity,
    ObjectDestroyed {
        api_name: String,
        library: Option<String>,
    },
    ObjectDestroyFailed {
        api_name: String,
        library: Option<String>,
        reason: String,
    },
}

impl ControlEvent {
    /// Stable event name, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlEvent::Initialized { .. } => "initialized",
            ControlEvent::ManagerUnavailable => "manager_unavailable",
            ControlEvent::InvalidShortName { .. } => "invalid_short_name",
            ControlEvent::LibraryAlreadyRegistered { .. } => "library_already_registered",
            ControlEvent::LibraryLoaded { .. } => "library_loaded",
            ControlEvent::LibraryLoadFailed { .. } => "library_load_failed",
            ControlEvent::LibraryNotRegistered { .. } => "library_not_registered",
            ControlEvent::LibraryUnloaded { .. } => "library_unloaded",
            ControlEvent::LibraryUnloadFailed { .. } => "library_unload_failed",
            ControlEvent::RestrictionIgnored { .. } => "restriction_ignored",
            ControlEvent::ObjectCreated { .. } => "object_created",
            ControlEvent::ObjectCreateFailed { .. } => "object_create_failed",
            ControlEvent::MissingIdentity => "missing_identity",
            ControlEvent::ObjectDestroyed { .. } => "object_destroyed",
            ControlEvent::ObjectDestroyFailed { .. } => "object_destroy_failed",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ControlEvent::Initialized { .. } | ControlEvent::LibraryAlreadyRegistered { .. } => {
                Severity::Debug
            }
            ControlEvent::LibraryLoaded { .. }
            | ControlEvent::LibraryUnloaded { .. }
            | ControlEvent::ObjectCreated { .. }
            | ControlEvent::ObjectDestroyed { .. } => Severity::Info,
            ControlEvent::LibraryNotRegistered { .. } | ControlEvent::RestrictionIgnored { .. } => {
                Severity::Warning
            }
            ControlEvent::ManagerUnavailable
            | ControlEvent::InvalidShortName { .. }
            | ControlEvent::LibraryLoadFailed { .. }
            | ControlEvent::LibraryUnloadFailed { .. }
            | ControlEvent::ObjectCreateFailed { .. }
            | ControlEvent::MissingIdentity
            | ControlEvent::ObjectDestroyFailed { .. } => Severity::Error,
        }
    }

    pub fn short_name(&self) -> Option<&str> {
        match self {
            ControlEvent::InvalidShortName { short_name }
            | ControlEvent::LibraryAlreadyRegistered { short_name, .. }
            | ControlEvent::LibraryLoaded { short_name, .. }
            | ControlEvent::LibraryLoadFailed { short_name, .. }
            | ControlEvent::LibraryNotRegistered { short_name }
            | ControlEvent::LibraryUnloaded { short_name, .. }
            | ControlEvent::LibraryUnloadFailed { short_name, .. }
            | ControlEvent::RestrictionIgnored { short_name, .. } => Some(short_name),
            ControlEvent::ObjectCreated { library, .. }
            | ControlEvent::ObjectCreateFailed { library, .. }
            | ControlEvent::ObjectDestroyed { library, .. }
            | ControlEvent::ObjectDestroyFailed { library, .. } => library.as_deref(),
            _ => None,
        }
    }

    pub fn api_name(&self) -> Option<&str> {
        match self {
            ControlEvent::RestrictionIgnored { api_name, .. }
            | ControlEvent::ObjectCreated { api_name, .. }
            | ControlEvent::ObjectCreateFailed { api_name, .. }
            | ControlEvent::ObjectDestroyed { api_name, .. }
            | ControlEvent::ObjectDestroyFailed { api_name, .. } => Some(api_name),
            _ => None,
        }
    }
}

fn from_library(library: &Option<String>) -> String {
    library
        .as_ref()
        .map(|name| format!(" from library '{}'", name))
        .unwrap_or_default()
}

impl Display for ControlEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ControlEvent::Initialized { origin } => match origin {
                InitOrigin::Default => write!(f, "Control initialised"),
                InitOrigin::Copy => write!(f, "Control initialised as a copy"),
            },
            ControlEvent::ManagerUnavailable => write!(f, "Unable to locate the plugin manager"),
            ControlEvent::InvalidShortName { short_name } => {
                write!(f, "Cannot derive a library name from short name {:?}", short_name)
            }
            ControlEvent::LibraryAlreadyRegistered { short_name, path } => {
                write!(f, "Library '{}' is already loaded from {}", short_name, path)
            }
            ControlEvent::LibraryLoaded {
                short_name,
                path,
                adopted,
                ..
            } => {
                if *adopted {
                    write!(f, "Library {} was already loaded; bound as '{}'", path, short_name)
                } else {
                    write!(f, "Loaded library '{}' from {}", short_name, path)
                }
            }
            ControlEvent::LibraryLoadFailed {
                short_name,
                path,
                reason,
            } => write!(f, "Failed to load library '{}' from {}: {}", short_name, path, reason),
            ControlEvent::LibraryNotRegistered { short_name } => {
                write!(f, "Library '{}' is not registered", short_name)
            }
            ControlEvent::LibraryUnloaded { short_name, path } => {
                write!(f, "Unloaded library '{}' ({})", short_name, path)
            }
            ControlEvent::LibraryUnloadFailed {
                short_name,
                path,
                reason,
            } => write!(f, "Failed to unload library '{}' ({}): {}", short_name, path, reason),
            ControlEvent::RestrictionIgnored {
                short_name,
                api_name,
            } => write!(
                f,
                "Library '{}' is not registered; creating '{}' from any library",
                short_name, api_name
            ),
            ControlEvent::ObjectCreated { api_name, library } => {
                write!(f, "Created '{}' object{}", api_name, from_library(library))
            }
            ControlEvent::ObjectCreateFailed { api_name, library } => {
                write!(f, "Failed to create '{}' object{}", api_name, from_library(library))
            }
            ControlEvent::MissingIdentity => {
                write!(f, "Object has no identity; cannot route destruction")
            }
            ControlEvent::ObjectDestroyed { api_name, library } => {
                write!(f, "Destroyed '{}' object{}", api_name, from_library(library))
            }
            ControlEvent::ObjectDestroyFailed {
                api_name,
                library,
                reason,
            } => write!(
                f,
                "Failed to destroy '{}' object{}: {}",
                api_name,
                from_library(library),
                reason
            ),
        }
    }
}

/// Receiver of control events.
pub trait DiagnosticSink: Send + Sync {
    /// Handle `event`. `threshold` is the reporting control's log level.
    fn report(&self, event: &ControlEvent, threshold: LogLevel);

    /// Independent copy of this sink, used when an owning control is cloned.
    fn clone_box(&self) -> Box<dyn DiagnosticSink>;
}

macro_rules! emit {
    ($level:ident, $event:expr) => {
        tracing::$level!(
            event = $event.kind(),
            short_name = $event.short_name().unwrap_or_default(),
            api_name = $event.api_name().unwrap_or_default(),
            "{}",
            $event
        )
    };
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink {
    emitted: AtomicU64,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events that passed the threshold so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl DiagnosticSink for TracingSink {
    fn report(&self, event: &ControlEvent, threshold: LogLevel) {
        let severity = event.severity();
        if !threshold.permits(severity) {
            return;
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);
        match severity {
            Severity::Error => emit!(error, event),
            Severity::Warning => emit!(warn, event),
            Severity::Info => emit!(info, event),
            Severity::Debug => emit!(debug, event),
        }
    }

    fn clone_box(&self) -> Box<dyn DiagnosticSink> {
        Box::new(TracingSink {
            emitted: AtomicU64::new(self.emitted()),
        })
    }
}

/// Sink that keeps every event passing the threshold in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ControlEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new sink behind an `Arc`, ready to be shared with controls.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn events(&self) -> Vec<ControlEvent> {
        self.events.lock().clone()
    }

    /// Event kinds in arrival order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ControlEvent::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Serialise the recorded events as JSON lines.
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let events = self.events.lock();
        let mut out = String::new();
        for event in events.iter() {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, event: &ControlEvent, threshold: LogLevel) {
        if threshold.permits(event.severity()) {
            self.events.lock().push(event.clone());
        }
    }

    fn clone_box(&self) -> Box<dyn DiagnosticSink> {
        Box::new(RecordingSink {
            events: Mutex::new(self.events()),
        })
    }
}

/// Whether a control owns its sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOwnership {
    Owned,
    Shared,
}

/// A control's sink, tagged with who is responsible for it.
pub enum SinkHandle {
    /// Private to the control; deep-copied on clone, dropped with it.
    Owned(Box<dyn DiagnosticSink>),
    /// Supplied by the caller; aliased on clone, never released here.
    Shared(Arc<dyn DiagnosticSink>),
}

impl SinkHandle {
    /// The default private sink.
    pub fn owned_default() -> Self {
        SinkHandle::Owned(Box::new(TracingSink::new()))
    }

    pub fn ownership(&self) -> SinkOwnership {
        match self {
            SinkHandle::Owned(_) => SinkOwnership::Owned,
            SinkHandle::Shared(_) => SinkOwnership::Shared,
        }
    }

    pub fn sink(&self) -> &dyn DiagnosticSink {
        match self {
            SinkHandle::Owned(sink) => sink.as_ref(),
            SinkHandle::Shared(sink) => sink.as_ref(),
        }
    }

    pub fn report(&self, event: &ControlEvent, threshold: LogLevel) {
        self.sink().report(event, threshold)
    }

    /// Whether both handles refer to the same shared sink.
    pub fn aliases(&self, other: &SinkHandle) -> bool {
        match (self, other) {
            (SinkHandle::Shared(a), SinkHandle::Shared(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Clone for SinkHandle {
    fn clone(&self) -> Self {
        match self {
            SinkHandle::Owned(sink) => SinkHandle::Owned(sink.clone_box()),
            SinkHandle::Shared(sink) => SinkHandle::Shared(Arc::clone(sink)),
        }
    }
}

impl fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SinkHandle").field(&self.ownership()).finish()
    }
}

impl Default for SinkHandle {
    fn default() -> Self {
        Self::owned_default()
    }
}
