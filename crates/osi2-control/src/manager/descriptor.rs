//! Native plugin descriptor.
//!
//! A native plugin library exports `osi2_plugin_init`, which returns a
//! pointer to a [`PluginDescriptor`] listing the APIs the library can build
//! objects for. It may also export `osi2_plugin_exit`, called before the
//! library is closed.

use std::ffi::c_void;

/// Init entry point symbol.
pub const PLUGIN_INIT_SYMBOL: &[u8] = b"osi2_plugin_init";

/// Optional exit entry point symbol.
pub const PLUGIN_EXIT_SYMBOL: &[u8] = b"osi2_plugin_exit";

/// Init entry point. A null return means initialisation failed.
pub type PluginInitFn = unsafe extern "C" fn() -> *const PluginDescriptor;

/// Exit entry point. Non-zero means failure.
pub type PluginExitFn = unsafe extern "C" fn() -> i32;

/// Object factory. Receives the host capability bits; null means failure.
pub type ObjectCreateFn = unsafe extern "C" fn(capabilities: u64) -> *mut c_void;

/// Object destructor. Non-zero means failure.
pub type ObjectDestroyFn = unsafe extern "C" fn(object: *mut c_void) -> i32;

/// One API a library can construct objects for.
#[repr(C)]
pub struct ObjectRegistration {
    pub api_name: *const u8,
    pub api_name_len: usize,
    pub create: ObjectCreateFn,
    pub destroy: ObjectDestroyFn,
}

impl ObjectRegistration {
    pub const fn new(api_name: &'static str, create: ObjectCreateFn, destroy: ObjectDestroyFn) -> Self {
        Self {
            api_name: api_name.as_ptr(),
            api_name_len: api_name.len(),
            create,
            destroy,
        }
    }
}

/// Descriptor returned by the init entry point.
#[repr(C)]
pub struct PluginDescriptor {
    pub registrations: *const ObjectRegistration,
    pub registration_count: usize,
}

/// Errors raised while reading a descriptor.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Descriptor pointer is null")]
    Null,

    #[error("Registration {index} has an invalid API name: {reason}")]
    InvalidApiName { index: usize, reason: String },
}

/// Rust-side copy of a registration.
#[derive(Debug, Clone)]
pub struct ParsedRegistration {
    pub api_name: String,
    pub create: ObjectCreateFn,
    pub destroy: ObjectDestroyFn,
}

/// Read the registrations out of a raw descriptor.
///
/// # Safety
/// `descriptor` must be null or point to a valid [`PluginDescriptor`] whose
/// registration array and name slices stay valid for the duration of the call.
pub unsafe fn parse_descriptor(
    descriptor: *const PluginDescriptor,
) -> Result<Vec<ParsedRegistration>, DescriptorError> {
    let descriptor = descriptor.as_ref().ok_or(DescriptorError::Null)?;
    if descriptor.registration_count == 0 {
        return Ok(Vec::new());
    }
    if descriptor.registrations.is_null() {
        return Err(DescriptorError::Null);
    }

    let raw = std::slice::from_raw_parts(descriptor.registrations, descriptor.registration_count);
    raw.iter()
        .enumerate()
        .map(|(index, reg)| {
            if reg.api_name.is_null() {
                return Err(DescriptorError::InvalidApiName {
                    index,
                    reason: "null pointer".to_string(),
                });
            }
            let bytes = std::slice::from_raw_parts(reg.api_name, reg.api_name_len);
            let api_name = String::from_utf8(bytes.to_vec()).map_err(|e| {
                DescriptorError::InvalidApiName {
                    index,
                    reason: e.to_string(),
                }
            })?;
            Ok(ParsedRegistration {
                api_name,
                create: reg.create,
                destroy: reg.destroy,
            })
        })
        .collect()
}

/// Owned descriptor for plugin crates written in Rust.
///
/// Keeps the registration array alive next to the descriptor that points
/// into it. Used by [`export_plugin!`](crate::export_plugin).
pub struct StaticDescriptor {
    registrations: Vec<ObjectRegistration>,
    descriptor: PluginDescriptor,
}

// SAFETY: all pointers refer to 'static names and to the owned, never
// mutated registration buffer.
unsafe impl Send for StaticDescriptor {}
unsafe impl Sync for StaticDescriptor {}

impl StaticDescriptor {
    pub fn new(registrations: Vec<ObjectRegistration>) -> Self {
        let descriptor = PluginDescriptor {
            registrations: registrations.as_ptr(),
            registration_count: registrations.len(),
        };
        Self {
            registrations,
            descriptor,
        }
    }

    pub fn as_ptr(&self) -> *const PluginDescriptor {
        &self.descriptor
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

/// Export the init entry point of a native plugin library.
///
/// # Usage
/// ```ignore
/// unsafe extern "C" fn create_clp(_caps: u64) -> *mut std::ffi::c_void { /* ... */ }
/// unsafe extern "C" fn destroy_clp(obj: *mut std::ffi::c_void) -> i32 { /* ... */ 0 }
///
/// osi2_control::export_plugin! {
///     "SolverInterface" => (create_clp, destroy_clp),
/// }
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($($api:literal => ($create:path, $destroy:path)),+ $(,)?) => {
        #[no_mangle]
        pub extern "C" fn osi2_plugin_init() -> *const $crate::manager::descriptor::PluginDescriptor {
            static DESCRIPTOR: ::std::sync::OnceLock<$crate::manager::descriptor::StaticDescriptor> =
                ::std::sync::OnceLock::new();
            DESCRIPTOR
                .get_or_init(|| {
                    $crate::manager::descriptor::StaticDescriptor::new(vec![
                        $($crate::manager::descriptor::ObjectRegistration::new($api, $create, $destroy)),+
                    ])
                })
                .as_ptr()
        }
    };
}
