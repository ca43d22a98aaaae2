//! Native plugin library loaded by the control layer's tests.
//!
//! Exports one `SolverInterface` factory. Each object is the capability
//! bits it was built with. Exit fails while objects are still alive.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

static LIVE_OBJECTS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn create_solver(capabilities: u64) -> *mut c_void {
    LIVE_OBJECTS.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(capabilities)) as *mut c_void
}

unsafe extern "C" fn destroy_solver(object: *mut c_void) -> i32 {
    if object.is_null() {
        return -1;
    }
    drop(Box::from_raw(object as *mut u64));
    LIVE_OBJECTS.fetch_sub(1, Ordering::SeqCst);
    0
}

osi2_control::export_plugin! {
    "SolverInterface" => (create_solver, destroy_solver),
}

#[no_mangle]
pub extern "C" fn osi2_plugin_exit() -> i32 {
    if LIVE_OBJECTS.load(Ordering::SeqCst) == 0 {
        0
    } else {
        1
    }
}
