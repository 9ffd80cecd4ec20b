//! # glinject
//!
//! LD_PRELOAD shim that exposes GLX buffer swaps, GLX object destruction and
//! Xlib keyboard/window events to a Lua bootstrap script, and lets the
//! script withhold key presses and window reconfiguration from the
//! application.

// Exported hooks are C ABI entry points; their contract is the C one
#![allow(clippy::missing_safety_doc)]

// Macros must be defined before modules that use them
#[macro_use]
mod macros;

pub mod dispatch;
pub mod elf;
pub mod error;
pub mod events;
pub mod interpose;
pub mod lifecycle;
pub mod overrides;
pub mod reals;
pub mod script;
pub mod x11;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ScriptError, ShimError};
pub use lifecycle::{ensure_initialized, teardown};

/// Destroy the script engine when the library is unloaded or the process
/// exits. Uses .fini_array so it also runs for hosts that never call
/// `glinject_teardown`.
#[cfg(all(target_os = "linux", not(test)))]
#[link_section = ".fini_array"]
#[used]
pub static TEARDOWN_AT_EXIT: unsafe extern "C" fn() = {
    unsafe extern "C" fn at_exit() {
        crate::lifecycle::teardown();
    }
    at_exit
};
