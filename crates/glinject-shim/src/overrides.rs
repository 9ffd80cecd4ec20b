//! Names the shim answers for itself when asked through a lookup function.

use crate::interpose;
use libc::{c_char, c_void};
use std::ffi::CStr;

/// An intercepted entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Dlsym,
    Dlvsym,
    GlXGetProcAddress,
    GlXGetProcAddressArb,
    GlXSwapBuffers,
    GlXDestroyContext,
    GlXDestroyWindow,
    GlXDestroyPixmap,
    GlXDestroyGlxPixmap,
    GlXDestroyPbuffer,
    XNextEvent,
    XWindowEvent,
    XMaskEvent,
    XIfEvent,
    XCheckIfEvent,
}

impl Hook {
    pub const ALL: &'static [Hook] = &[
        Hook::Dlsym,
        Hook::Dlvsym,
        Hook::GlXGetProcAddress,
        Hook::GlXGetProcAddressArb,
        Hook::GlXSwapBuffers,
        Hook::GlXDestroyContext,
        Hook::GlXDestroyWindow,
        Hook::GlXDestroyPixmap,
        Hook::GlXDestroyGlxPixmap,
        Hook::GlXDestroyPbuffer,
        Hook::XNextEvent,
        Hook::XWindowEvent,
        Hook::XMaskEvent,
        Hook::XIfEvent,
        Hook::XCheckIfEvent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Hook::Dlsym => "dlsym",
            Hook::Dlvsym => "dlvsym",
            Hook::GlXGetProcAddress => "glXGetProcAddress",
            Hook::GlXGetProcAddressArb => "glXGetProcAddressARB",
            Hook::GlXSwapBuffers => "glXSwapBuffers",
            Hook::GlXDestroyContext => "glXDestroyContext",
            Hook::GlXDestroyWindow => "glXDestroyWindow",
            Hook::GlXDestroyPixmap => "glXDestroyPixmap",
            Hook::GlXDestroyGlxPixmap => "glXDestroyGLXPixmap",
            Hook::GlXDestroyPbuffer => "glXDestroyPbuffer",
            Hook::XNextEvent => "XNextEvent",
            Hook::XWindowEvent => "XWindowEvent",
            Hook::XMaskEvent => "XMaskEvent",
            Hook::XIfEvent => "XIfEvent",
            Hook::XCheckIfEvent => "XCheckIfEvent",
        }
    }

    /// Exact, case-sensitive match.
    pub fn from_name(name: &[u8]) -> Option<Hook> {
        Some(match name {
            b"dlsym" => Hook::Dlsym,
            b"dlvsym" => Hook::Dlvsym,
            b"glXGetProcAddress" => Hook::GlXGetProcAddress,
            b"glXGetProcAddressARB" => Hook::GlXGetProcAddressArb,
            b"glXSwapBuffers" => Hook::GlXSwapBuffers,
            b"glXDestroyContext" => Hook::GlXDestroyContext,
            b"glXDestroyWindow" => Hook::GlXDestroyWindow,
            b"glXDestroyPixmap" => Hook::GlXDestroyPixmap,
            b"glXDestroyGLXPixmap" => Hook::GlXDestroyGlxPixmap,
            b"glXDestroyPbuffer" => Hook::GlXDestroyPbuffer,
            b"XNextEvent" => Hook::XNextEvent,
            b"XWindowEvent" => Hook::XWindowEvent,
            b"XMaskEvent" => Hook::XMaskEvent,
            b"XIfEvent" => Hook::XIfEvent,
            b"XCheckIfEvent" => Hook::XCheckIfEvent,
            _ => return None,
        })
    }

    /// Address of the shim's replacement.
    pub fn address(self) -> *mut c_void {
        match self {
            Hook::Dlsym => interpose::dlsym as *mut c_void,
            Hook::Dlvsym => interpose::dlvsym as *mut c_void,
            Hook::GlXGetProcAddress => interpose::glXGetProcAddress as *mut c_void,
            Hook::GlXGetProcAddressArb => interpose::glXGetProcAddressARB as *mut c_void,
            Hook::GlXSwapBuffers => interpose::glXSwapBuffers as *mut c_void,
            Hook::GlXDestroyContext => interpose::glXDestroyContext as *mut c_void,
            Hook::GlXDestroyWindow => interpose::glXDestroyWindow as *mut c_void,
            Hook::GlXDestroyPixmap => interpose::glXDestroyPixmap as *mut c_void,
            Hook::GlXDestroyGlxPixmap => interpose::glXDestroyGLXPixmap as *mut c_void,
            Hook::GlXDestroyPbuffer => interpose::glXDestroyPbuffer as *mut c_void,
            Hook::XNextEvent => interpose::XNextEvent as *mut c_void,
            Hook::XWindowEvent => interpose::XWindowEvent as *mut c_void,
            Hook::XMaskEvent => interpose::XMaskEvent as *mut c_void,
            Hook::XIfEvent => interpose::XIfEvent as *mut c_void,
            Hook::XCheckIfEvent => interpose::XCheckIfEvent as *mut c_void,
        }
    }
}

/// Hook address for `name`, or `None` if the shim does not intercept it.
pub fn lookup_override(name: &[u8]) -> Option<*mut c_void> {
    Hook::from_name(name).map(Hook::address)
}

/// `lookup_override` for a C string. Null never matches.
pub unsafe fn lookup_override_cstr(name: *const c_char) -> Option<*mut c_void> {
    if name.is_null() {
        return None;
    }
    lookup_override(CStr::from_ptr(name).to_bytes())
}
