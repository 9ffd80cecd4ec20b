//! Real (unintercepted) implementations of everything the shim hooks.
//!
//! Resolution happens in two tiers. The primitive tier reads `dlsym` and
//! `dlvsym` straight out of the loader's symbol table, because asking `dlsym`
//! for `dlsym` would land in our own hook. The general tier then opens libGL
//! and libX11 explicitly and looks every other symbol up against those
//! handles with the trusted `dlsym`.

use crate::elf::LoadedObject;
use crate::error::ShimError;
use crate::x11::*;
use glinject_config::{log_resolve_debug, log_resolve_trace};
use libc::{c_char, c_void};
use once_cell::sync::OnceCell;
use std::ffi::{CStr, CString};
use std::ptr::NonNull;

pub type DlsymFn = unsafe extern "C" fn(handle: *mut c_void, name: *const c_char) -> *mut c_void;
pub type DlvsymFn = unsafe extern "C" fn(
    handle: *mut c_void,
    name: *const c_char,
    version: *const c_char,
) -> *mut c_void;

/// Objects searched for the primitives, in order. glibc 2.34 moved `dlsym`
/// into libc and left libdl as an empty stub.
pub const PRIMITIVE_OBJECTS: &[&str] = &["*/libdl.so*", "*/libc.so*"];

/// The real `dlsym` / `dlvsym`.
#[derive(Clone, Copy)]
pub struct BootstrapPrimitives {
    pub dlsym: DlsymFn,
    pub dlvsym: DlvsymFn,
}

static PRIMITIVES: OnceCell<BootstrapPrimitives> = OnceCell::new();

/// Primitives resolved once per process.
///
/// Safe to call while the shim itself is still initializing: it only walks
/// loader data structures.
pub fn bootstrap_primitives() -> Result<&'static BootstrapPrimitives, ShimError> {
    PRIMITIVES.get_or_try_init(resolve_bootstrap_primitives)
}

pub fn resolve_bootstrap_primitives() -> Result<BootstrapPrimitives, ShimError> {
    let mut last_error = None;
    for pattern in PRIMITIVE_OBJECTS {
        let Some(object) = LoadedObject::find(pattern) else {
            log_resolve_trace!("No loaded object matches", pattern = *pattern);
            continue;
        };
        let dlsym = object.find_symbol("dlsym");
        let dlvsym = object.find_symbol("dlvsym");
        match (dlsym, dlvsym) {
            (Some(dlsym), Some(dlvsym)) => {
                log_resolve_debug!("Resolved bootstrap primitives", object = object.path.as_str());
                return Ok(unsafe {
                    BootstrapPrimitives {
                        dlsym: std::mem::transmute::<*mut c_void, DlsymFn>(dlsym),
                        dlvsym: std::mem::transmute::<*mut c_void, DlvsymFn>(dlvsym),
                    }
                });
            }
            (None, _) => {
                last_error = Some(ShimError::PrimitiveNotFound {
                    symbol: "dlsym",
                    object: object.path,
                })
            }
            (_, None) => {
                last_error = Some(ShimError::PrimitiveNotFound {
                    symbol: "dlvsym",
                    object: object.path,
                })
            }
        }
    }
    Err(last_error.unwrap_or_else(|| ShimError::ObjectNotFound {
        patterns: PRIMITIVE_OBJECTS.join(", "),
    }))
}

/// Libraries the general tier opens by soname.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
    Gl,
    X11,
}

impl Library {
    pub fn soname(self) -> &'static CStr {
        match self {
            Library::Gl => c"libGL.so.1",
            Library::X11 => c"libX11.so.6",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Library::Gl => "libGL.so.1",
            Library::X11 => "libX11.so.6",
        }
    }

    fn open(self) -> Result<*mut c_void, ShimError> {
        let handle = unsafe { libc::dlopen(self.soname().as_ptr(), libc::RTLD_LOCAL | libc::RTLD_LAZY) };
        if handle.is_null() {
            return Err(ShimError::LibraryNotFound {
                library: self.name(),
                reason: last_dl_error(),
            });
        }
        Ok(handle)
    }
}

/// Current `dlerror()` text, or a placeholder when there is none.
fn last_dl_error() -> String {
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        "no error reported".to_string()
    } else {
        unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
    }
}

macro_rules! real_symbols {
    ($( $variant:ident => $name:literal in $lib:ident, $accessor:ident: $ty:ty; )*) => {
        /// Every function the shim forwards to or calls itself.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum RealSymbol {
            $($variant,)*
        }

        impl RealSymbol {
            pub const ALL: &'static [RealSymbol] = &[$(RealSymbol::$variant,)*];
            pub const COUNT: usize = Self::ALL.len();

            pub fn name(self) -> &'static str {
                match self {
                    $(RealSymbol::$variant => $name,)*
                }
            }

            pub fn library(self) -> Library {
                match self {
                    $(RealSymbol::$variant => Library::$lib,)*
                }
            }
        }

        impl RealSymbols {
            $(
                #[inline]
                pub fn $accessor(&self) -> $ty {
                    unsafe { std::mem::transmute::<*mut c_void, $ty>(self.address(RealSymbol::$variant)) }
                }
            )*
        }
    };
}

real_symbols! {
    GlXGetProcAddress => "glXGetProcAddress" in Gl, glx_get_proc_address: GlXGetProcAddressFn;
    GlXGetProcAddressArb => "glXGetProcAddressARB" in Gl, glx_get_proc_address_arb: GlXGetProcAddressFn;
    GlXSwapBuffers => "glXSwapBuffers" in Gl, glx_swap_buffers: GlXSwapBuffersFn;
    GlXDestroyContext => "glXDestroyContext" in Gl, glx_destroy_context: GlXDestroyContextFn;
    GlXDestroyWindow => "glXDestroyWindow" in Gl, glx_destroy_window: GlXDestroyDrawableFn;
    GlXDestroyPixmap => "glXDestroyPixmap" in Gl, glx_destroy_pixmap: GlXDestroyDrawableFn;
    GlXDestroyGlxPixmap => "glXDestroyGLXPixmap" in Gl, glx_destroy_glx_pixmap: GlXDestroyDrawableFn;
    GlXDestroyPbuffer => "glXDestroyPbuffer" in Gl, glx_destroy_pbuffer: GlXDestroyDrawableFn;
    XNextEvent => "XNextEvent" in X11, x_next_event: XNextEventFn;
    XWindowEvent => "XWindowEvent" in X11, x_window_event: XWindowEventFn;
    XMaskEvent => "XMaskEvent" in X11, x_mask_event: XMaskEventFn;
    XIfEvent => "XIfEvent" in X11, x_if_event: XIfEventFn;
    XCheckIfEvent => "XCheckIfEvent" in X11, x_check_if_event: XCheckIfEventFn;
    XLookupKeysym => "XLookupKeysym" in X11, x_lookup_keysym: XLookupKeysymFn;
    XKeysymToString => "XKeysymToString" in X11, x_keysym_to_string: XKeysymToStringFn;
}

/// Resolved addresses, indexed by `RealSymbol`. Immutable once built.
pub struct RealSymbols {
    addrs: [NonNull<c_void>; RealSymbol::COUNT],
}

// Plain code addresses; never written after construction.
unsafe impl Send for RealSymbols {}
unsafe impl Sync for RealSymbols {}

impl RealSymbols {
    /// General tier: open each library once and look every symbol up in it.
    pub fn resolve(primitives: &BootstrapPrimitives) -> Result<Self, ShimError> {
        let gl = Library::Gl.open()?;
        let x11 = Library::X11.open()?;
        log_resolve_debug!("Opened GL and X11 libraries");

        Self::resolve_with(|symbol| {
            let handle = match symbol.library() {
                Library::Gl => gl,
                Library::X11 => x11,
            };
            match CString::new(symbol.name()) {
                Ok(name) => unsafe { (primitives.dlsym)(handle, name.as_ptr()) },
                Err(_) => std::ptr::null_mut(),
            }
        })
    }

    /// Build the table from an arbitrary lookup. A null result fails with
    /// the name of that symbol.
    pub fn resolve_with<F>(mut lookup: F) -> Result<Self, ShimError>
    where
        F: FnMut(RealSymbol) -> *mut c_void,
    {
        let mut addrs = [NonNull::dangling(); RealSymbol::COUNT];
        for &symbol in RealSymbol::ALL {
            let addr = NonNull::new(lookup(symbol)).ok_or_else(|| ShimError::SymbolNotFound {
                symbol: symbol.name(),
                library: symbol.library().name(),
                reason: last_dl_error(),
            })?;
            log_resolve_trace!("Resolved real symbol", symbol = symbol.name());
            addrs[symbol as usize] = addr;
        }
        Ok(Self { addrs })
    }

    pub fn address(&self, symbol: RealSymbol) -> *mut c_void {
        self.addrs[symbol as usize].as_ptr()
    }
}
