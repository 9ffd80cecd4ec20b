//! Exported replacements for the intercepted GLX, Xlib and dl entry points.
//!
//! Each hook initializes the shim, does its script-facing work and then
//! calls the real implementation, returning its result untouched. The work
//! itself lives in crate-private functions taking a `ShimContext`, so it can
//! run against fake libraries in tests.
//!
//! Under `cfg(test)` nothing here is exported unmangled: a test binary must
//! never interpose its own `dlsym`.
#![allow(non_snake_case)]

use crate::dispatch::Notification;
use crate::events;
use crate::lifecycle::{self, ShimContext};
use crate::overrides::lookup_override_cstr;
use crate::reals::{self, BootstrapPrimitives};
use crate::x11::*;
use glinject_config::log_shim_debug;
use libc::{c_char, c_int, c_long, c_void};

/// Upper bound on events withheld during a single buffer swap.
const MAX_DRAINED_EVENTS: usize = 64;

fn primitives() -> &'static BootstrapPrimitives {
    reals::bootstrap_primitives().unwrap_or_else(|err| lifecycle::fatal(&err))
}

// --- Symbol lookup ---

#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn dlsym(handle: *mut c_void, name: *const c_char) -> *mut c_void {
    // A lookup issued while the shim is initializing is served without it.
    let _ = lifecycle::ensure_initialized();
    if let Some(hook) = lookup_override_cstr(name) {
        return hook;
    }
    (primitives().dlsym)(handle, name)
}

#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn dlvsym(
    handle: *mut c_void,
    name: *const c_char,
    version: *const c_char,
) -> *mut c_void {
    let _ = lifecycle::ensure_initialized();
    if let Some(hook) = lookup_override_cstr(name) {
        return hook;
    }
    (primitives().dlvsym)(handle, name, version)
}

#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn glXGetProcAddress(name: *const u8) -> *mut c_void {
    let context = hook_context!("glXGetProcAddress");
    get_proc_address(context.reals().glx_get_proc_address(), name)
}

#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn glXGetProcAddressARB(name: *const u8) -> *mut c_void {
    let context = hook_context!("glXGetProcAddressARB");
    get_proc_address(context.reals().glx_get_proc_address_arb(), name)
}

pub(crate) unsafe fn get_proc_address(real: GlXGetProcAddressFn, name: *const u8) -> *mut c_void {
    lookup_override_cstr(name as *const c_char).unwrap_or_else(|| real(name))
}

// --- GLX ---

#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn glXSwapBuffers(display: *mut Display, drawable: GLXDrawable) {
    let context = hook_context!("glXSwapBuffers");
    swap_buffers(context, display, drawable)
}

pub(crate) unsafe fn swap_buffers(context: &ShimContext, display: *mut Display, drawable: GLXDrawable) {
    drain_filtered_events(context, display);
    context.dispatcher.notify(Notification::BufferSwap {
        display: display.cast(),
        drawable: drawable as u64,
    });
    (context.reals().glx_swap_buffers())(display, drawable)
}

destroy_hook!(glXDestroyContext(context_id: GLXContext) => glx_destroy_context);
destroy_hook!(glXDestroyWindow(window: GLXWindow) => glx_destroy_window);
destroy_hook!(glXDestroyPixmap(pixmap: GLXPixmap) => glx_destroy_pixmap);
destroy_hook!(glXDestroyGLXPixmap(pixmap: GLXPixmap) => glx_destroy_glx_pixmap);
destroy_hook!(glXDestroyPbuffer(pbuffer: GLXPbuffer) => glx_destroy_pbuffer);

pub(crate) unsafe fn destroy_with<T>(
    context: &ShimContext,
    real: unsafe extern "C" fn(*mut Display, T),
    display: *mut Display,
    target: T,
    id: u64,
) {
    context.dispatcher.notify(Notification::ContextDestruction {
        display: display.cast(),
        drawable: id,
    });
    real(display, target)
}

// --- Xlib event retrieval ---

#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn XNextEvent(display: *mut Display, event: *mut XEvent) -> c_int {
    let context = hook_context!("XNextEvent");
    next_event(context, display, event)
}

#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn XWindowEvent(
    display: *mut Display,
    window: Window,
    mask: c_long,
    event: *mut XEvent,
) -> c_int {
    let context = hook_context!("XWindowEvent");
    window_event(context, display, window, mask, event)
}

#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn XMaskEvent(display: *mut Display, mask: c_long, event: *mut XEvent) -> c_int {
    let context = hook_context!("XMaskEvent");
    mask_event(context, display, mask, event)
}

#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn XIfEvent(
    display: *mut Display,
    event: *mut XEvent,
    predicate: XIfEventPredicate,
    arg: XPointer,
) -> c_int {
    let context = hook_context!("XIfEvent");
    if_event(context, display, event, predicate, arg)
}

#[cfg_attr(not(test), no_mangle)]
pub unsafe extern "C" fn XCheckIfEvent(
    display: *mut Display,
    event: *mut XEvent,
    predicate: XIfEventPredicate,
    arg: XPointer,
) -> Bool {
    let context = hook_context!("XCheckIfEvent");
    check_if_event(context, display, event, predicate, arg)
}

pub(crate) unsafe fn next_event(context: &ShimContext, display: *mut Display, event: *mut XEvent) -> c_int {
    let result = (context.reals().x_next_event())(display, event);
    route_event(context, event);
    result
}

pub(crate) unsafe fn window_event(
    context: &ShimContext,
    display: *mut Display,
    window: Window,
    mask: c_long,
    event: *mut XEvent,
) -> c_int {
    let result = (context.reals().x_window_event())(display, window, mask, event);
    route_event(context, event);
    result
}

pub(crate) unsafe fn mask_event(
    context: &ShimContext,
    display: *mut Display,
    mask: c_long,
    event: *mut XEvent,
) -> c_int {
    let result = (context.reals().x_mask_event())(display, mask, event);
    route_event(context, event);
    result
}

pub(crate) unsafe fn if_event(
    context: &ShimContext,
    display: *mut Display,
    event: *mut XEvent,
    predicate: XIfEventPredicate,
    arg: XPointer,
) -> c_int {
    let result = (context.reals().x_if_event())(display, event, predicate, arg);
    route_event(context, event);
    result
}

pub(crate) unsafe fn check_if_event(
    context: &ShimContext,
    display: *mut Display,
    event: *mut XEvent,
    predicate: XIfEventPredicate,
    arg: XPointer,
) -> Bool {
    let found = (context.reals().x_check_if_event())(display, event, predicate, arg);
    if found != False {
        route_event(context, event);
    }
    found
}

/// Tell the script about an event the application (or the drain) retrieved.
unsafe fn route_event(context: &ShimContext, event: *const XEvent) {
    if event.is_null() {
        return;
    }
    if let Some(window_event) = events::translate(context.reals(), context.modifiers(), &*event) {
        context.dispatcher.on_window_event(&window_event);
    }
}

// --- Buffer-swap event filtering ---

/// Predicate state for one drain. Xlib rescans the queue from the front on
/// every `XCheckIfEvent`; the first `rejected` events were already refused
/// and are not offered to the script again.
struct Drain<'a> {
    context: &'a ShimContext,
    rejected: usize,
    position: usize,
}

/// Pull every queued event the script wants to consume out of the queue.
unsafe fn drain_filtered_events(context: &ShimContext, display: *mut Display) {
    let real_check_if_event = context.reals().x_check_if_event();
    let mut drain = Drain {
        context,
        rejected: 0,
        position: 0,
    };

    let mut consumed = 0;
    while consumed < MAX_DRAINED_EVENTS {
        let mut event = XEvent::zeroed();
        drain.position = 0;
        let arg = &mut drain as *mut Drain as XPointer;
        if real_check_if_event(display, &mut event, Some(consume_predicate), arg) == False {
            break;
        }
        route_event(context, &event);
        consumed += 1;
    }
    if consumed > 0 {
        log_shim_debug!("Consumed events before buffer swap", count = consumed);
    }
}

unsafe extern "C" fn consume_predicate(_display: *mut Display, event: *mut XEvent, arg: XPointer) -> Bool {
    let drain = &mut *(arg as *mut Drain);
    let position = drain.position;
    drain.position += 1;
    if position < drain.rejected || event.is_null() {
        return False;
    }

    let context = drain.context;
    let consume = events::translate(context.reals(), context.modifiers(), &*event)
        .map(|window_event| context.dispatcher.should_consume(&window_event))
        .unwrap_or(false);
    if consume {
        True
    } else {
        drain.rejected += 1;
        False
    }
}

// --- Extras ---

/// Destroy the script engine. Safe to call more than once.
#[cfg_attr(not(test), no_mangle)]
pub extern "C" fn glinject_teardown() {
    lifecycle::teardown()
}

/// The real `glXGetProcAddress`, for companion code that loads GL
/// functions without going through the hooks.
#[cfg_attr(not(test), no_mangle)]
pub extern "C" fn glinject_get_gl_function_provider() -> Option<GlXGetProcAddressFn> {
    gl_function_provider(lifecycle::ensure_initialized())
}

pub(crate) fn gl_function_provider(context: Option<&ShimContext>) -> Option<GlXGetProcAddressFn> {
    context.map(|context| context.reals().glx_get_proc_address())
}
