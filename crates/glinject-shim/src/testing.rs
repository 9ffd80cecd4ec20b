//! Stand-ins for libGL and libX11 used by unit tests.
//!
//! The fake event queue and the call log are thread-local, so tests running
//! in parallel never see each other's events.

use crate::dispatch::Dispatcher;
use crate::lifecycle::ShimContext;
use crate::reals::{RealSymbol, RealSymbols};
use crate::script::ScriptEngine;
use crate::x11::*;
use glinject_config::testing::ScriptFixture;
use libc::{c_char, c_int, c_long, c_void};
use std::cell::RefCell;
use std::collections::VecDeque;

pub const KEYCODE_A: u32 = 38;
pub const KEYCODE_F12: u32 = 96;

/// Returned by the fake `glXGetProcAddress` for every name.
pub const FAKE_PROC: usize = 0x5eed_0000;

/// Returned by the fake event functions, so forwarding is observable.
pub const FAKE_EVENT_RESULT: c_int = 17;

thread_local! {
    static QUEUE: RefCell<VecDeque<XEvent>> = const { RefCell::new(VecDeque::new()) };
    static CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

pub fn record(call: impl Into<String>) {
    CALLS.with(|calls| calls.borrow_mut().push(call.into()));
}

pub fn take_calls() -> Vec<String> {
    CALLS.with(|calls| std::mem::take(&mut *calls.borrow_mut()))
}

pub fn push_event(event: XEvent) {
    QUEUE.with(|queue| queue.borrow_mut().push_back(event));
}

pub fn queued_events() -> Vec<XEvent> {
    QUEUE.with(|queue| queue.borrow().iter().copied().collect())
}

pub fn clear_events() {
    QUEUE.with(|queue| queue.borrow_mut().clear());
}

pub fn key_event(keycode: u32, state: u32) -> XEvent {
    XEvent::from(XKeyEvent {
        type_: KeyPress,
        serial: keycode as _,
        send_event: False,
        display: std::ptr::null_mut(),
        window: 0x40_0001,
        root: 0x100,
        subwindow: 0,
        time: 0,
        x: 10,
        y: 10,
        x_root: 10,
        y_root: 10,
        state,
        keycode,
        same_screen: True,
    })
}

pub fn configure_event() -> XEvent {
    XEvent::from(XConfigureEvent {
        type_: ConfigureNotify,
        serial: 1,
        send_event: False,
        display: std::ptr::null_mut(),
        event: 0x40_0001,
        window: 0x40_0001,
        x: 0,
        y: 0,
        width: 640,
        height: 480,
        border_width: 0,
        above: 0,
        override_redirect: False,
    })
}

// --- Fake libGL ---

unsafe extern "C" fn fake_get_proc_address(_name: *const u8) -> *mut c_void {
    record("glXGetProcAddress");
    FAKE_PROC as *mut c_void
}

unsafe extern "C" fn fake_swap_buffers(_display: *mut Display, _drawable: GLXDrawable) {
    record("glXSwapBuffers");
}

unsafe extern "C" fn fake_destroy_context(_display: *mut Display, _context: GLXContext) {
    record("glXDestroyContext");
}

unsafe extern "C" fn fake_destroy_drawable(_display: *mut Display, _drawable: XID) {
    record("glXDestroyDrawable");
}

// --- Fake libX11 ---

fn pop_front() -> Option<XEvent> {
    QUEUE.with(|queue| queue.borrow_mut().pop_front())
}

/// Remove and return the first queued event the predicate accepts.
unsafe fn take_matching(
    display: *mut Display,
    predicate: XIfEventPredicate,
    arg: XPointer,
) -> Option<XEvent> {
    let predicate = predicate?;
    let mut index = 0;
    loop {
        let mut candidate = QUEUE.with(|queue| queue.borrow().get(index).copied())?;
        if predicate(display, &mut candidate, arg) != False {
            return QUEUE.with(|queue| queue.borrow_mut().remove(index));
        }
        index += 1;
    }
}

unsafe extern "C" fn fake_next_event(_display: *mut Display, event: *mut XEvent) -> c_int {
    record("XNextEvent");
    if let Some(next) = pop_front() {
        *event = next;
    }
    FAKE_EVENT_RESULT
}

unsafe extern "C" fn fake_window_event(
    _display: *mut Display,
    _window: Window,
    _mask: c_long,
    event: *mut XEvent,
) -> c_int {
    record("XWindowEvent");
    if let Some(next) = pop_front() {
        *event = next;
    }
    FAKE_EVENT_RESULT
}

unsafe extern "C" fn fake_mask_event(
    _display: *mut Display,
    _mask: c_long,
    event: *mut XEvent,
) -> c_int {
    record("XMaskEvent");
    if let Some(next) = pop_front() {
        *event = next;
    }
    FAKE_EVENT_RESULT
}

unsafe extern "C" fn fake_if_event(
    display: *mut Display,
    event: *mut XEvent,
    predicate: XIfEventPredicate,
    arg: XPointer,
) -> c_int {
    record("XIfEvent");
    if let Some(next) = take_matching(display, predicate, arg) {
        *event = next;
    }
    FAKE_EVENT_RESULT
}

unsafe extern "C" fn fake_check_if_event(
    display: *mut Display,
    event: *mut XEvent,
    predicate: XIfEventPredicate,
    arg: XPointer,
) -> Bool {
    record("XCheckIfEvent");
    match take_matching(display, predicate, arg) {
        Some(next) => {
            *event = next;
            True
        }
        None => False,
    }
}

unsafe extern "C" fn fake_lookup_keysym(event: *mut XKeyEvent, _index: c_int) -> KeySym {
    (*event).keycode as KeySym
}

unsafe extern "C" fn fake_keysym_to_string(keysym: KeySym) -> *mut c_char {
    match keysym as u32 {
        KEYCODE_A => c"a".as_ptr() as *mut c_char,
        KEYCODE_F12 => c"F12".as_ptr() as *mut c_char,
        _ => std::ptr::null_mut(),
    }
}

/// Every real symbol bound to a fake.
pub fn fake_reals() -> RealSymbols {
    let resolved = RealSymbols::resolve_with(|symbol| match symbol {
        RealSymbol::GlXGetProcAddress | RealSymbol::GlXGetProcAddressArb => {
            fake_get_proc_address as *mut c_void
        }
        RealSymbol::GlXSwapBuffers => fake_swap_buffers as *mut c_void,
        RealSymbol::GlXDestroyContext => fake_destroy_context as *mut c_void,
        RealSymbol::GlXDestroyWindow
        | RealSymbol::GlXDestroyPixmap
        | RealSymbol::GlXDestroyGlxPixmap
        | RealSymbol::GlXDestroyPbuffer => fake_destroy_drawable as *mut c_void,
        RealSymbol::XNextEvent => fake_next_event as *mut c_void,
        RealSymbol::XWindowEvent => fake_window_event as *mut c_void,
        RealSymbol::XMaskEvent => fake_mask_event as *mut c_void,
        RealSymbol::XIfEvent => fake_if_event as *mut c_void,
        RealSymbol::XCheckIfEvent => fake_check_if_event as *mut c_void,
        RealSymbol::XLookupKeysym => fake_lookup_keysym as *mut c_void,
        RealSymbol::XKeysymToString => fake_keysym_to_string as *mut c_void,
    });
    resolved.expect("every fake is non-null")
}

/// Make `record(name)` available to scripts run by `engine`, appending to
/// the same call log as the fake GL and X11 functions.
pub fn register_record(engine: &ScriptEngine) {
    let record_fn = engine
        .lua
        .create_function(|_, call: String| {
            record(call);
            Ok(())
        })
        .expect("record function");
    engine.lua.globals().set("record", record_fn).expect("record global");
}

/// Context wired to the fakes, running `source` as its bootstrap script.
pub fn fake_context(source: &str) -> ShimContext {
    let fixture = ScriptFixture::new().expect("fixture");
    let script = fixture.write_script("boot.lua", source).expect("script");
    let config = fixture.config(&script);

    let engine = ScriptEngine::new(&config.package_root).expect("engine");
    register_record(&engine);
    engine.run_file(&config.bootstrap_script).expect("bootstrap script");

    take_calls();
    clear_events();
    ShimContext::new(config, fake_reals(), Dispatcher::new(engine))
}

/// Context wired to the fakes whose engine has not been installed yet.
pub fn pending_context() -> ShimContext {
    let fixture = ScriptFixture::new().expect("fixture");
    let script = fixture.missing_script();
    take_calls();
    clear_events();
    ShimContext::new(fixture.config(&script), fake_reals(), Dispatcher::pending())
}
