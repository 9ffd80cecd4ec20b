//! Minimal Xlib / GLX FFI surface.
//!
//! Only the types, constants and function signatures the shim intercepts or
//! calls. Layouts follow `<X11/Xlib.h>` on LP64 targets.
#![allow(non_camel_case_types, non_upper_case_globals)]

use libc::{c_char, c_int, c_long, c_uint, c_ulong, c_void};

/// Opaque `Display`
pub enum Display {}

pub type XID = c_ulong;
pub type Window = XID;
pub type KeySym = XID;
pub type Time = c_ulong;
pub type Bool = c_int;
pub type XPointer = *mut c_char;

pub type GLXDrawable = XID;
pub type GLXWindow = XID;
pub type GLXPixmap = XID;
pub type GLXPbuffer = XID;
pub type GLXContext = *mut c_void;

pub const False: Bool = 0;
pub const True: Bool = 1;

pub const KeyPress: c_int = 2;
pub const ConfigureNotify: c_int = 22;

pub const ShiftMask: c_uint = 1 << 0;
pub const LockMask: c_uint = 1 << 1;
pub const ControlMask: c_uint = 1 << 2;
pub const Mod1Mask: c_uint = 1 << 3;

pub const KeyPressMask: c_long = 1 << 0;
pub const StructureNotifyMask: c_long = 1 << 17;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct XAnyEvent {
    pub type_: c_int,
    pub serial: c_ulong,
    pub send_event: Bool,
    pub display: *mut Display,
    pub window: Window,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct XKeyEvent {
    pub type_: c_int,
    pub serial: c_ulong,
    pub send_event: Bool,
    pub display: *mut Display,
    pub window: Window,
    pub root: Window,
    pub subwindow: Window,
    pub time: Time,
    pub x: c_int,
    pub y: c_int,
    pub x_root: c_int,
    pub y_root: c_int,
    pub state: c_uint,
    pub keycode: c_uint,
    pub same_screen: Bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct XConfigureEvent {
    pub type_: c_int,
    pub serial: c_ulong,
    pub send_event: Bool,
    pub display: *mut Display,
    pub event: Window,
    pub window: Window,
    pub x: c_int,
    pub y: c_int,
    pub width: c_int,
    pub height: c_int,
    pub border_width: c_int,
    pub above: Window,
    pub override_redirect: Bool,
}

/// `XEvent` union, padded to Xlib's 24 longs.
#[repr(C)]
#[derive(Clone, Copy)]
pub union XEvent {
    pub type_: c_int,
    pub any: XAnyEvent,
    pub key: XKeyEvent,
    pub configure: XConfigureEvent,
    pad: [c_long; 24],
}

impl XEvent {
    pub fn zeroed() -> Self {
        XEvent { pad: [0; 24] }
    }

    pub fn kind(&self) -> c_int {
        unsafe { self.type_ }
    }
}

impl From<XKeyEvent> for XEvent {
    fn from(key: XKeyEvent) -> Self {
        let mut event = XEvent::zeroed();
        event.key = key;
        event
    }
}

impl From<XConfigureEvent> for XEvent {
    fn from(configure: XConfigureEvent) -> Self {
        let mut event = XEvent::zeroed();
        event.configure = configure;
        event
    }
}

// --- Function signatures ---

pub type XIfEventPredicate =
    Option<unsafe extern "C" fn(display: *mut Display, event: *mut XEvent, arg: XPointer) -> Bool>;

pub type GlXGetProcAddressFn = unsafe extern "C" fn(name: *const u8) -> *mut c_void;
pub type GlXSwapBuffersFn = unsafe extern "C" fn(display: *mut Display, drawable: GLXDrawable);
pub type GlXDestroyContextFn = unsafe extern "C" fn(display: *mut Display, context: GLXContext);
pub type GlXDestroyDrawableFn = unsafe extern "C" fn(display: *mut Display, drawable: XID);

pub type XNextEventFn = unsafe extern "C" fn(display: *mut Display, event: *mut XEvent) -> c_int;
pub type XWindowEventFn = unsafe extern "C" fn(
    display: *mut Display,
    window: Window,
    mask: c_long,
    event: *mut XEvent,
) -> c_int;
pub type XMaskEventFn =
    unsafe extern "C" fn(display: *mut Display, mask: c_long, event: *mut XEvent) -> c_int;
pub type XIfEventFn = unsafe extern "C" fn(
    display: *mut Display,
    event: *mut XEvent,
    predicate: XIfEventPredicate,
    arg: XPointer,
) -> c_int;
pub type XCheckIfEventFn = unsafe extern "C" fn(
    display: *mut Display,
    event: *mut XEvent,
    predicate: XIfEventPredicate,
    arg: XPointer,
) -> Bool;

pub type XLookupKeysymFn = unsafe extern "C" fn(event: *mut XKeyEvent, index: c_int) -> KeySym;
pub type XKeysymToStringFn = unsafe extern "C" fn(keysym: KeySym) -> *mut c_char;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_union_matches_xlib_size() {
        assert_eq!(
            std::mem::size_of::<XEvent>(),
            24 * std::mem::size_of::<c_long>()
        );
    }

    #[test]
    fn test_kind_reads_shared_type_field() {
        let key = XKeyEvent {
            type_: KeyPress,
            serial: 7,
            send_event: False,
            display: std::ptr::null_mut(),
            window: 1,
            root: 1,
            subwindow: 0,
            time: 0,
            x: 0,
            y: 0,
            x_root: 0,
            y_root: 0,
            state: ShiftMask,
            keycode: 38,
            same_screen: True,
        };
        let event = XEvent::from(key);
        assert_eq!(event.kind(), KeyPress);
        assert_eq!(unsafe { event.any.serial }, 7);
    }
}
