//! Xlib event decoding.

use crate::dispatch::WindowEvent;
use crate::reals::RealSymbols;
use crate::script::Modifiers;
use crate::x11::{self, XEvent, XKeyEvent};
use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Modifier state of the most recent key press seen by the shim.
///
/// `ConfigureNotify` carries no modifier state of its own.
#[derive(Debug, Default)]
pub struct ModifierTracker(AtomicU32);

impl ModifierTracker {
    pub fn record(&self, state: u32) {
        self.0.store(state, Ordering::Relaxed);
    }

    pub fn current(&self) -> Modifiers {
        Modifiers::from_state(self.0.load(Ordering::Relaxed))
    }
}

/// The script's view of `event`, or `None` for kinds it never sees.
pub unsafe fn translate(
    reals: &RealSymbols,
    modifiers: &ModifierTracker,
    event: &XEvent,
) -> Option<WindowEvent> {
    match event.kind() {
        x11::KeyPress => {
            let key = event.key;
            modifiers.record(key.state);
            Some(WindowEvent::KeyPress {
                key: key_name(reals, &key),
                modifiers: Modifiers::from_state(key.state),
            })
        }
        x11::ConfigureNotify => Some(WindowEvent::ConfigureNotify {
            modifiers: modifiers.current(),
        }),
        _ => None,
    }
}

/// Unshifted keysym name (`XLookupKeysym` index 0), e.g. `"F12"`.
unsafe fn key_name(reals: &RealSymbols, key: &XKeyEvent) -> Option<String> {
    // XLookupKeysym takes a mutable pointer; never hand it the caller's event.
    let mut copy = *key;
    let keysym = (reals.x_lookup_keysym())(&mut copy, 0);
    let name = (reals.x_keysym_to_string())(keysym);
    if name.is_null() {
        None
    } else {
        Some(CStr::from_ptr(name).to_string_lossy().into_owned())
    }
}
