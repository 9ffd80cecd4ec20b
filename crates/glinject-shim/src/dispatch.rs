//! Serialized delivery of native events to the script.
//!
//! Every callback runs while holding the dispatcher's single lock, so scripts
//! never observe two callbacks at once even when the host renders or polls
//! events from several threads.

use crate::error::ScriptError;
use crate::script::{Callback, Modifiers, ScriptEngine};
use glinject_config::{log_script_debug, log_script_warn};
use libc::c_void;
use std::cell::Cell;
use std::sync::{Mutex, PoisonError};

/// A windowing event the script may filter or observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    KeyPress {
        key: Option<String>,
        modifiers: Modifiers,
    },
    ConfigureNotify {
        modifiers: Modifiers,
    },
}

/// A GLX occurrence the script is told about.
#[derive(Debug, Clone, Copy)]
pub enum Notification {
    BufferSwap { display: *mut c_void, drawable: u64 },
    ContextDestruction { display: *mut c_void, drawable: u64 },
}

impl Notification {
    fn callback(&self) -> Callback {
        match self {
            Notification::BufferSwap { .. } => Callback::HandleBufferSwap,
            Notification::ContextDestruction { .. } => Callback::HandleContextDestruction,
        }
    }
}

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside a callback.
///
/// A callback that ends up back in the dispatcher (a script calling an
/// intercepted function through ffi) would otherwise deadlock on the lock.
pub(crate) struct DispatchGuard(());

impl DispatchGuard {
    pub(crate) fn enter() -> Option<Self> {
        DISPATCHING.with(|flag| {
            if flag.replace(true) {
                None
            } else {
                Some(DispatchGuard(()))
            }
        })
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|flag| flag.set(false));
    }
}

fn dispatching() -> bool {
    DISPATCHING.try_with(Cell::get).unwrap_or(false)
}

enum EngineSlot {
    /// Not installed yet; the bootstrap script may still be running.
    Pending,
    Running(ScriptEngine),
    Closed,
}

pub struct Dispatcher {
    engine: Mutex<EngineSlot>,
}

impl Dispatcher {
    pub fn new(engine: ScriptEngine) -> Self {
        Self {
            engine: Mutex::new(EngineSlot::Running(engine)),
        }
    }

    /// A dispatcher whose engine arrives later through `install`.
    pub fn pending() -> Self {
        Self {
            engine: Mutex::new(EngineSlot::Pending),
        }
    }

    /// Start dispatching to `engine`. Refused once the dispatcher was shut down.
    pub fn install(&self, engine: ScriptEngine) -> bool {
        let mut slot = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        match *slot {
            EngineSlot::Closed => false,
            _ => {
                *slot = EngineSlot::Running(engine);
                true
            }
        }
    }

    /// Run `f` on the engine under the dispatch lock.
    pub(crate) fn with_engine<R>(
        &self,
        callback: Callback,
        f: impl FnOnce(&ScriptEngine) -> Result<R, ScriptError>,
    ) -> Result<R, ScriptError> {
        let Some(_guard) = DispatchGuard::enter() else {
            return Err(ScriptError::Reentrant {
                callback: callback.name(),
            });
        };
        // A panic inside a callback leaves the engine usable; keep dispatching.
        let slot = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            EngineSlot::Running(engine) => f(engine),
            EngineSlot::Pending | EngineSlot::Closed => Err(ScriptError::Unavailable {
                callback: callback.name(),
            }),
        }
    }

    /// Ask the script whether `event` should be withheld from the application.
    ///
    /// Any script failure counts as "no".
    pub fn should_consume(&self, event: &WindowEvent) -> bool {
        let result = match event {
            WindowEvent::KeyPress { key, modifiers } => {
                self.with_engine(Callback::ShouldConsumeKeyPress, |engine| {
                    engine.should_consume_key_press(key.as_deref(), *modifiers)
                })
            }
            WindowEvent::ConfigureNotify { modifiers } => {
                self.with_engine(Callback::ShouldConsumeConfigureNotify, |engine| {
                    engine.should_consume_configure_notify(*modifiers)
                })
            }
        };
        result.unwrap_or_else(|err| {
            report(&err);
            false
        })
    }

    /// Tell the script an event was retrieved.
    pub fn on_window_event(&self, event: &WindowEvent) {
        let result = match event {
            WindowEvent::KeyPress { key, modifiers } => {
                self.with_engine(Callback::KeyPress, |engine| {
                    engine.key_press_event(key.as_deref(), *modifiers)
                })
            }
            WindowEvent::ConfigureNotify { .. } => self
                .with_engine(Callback::ConfigureNotify, ScriptEngine::configure_notify_event),
        };
        if let Err(err) = result {
            report(&err);
        }
    }

    pub fn notify(&self, notification: Notification) {
        let result = self.with_engine(notification.callback(), |engine| match notification {
            Notification::BufferSwap { display, drawable } => {
                engine.handle_buffer_swap(display, drawable)
            }
            Notification::ContextDestruction { display, drawable } => {
                engine.handle_context_destruction(display, drawable)
            }
        });
        if let Err(err) = result {
            report(&err);
        }
    }

    /// Destroy the engine. Returns `false` if it was already gone, or if
    /// called from inside a callback, where the lock is held by this thread.
    pub fn shutdown(&self) -> bool {
        if dispatching() {
            log_script_warn!("Teardown requested from inside a callback, engine left running");
            return false;
        }
        let mut slot = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        let was_running = matches!(
            std::mem::replace(&mut *slot, EngineSlot::Closed),
            EngineSlot::Running(_)
        );
        if was_running {
            log_script_debug!("Script engine destroyed");
        }
        was_running
    }
}

fn report(err: &ScriptError) {
    log_script_warn!(
        "Script callback failed",
        callback = err.callback(),
        error = tracing::field::display(err)
    );
}
