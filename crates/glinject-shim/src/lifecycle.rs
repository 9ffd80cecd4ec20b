//! One-time initialization and teardown of the shim's process-wide state.
//!
//! Every intercepted entry point starts with `ensure_initialized()`. The
//! first caller reads the config and resolves the real symbols, publishes
//! them, then boots the script; concurrent callers on other threads block
//! until both steps are done. A call that re-enters while the symbols are
//! being resolved (the loader looking symbols up through our `dlsym`) gets
//! `None` instead of deadlocking. Once the symbols are published, the
//! bootstrap script can call any hook: it forwards without dispatching.

use crate::dispatch::Dispatcher;
use crate::error::ShimError;
use crate::events::ModifierTracker;
use crate::reals::{self, RealSymbols};
use crate::script::ScriptEngine;
use glinject_config::logging::init_logging;
use glinject_config::{log_shim_error, log_shim_info, ShimConfig};
use once_cell::sync::OnceCell;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitializationState {
    Uninitialized,
    Initializing,
    Ready,
}

thread_local! {
    // Addresses of the LazyContexts this thread is currently initializing.
    static INITIALIZING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

fn is_initializing(owner: usize) -> bool {
    INITIALIZING
        .try_with(|owners| owners.borrow().contains(&owner))
        .unwrap_or(false)
}

struct InitMarker {
    owner: usize,
}

impl InitMarker {
    fn set(owner: usize) -> Self {
        INITIALIZING.with(|owners| owners.borrow_mut().push(owner));
        Self { owner }
    }
}

impl Drop for InitMarker {
    fn drop(&mut self) {
        let owner = self.owner;
        let _ = INITIALIZING.try_with(|owners| owners.borrow_mut().retain(|&o| o != owner));
    }
}

/// A value built at most once, on first use, that tolerates re-entry from
/// its own initializer.
pub(crate) struct LazyContext<T> {
    cell: OnceCell<T>,
    started: AtomicBool,
}

impl<T> LazyContext<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            started: AtomicBool::new(false),
        }
    }

    /// The value, building it with `init` if nobody has yet.
    ///
    /// Returns `None` only when called from inside `init` on the same thread.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> Option<&T> {
        if let Some(value) = self.cell.get() {
            return Some(value);
        }
        let owner = self as *const Self as usize;
        if is_initializing(owner) {
            return None;
        }
        Some(self.cell.get_or_init(|| {
            let _marker = InitMarker::set(owner);
            self.started.store(true, Ordering::Release);
            init()
        }))
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub(crate) fn state(&self) -> InitializationState {
        if self.cell.get().is_some() {
            InitializationState::Ready
        } else if self.started.load(Ordering::Acquire) {
            InitializationState::Initializing
        } else {
            InitializationState::Uninitialized
        }
    }
}

impl<T> Default for LazyContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the hooks need, built once per process.
pub struct ShimContext {
    pub config: ShimConfig,
    pub dispatcher: Dispatcher,
    reals: RealSymbols,
    modifiers: ModifierTracker,
}

impl ShimContext {
    pub fn new(config: ShimConfig, reals: RealSymbols, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher,
            reals,
            modifiers: ModifierTracker::default(),
        }
    }

    /// Config, logging and symbol resolution. The dispatcher starts without
    /// an engine; see `start_engine`.
    pub fn prepare() -> Result<Self, ShimError> {
        let config = ShimConfig::from_env()?;
        init_logging(&config);

        let primitives = reals::bootstrap_primitives()?;
        let reals = RealSymbols::resolve(primitives)?;
        Ok(Self::new(config, reals, Dispatcher::pending()))
    }

    /// Run the bootstrap script and hand the engine to the dispatcher.
    pub fn start_engine(&self) -> Result<(), ShimError> {
        let engine = ScriptEngine::from_config(&self.config)?;
        if self.dispatcher.install(engine) {
            log_shim_info!(
                "glinject initialized",
                script = tracing::field::display(self.config.bootstrap_script.display()),
                package_root = self.config.package_root.as_str()
            );
        }
        Ok(())
    }

    pub fn reals(&self) -> &RealSymbols {
        &self.reals
    }

    pub fn modifiers(&self) -> &ModifierTracker {
        &self.modifiers
    }
}

/// The context, published in two steps: resolved symbols first, then the
/// running script engine.
pub(crate) struct ShimState {
    context: LazyContext<ShimContext>,
    engine: LazyContext<()>,
}

impl ShimState {
    pub(crate) const fn new() -> Self {
        Self {
            context: LazyContext::new(),
            engine: LazyContext::new(),
        }
    }

    /// `None` only while `prepare` is running on this thread. Re-entry from
    /// `start_engine` gets the context, whose dispatcher has no engine yet.
    pub(crate) fn get_or_init(
        &self,
        prepare: impl FnOnce() -> ShimContext,
        start_engine: impl FnOnce(&ShimContext),
    ) -> Option<&ShimContext> {
        let context = self.context.get_or_init(prepare)?;
        let _ = self.engine.get_or_init(|| start_engine(context));
        Some(context)
    }

    pub(crate) fn get(&self) -> Option<&ShimContext> {
        self.context.get()
    }

    pub(crate) fn state(&self) -> InitializationState {
        match (self.context.state(), self.engine.state()) {
            (_, InitializationState::Ready) => InitializationState::Ready,
            (InitializationState::Uninitialized, _) => InitializationState::Uninitialized,
            _ => InitializationState::Initializing,
        }
    }
}

static SHIM: ShimState = ShimState::new();

/// The process-wide context; initializes on first call and exits the
/// process if that fails.
pub fn ensure_initialized() -> Option<&'static ShimContext> {
    SHIM.get_or_init(
        || ShimContext::prepare().unwrap_or_else(|err| fatal(&err)),
        |context| context.start_engine().unwrap_or_else(|err| fatal(&err)),
    )
}

pub(crate) fn state() -> InitializationState {
    SHIM.state()
}

/// Destroy the script engine. Later calls do nothing; hooks keep forwarding.
pub fn teardown() {
    if state() != InitializationState::Ready {
        // An exit from inside the bootstrap script leaves nothing to release
        return;
    }
    if let Some(context) = SHIM.get() {
        if context.dispatcher.shutdown() {
            log_shim_info!("glinject torn down");
        }
    }
}

/// Report an unrecoverable error and exit with status 1.
pub fn fatal(err: &ShimError) -> ! {
    log_shim_error!("Fatal error", error = tracing::field::display(err));
    eprintln!("[glinject] {}", err);
    std::process::exit(1)
}
