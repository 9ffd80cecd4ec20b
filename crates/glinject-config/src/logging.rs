//! Structured logging utilities for the glinject shim.
//!
//! Provides component-tagged macros over `tracing` and the subscriber setup
//! used once the shim has read its config.
//!
//! # Usage
//!
//! ```ignore
//! use glinject_config::log_script_warn;
//!
//! log_script_warn!("Callback is not a function", callback = "handle_buffer_swap");
//! ```

use crate::{ShimConfig, DEFAULT_LOG_FILTER};

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const SHIM: &'static str = "SHIM";
    pub const RESOLVE: &'static str = "RESOLVE";
    pub const SCRIPT: &'static str = "SCRIPT";
}

// === SHIM logging macros ===

#[macro_export]
macro_rules! log_shim_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "SHIM", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_shim_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "SHIM", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_shim_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "SHIM", $($key = $value,)* $msg)
    };
}

// === RESOLVE logging macros ===

#[macro_export]
macro_rules! log_resolve_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "RESOLVE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_resolve_trace {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::trace!(component = "RESOLVE", $($key = $value,)* $msg)
    };
}

// === SCRIPT logging macros ===

#[macro_export]
macro_rules! log_script_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "SCRIPT", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_script_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "SCRIPT", $($key = $value,)* $msg)
    };
}

/// Install the global subscriber described by `config`.
///
/// Logs always go to stderr. When `config.log_file` is set every line is
/// also appended to that file, written synchronously on the calling thread.
/// Does nothing if the host process already installed a subscriber.
pub fn init_logging(config: &ShimConfig) {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let file_layer = config.log_file.as_ref().and_then(|path| {
        let dir = path.parent()?;
        let name = path.file_name()?.to_string_lossy().into_owned();
        match RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name)
            .build(dir)
        {
            Ok(appender) => Some(
                fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_target(false),
            ),
            Err(e) => {
                eprintln!("[glinject] couldn't open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .try_init();
}
