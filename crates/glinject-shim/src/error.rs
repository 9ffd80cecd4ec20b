use glinject_config::ConfigError;
use std::path::PathBuf;

/// Errors that leave the shim without valid forwarding targets.
///
/// All of them are fatal: see `lifecycle::fatal`.
#[derive(Debug, thiserror::Error)]
pub enum ShimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("couldn't find a loaded object matching {patterns}")]
    ObjectNotFound { patterns: String },

    #[error("couldn't find {symbol} in {object}")]
    PrimitiveNotFound {
        symbol: &'static str,
        object: String,
    },

    #[error("couldn't open {library}: {reason}")]
    LibraryNotFound {
        library: &'static str,
        reason: String,
    },

    #[error("couldn't find {symbol} in {library}! dlsym returned a NULL pointer: {reason}")]
    SymbolNotFound {
        symbol: &'static str,
        library: &'static str,
        reason: String,
    },

    #[error("couldn't read bootstrap script {}: {source}", .path.display())]
    ScriptRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("couldn't run bootstrap script {}: {source}", .path.display())]
    ScriptLoad { path: PathBuf, source: mlua::Error },

    #[error("Lua initialization failed: {0}")]
    ScriptEngine(#[source] mlua::Error),

    #[error("{symbol} was called re-entrantly while the shim was initializing")]
    Reentrant { symbol: &'static str },
}

/// Script-contract violations. Logged and swallowed by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("{callback} is not a function!")]
    Missing { callback: &'static str },

    #[error("{callback} is not a function (it is a {got})")]
    NotCallable {
        callback: &'static str,
        got: &'static str,
    },

    #[error("error running {callback}: {source}")]
    Runtime {
        callback: &'static str,
        source: mlua::Error,
    },

    #[error("{callback} must return a boolean (got {got})")]
    NotBoolean {
        callback: &'static str,
        got: &'static str,
    },

    #[error("{callback} skipped: no scripting engine is running")]
    Unavailable { callback: &'static str },

    #[error("{callback} skipped: dispatch re-entered from a callback on the same thread")]
    Reentrant { callback: &'static str },
}

impl ScriptError {
    pub fn callback(&self) -> &'static str {
        match self {
            ScriptError::Missing { callback }
            | ScriptError::NotCallable { callback, .. }
            | ScriptError::Runtime { callback, .. }
            | ScriptError::NotBoolean { callback, .. }
            | ScriptError::Unavailable { callback }
            | ScriptError::Reentrant { callback } => *callback,
        }
    }
}
