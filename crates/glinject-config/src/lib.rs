//! # glinject-config
//!
//! Configuration for the glinject shim.
//!
//! Everything comes from the environment of the host process, since the shim
//! is loaded into programs it does not control:
//! 1. `GLINJECT_BOOTSTRAP_SCRIPT` (required)
//! 2. `GLINJECT_LOG` / `GLINJECT_LOG_FILE` (logging)
//! 3. `GLINJECT_PACKAGE_ROOT` (overrides the compiled-in package root)

pub mod logging;
pub mod testing;

use std::path::PathBuf;
use tracing::debug;

/// Path of the Lua bootstrap script.
pub const BOOTSTRAP_SCRIPT_VAR: &str = "GLINJECT_BOOTSTRAP_SCRIPT";
/// `EnvFilter` directive for the shim's own logging.
pub const LOG_FILTER_VAR: &str = "GLINJECT_LOG";
/// Optional file that receives a copy of every log line.
pub const LOG_FILE_VAR: &str = "GLINJECT_LOG_FILE";
/// Runtime override for the companion resource directory.
pub const PACKAGE_ROOT_VAR: &str = "GLINJECT_PACKAGE_ROOT";

/// Companion resource directory baked in at build time.
pub const DEFAULT_PACKAGE_ROOT: &str = match option_env!("GLINJECT_PACKAGE_ROOT") {
    Some(root) => root,
    None => "/usr/share/glinject",
};

/// Filter used when `GLINJECT_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no glinject bootstrap script specified: set {var} to the script path")]
    MissingBootstrapScript { var: &'static str },
    #[error("{var} must name a file, got {path:?}")]
    InvalidLogFile { var: &'static str, path: PathBuf },
}

/// Settings the shim reads once, on its first intercepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimConfig {
    /// Lua script executed when the engine is created
    pub bootstrap_script: PathBuf,
    /// Exposed to the script as `glxosdPackageRoot`
    pub package_root: String,
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
    /// Extra log destination besides stderr
    pub log_file: Option<PathBuf>,
}

impl ShimConfig {
    /// Load config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config through an arbitrary variable lookup.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let bootstrap_script = var(BOOTSTRAP_SCRIPT_VAR)
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingBootstrapScript {
                var: BOOTSTRAP_SCRIPT_VAR,
            })?;

        let package_root = var(PACKAGE_ROOT_VAR).unwrap_or_else(|| DEFAULT_PACKAGE_ROOT.to_string());
        let log_filter = var(LOG_FILTER_VAR).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let log_file = match var(LOG_FILE_VAR).map(PathBuf::from) {
            Some(path) if path.file_name().is_none() => {
                return Err(ConfigError::InvalidLogFile {
                    var: LOG_FILE_VAR,
                    path,
                })
            }
            other => other,
        };

        debug!(
            bootstrap_script = %bootstrap_script.display(),
            package_root = %package_root,
            "Loaded shim config"
        );

        Ok(Self {
            bootstrap_script,
            package_root,
            log_filter,
            log_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_bootstrap_script_is_an_error() {
        let err = ShimConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBootstrapScript { .. }));
        assert!(err.to_string().contains("bootstrap script"));
        assert!(err.to_string().contains(BOOTSTRAP_SCRIPT_VAR));
    }

    #[test]
    fn test_empty_bootstrap_script_is_an_error() {
        let err = ShimConfig::from_lookup(lookup(&[(BOOTSTRAP_SCRIPT_VAR, "")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBootstrapScript { .. }));
    }

    #[test]
    fn test_defaults() {
        let config =
            ShimConfig::from_lookup(lookup(&[(BOOTSTRAP_SCRIPT_VAR, "/opt/osd/boot.lua")])).unwrap();
        assert_eq!(config.bootstrap_script, PathBuf::from("/opt/osd/boot.lua"));
        assert_eq!(config.package_root, DEFAULT_PACKAGE_ROOT);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_overrides() {
        let config = ShimConfig::from_lookup(lookup(&[
            (BOOTSTRAP_SCRIPT_VAR, "/boot.lua"),
            (PACKAGE_ROOT_VAR, "/srv/osd"),
            (LOG_FILTER_VAR, "glinject=debug"),
            (LOG_FILE_VAR, "/tmp/glinject.log"),
        ]))
        .unwrap();
        assert_eq!(config.package_root, "/srv/osd");
        assert_eq!(config.log_filter, "glinject=debug");
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/glinject.log")));
    }

    #[test]
    fn test_log_file_must_name_a_file() {
        let err = ShimConfig::from_lookup(lookup(&[
            (BOOTSTRAP_SCRIPT_VAR, "/boot.lua"),
            (LOG_FILE_VAR, "/"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogFile { .. }));
    }
}
