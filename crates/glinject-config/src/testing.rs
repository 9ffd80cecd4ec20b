//! Isolated bootstrap-script fixtures for tests.
//!
//! Provides `ScriptFixture` to manage:
//! - A temporary package root
//! - Bootstrap scripts written into it
//! - A `ShimConfig` pointing at them
//!
//! # Usage
//!
//! ```ignore
//! use glinject_config::testing::ScriptFixture;
//!
//! let fixture = ScriptFixture::new()?;
//! let script = fixture.write_script("boot.lua", "function handle_buffer_swap() end")?;
//! let config = fixture.config(&script);
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{ShimConfig, DEFAULT_LOG_FILTER};

/// Atomic counter for unique fixture IDs
static FIXTURE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Temporary package root holding bootstrap scripts
pub struct ScriptFixture {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Directory handed to scripts as their package root
    pub package_root: PathBuf,
    /// Unique fixture ID
    pub fixture_id: u32,
}

impl ScriptFixture {
    /// Create a new isolated package root
    pub fn new() -> anyhow::Result<Self> {
        let fixture_id = FIXTURE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let package_root = temp_dir.path().join(format!("glinject-{}", fixture_id));
        std::fs::create_dir_all(&package_root)?;

        Ok(Self {
            _temp_dir: temp_dir,
            package_root,
            fixture_id,
        })
    }

    /// Write a Lua script relative to the package root
    pub fn write_script(&self, relative_path: &str, source: &str) -> anyhow::Result<PathBuf> {
        let path = self.package_root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, source)?;
        Ok(path)
    }

    /// Path of a script that was never written
    pub fn missing_script(&self) -> PathBuf {
        self.package_root.join("does-not-exist.lua")
    }

    /// Config that boots `script` with this fixture as package root
    pub fn config(&self, script: &Path) -> ShimConfig {
        ShimConfig {
            bootstrap_script: script.to_path_buf(),
            package_root: self.package_root.to_string_lossy().into_owned(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_file: None,
        }
    }
}

impl Default for ScriptFixture {
    fn default() -> Self {
        Self::new().expect("Failed to create script fixture")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_package_root() {
        let fixture = ScriptFixture::new().unwrap();
        assert!(fixture.package_root.is_dir());
    }

    #[test]
    fn test_fixtures_are_isolated() {
        let a = ScriptFixture::new().unwrap();
        let b = ScriptFixture::new().unwrap();
        assert_ne!(a.package_root, b.package_root);
        assert_ne!(a.fixture_id, b.fixture_id);
    }

    #[test]
    fn test_write_script() {
        let fixture = ScriptFixture::new().unwrap();
        let path = fixture.write_script("lib/boot.lua", "return 1").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "return 1");
        assert!(!fixture.missing_script().exists());
    }

    #[test]
    fn test_config_points_at_fixture() {
        let fixture = ScriptFixture::new().unwrap();
        let path = fixture.write_script("boot.lua", "").unwrap();
        let config = fixture.config(&path);
        assert_eq!(config.bootstrap_script, path);
        assert_eq!(config.package_root, fixture.package_root.to_string_lossy());
    }
}
