//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - Isolated global and project config files
//! - A scratch directory for viewer output
//!
//! # Usage
//!
//! ```ignore
//! use crashgate_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new()?;
//! env.write_project_config("[controller]\nmode = \"dialog-url\"\n")?;
//! let config = env.load()?;
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{Config, ConfigError};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with its own config locations
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Stand-in for `~/.crashgate/config.toml`
    pub global_config: PathBuf,
    /// Stand-in for `.crashgate/config.toml`
    pub project_config: PathBuf,
    /// Scratch directory for payload files and viewer output
    pub scratch_dir: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let global_dir = root.join("home/.crashgate");
        let project_dir = root.join("project/.crashgate");
        let scratch_dir = root.join(format!("scratch-{}", test_id));

        std::fs::create_dir_all(&global_dir)?;
        std::fs::create_dir_all(&project_dir)?;
        std::fs::create_dir_all(&scratch_dir)?;

        Ok(Self {
            global_config: global_dir.join("config.toml"),
            project_config: project_dir.join("config.toml"),
            scratch_dir,
            _temp_dir: temp_dir,
            test_id,
        })
    }

    pub fn write_global_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        std::fs::write(&self.global_config, contents)?;
        Ok(self.global_config.clone())
    }

    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        std::fs::write(&self.project_config, contents)?;
        Ok(self.project_config.clone())
    }

    /// Load config through the same pipeline as `Config::load`, rooted here
    pub fn load(&self) -> Result<Config, ConfigError> {
        Config::load_with(Some(&self.global_config), &self.project_config)
    }

    /// Path for a file inside the scratch directory
    pub fn scratch_file(&self, name: &str) -> PathBuf {
        self.scratch_dir.join(name)
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
