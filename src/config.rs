//! Engine asset locations and the engine manifest (`argon2-engine.toml`)

use crate::error::{Argon2Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// File name of the manifest inside an asset directory
pub const MANIFEST_FILE: &str = "argon2-engine.toml";

/// Where the engine is loaded from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssetLocation {
    /// The engine compiled into this crate, with default settings
    #[default]
    Builtin,
    /// A directory holding an `argon2-engine.toml` manifest
    Dir(PathBuf),
}

impl AssetLocation {
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        AssetLocation::Dir(path.into())
    }
}

impl fmt::Display for AssetLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetLocation::Builtin => f.write_str("<builtin>"),
            AssetLocation::Dir(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Settings of a loaded engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Size of the linear memory region buffers are carved from
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: usize,

    /// Largest memory cost (KiB) a hash call may request
    #[serde(default = "default_max_mem_kib")]
    pub max_mem_kib: u32,
}

fn default_memory_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_max_mem_kib() -> u32 {
    4 * 1024 * 1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_bytes: default_memory_bytes(),
            max_mem_kib: default_max_mem_kib(),
        }
    }
}

impl EngineConfig {
    /// Parse a manifest
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Argon2Error::InvalidParameter(format!("Invalid engine manifest: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `<dir>/argon2-engine.toml`
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Argon2Error::Load(format!("Error loading {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory_bytes == 0 {
            return Err(Argon2Error::InvalidParameter(
                "memory_bytes must be greater than zero".to_string(),
            ));
        }
        if self.memory_bytes > u32::MAX as usize {
            return Err(Argon2Error::InvalidParameter(format!(
                "memory_bytes must fit in a 32-bit offset, got {}",
                self.memory_bytes
            )));
        }
        Ok(())
    }
}
