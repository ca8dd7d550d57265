//! User-wide configuration.
//!
//! Stored as TOML at `~/.quay/config.toml`, or wherever `QUAY_CONFIG` points.
//! It only records where the local package registries live; project settings
//! belong to the project's own manifest.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "QUAY_CONFIG";

/// Environment variable naming a Bazel Central Registry checkout.
pub const BCR_ROOT_ENV: &str = "QUAY_BCR_ROOT";

/// Environment variable vcpkg itself uses for its root.
pub const VCPKG_ROOT_ENV: &str = "VCPKG_ROOT";

/// Global configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Root of a vcpkg checkout (contains `ports/` and `scripts/`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcpkg_root: Option<PathBuf>,

    /// Root of a Bazel Central Registry checkout (contains `modules/`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcr_root: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration, falling back to defaults if the file is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory: {}", parent.display())
            })?;
        }

        let contents =
            toml::to_string_pretty(self).with_context(|| "failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("failed to write config: {}", path.display()))
    }

    /// vcpkg root: config file, then `VCPKG_ROOT`, then the directory holding `vcpkg` on PATH.
    pub fn resolved_vcpkg_root(&self) -> Option<PathBuf> {
        if let Some(root) = &self.vcpkg_root {
            return Some(root.clone());
        }

        if let Some(root) = std::env::var_os(VCPKG_ROOT_ENV).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(root));
        }

        let exe = which::which("vcpkg").ok()?;
        let exe = exe.canonicalize().unwrap_or(exe);
        exe.parent()
            .filter(|dir| dir.join("ports").is_dir())
            .map(Path::to_path_buf)
    }

    /// BCR root: config file, then `QUAY_BCR_ROOT`.
    pub fn resolved_bcr_root(&self) -> Option<PathBuf> {
        if let Some(root) = &self.bcr_root {
            return Some(root.clone());
        }

        std::env::var_os(BCR_ROOT_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }
}

/// Location of the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }

    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// The global quay directory (`~/.quay`).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".quay"))
}
