//! `quay-ci.toml`: cross builds in containers or on the host.
//!
//! ```toml
//! output = ".bin/ci"
//!
//! [build]
//! type = "Release"
//! optimization = "2"
//! cmake_args = ["-DWITH_SIMD=OFF"]
//!
//! [[toolchains]]
//! name = "linux-arm64"
//! env = { CC = "clang", CXX = "clang++" }
//!
//! [toolchains.docker]
//! mode = "build"
//! platform = "linux/arm64"
//! build = { dockerfile = "ci/Dockerfile.arm64", args = { UBUNTU = "24.04" } }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::util::diagnostic::BackendError;
use crate::util::fs::read_to_string;

pub const CI_FILE: &str = "quay-ci.toml";

/// Default artifact root, relative to the project.
pub const DEFAULT_OUTPUT: &str = ".bin/ci";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CiConfig {
    /// Artifact root; each toolchain gets `<output>/<name>`.
    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub build: CiBuild,

    #[serde(default)]
    pub toolchains: Vec<CiToolchain>,
}

/// Settings shared by every toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CiBuild {
    /// CMake-style build type: `Debug` or `Release`.
    #[serde(default, rename = "type")]
    pub build_type: Option<String>,

    /// `-O` level without the dash, e.g. `2` or `s`.
    #[serde(default)]
    pub optimization: Option<String>,

    /// Zero leaves the choice to the build tool.
    #[serde(default)]
    pub jobs: usize,

    /// Extra CMake configure options.
    #[serde(default)]
    pub cmake_args: Vec<String>,

    /// Extra options for the build command of any backend.
    #[serde(default)]
    pub build_args: Vec<String>,

    /// Extra `meson setup` options.
    #[serde(default)]
    pub meson_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runner {
    #[default]
    Docker,
    Native,
}

/// One `[[toolchains]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CiToolchain {
    pub name: String,

    #[serde(default)]
    pub runner: Runner,

    #[serde(default = "default_true")]
    pub active: bool,

    /// Overrides `build.type`.
    #[serde(default)]
    pub build_type: Option<String>,

    /// Replace `build.cmake_args` when non-empty.
    #[serde(default)]
    pub cmake_options: Vec<String>,

    /// Replace `build.build_args` when non-empty.
    #[serde(default)]
    pub build_options: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub docker: Option<DockerConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DockerMode {
    /// Use `image` from a registry.
    #[default]
    Pull,
    /// Use `image` as already present in the local daemon.
    Local,
    /// Build an image from a Dockerfile, tagged by content.
    Build,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    Always,
    Never,
    #[default]
    IfNotPresent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub mode: DockerMode,

    #[serde(default)]
    pub image: Option<String>,

    /// `--platform` for pull, build and run, e.g. `linux/arm64`.
    #[serde(default)]
    pub platform: Option<String>,

    #[serde(default)]
    pub pull_policy: PullPolicy,

    #[serde(default)]
    pub build: Option<DockerBuild>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DockerBuild {
    pub dockerfile: PathBuf,

    /// Build context; the project root when unset.
    #[serde(default)]
    pub context: Option<PathBuf>,

    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl CiConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let config: CiConfig = toml::from_str(text).context("failed to parse quay-ci.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<root>/quay-ci.toml`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CI_FILE);
        if !path.is_file() {
            return Err(BackendError::configuration(
                format!("no {} in {}", CI_FILE, root.display()),
                "create quay-ci.toml with at least one [[toolchains]] entry, or use `quay build` for a local build",
            )
            .into());
        }
        Self::parse(&read_to_string(&path)?)
            .with_context(|| format!("invalid {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        let mut seen = Vec::new();
        for tc in &self.toolchains {
            if tc.name.is_empty()
                || !tc
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                || tc.name.starts_with('.')
            {
                return Err(invalid(format!(
                    "toolchain name `{}` must be letters, digits, `-`, `_` or `.`",
                    tc.name
                )));
            }
            if seen.contains(&tc.name.as_str()) {
                return Err(invalid(format!("toolchain `{}` is defined twice", tc.name)));
            }
            seen.push(tc.name.as_str());

            if tc.runner == Runner::Native {
                continue;
            }
            let Some(docker) = &tc.docker else {
                return Err(invalid(format!(
                    "toolchain `{}` runs in docker but has no [toolchains.docker] table",
                    tc.name
                )));
            };
            match docker.mode {
                DockerMode::Pull | DockerMode::Local if docker.image.is_none() => {
                    return Err(invalid(format!("toolchain `{}` needs docker.image", tc.name)));
                }
                DockerMode::Build if docker.build.is_none() => {
                    return Err(invalid(format!(
                        "toolchain `{}` uses mode = \"build\" without docker.build",
                        tc.name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `<root>/<output>`, `.bin/ci` unless configured.
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(self.output.as_deref().unwrap_or(Path::new(DEFAULT_OUTPUT)))
    }

    /// The toolchains a run covers: the named one, or every active one.
    ///
    /// Naming an inactive toolchain selects it anyway; the caller decides
    /// whether to warn.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&CiToolchain>> {
        if let Some(name) = name {
            return match self.toolchains.iter().find(|tc| tc.name == name) {
                Some(tc) => Ok(vec![tc]),
                None => Err(BackendError::TargetNotFound {
                    message: format!("toolchain `{}` not found in {}", name, CI_FILE),
                    candidates: self.toolchains.iter().map(|tc| tc.name.clone()).collect(),
                }
                .into()),
            };
        }

        let active: Vec<&CiToolchain> = self.toolchains.iter().filter(|tc| tc.active).collect();
        if active.is_empty() {
            return Err(BackendError::configuration(
                format!("no active toolchains in {}", CI_FILE),
                "add a [[toolchains]] entry or set `active = true` on one",
            )
            .into());
        }
        Ok(active)
    }

    /// Number of toolchains `select(None)` leaves out.
    pub fn inactive_count(&self) -> usize {
        self.toolchains.iter().filter(|tc| !tc.active).count()
    }
}

impl CiToolchain {
    /// `Debug` or `Release`: the toolchain's own, then `build.type`, then Release.
    pub fn build_type(&self, build: &CiBuild) -> String {
        let raw = self
            .build_type
            .as_deref()
            .or(build.build_type.as_deref())
            .unwrap_or("Release");
        if raw.eq_ignore_ascii_case("debug") {
            "Debug".to_string()
        } else {
            "Release".to_string()
        }
    }

    pub fn cmake_args<'a>(&'a self, build: &'a CiBuild) -> &'a [String] {
        if self.cmake_options.is_empty() {
            &build.cmake_args
        } else {
            &self.cmake_options
        }
    }

    pub fn build_args<'a>(&'a self, build: &'a CiBuild) -> &'a [String] {
        if self.build_options.is_empty() {
            &build.build_args
        } else {
            &self.build_options
        }
    }
}

fn invalid(message: String) -> anyhow::Error {
    BackendError::configuration(message, "see the [[toolchains]] entries in quay-ci.toml").into()
}
