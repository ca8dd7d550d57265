//! Bazel Central Registry mirror.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::manifest::ModuleFile;
use crate::core::DependencyInfo;
use crate::sources::{subdirectory_names, PackageRegistry};
use crate::util::diagnostic::BackendError;

const DISPLAY_NAME: &str = "Bazel Central Registry";

/// `modules/<name>/metadata.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleMetadata {
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub maintainers: Vec<Maintainer>,
    /// Oldest first.
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub yanked_versions: BTreeMap<String, String>,
}

impl ModuleMetadata {
    /// Newest version that has not been yanked.
    pub fn latest_usable(&self) -> Option<&str> {
        self.versions
            .iter()
            .rev()
            .find(|v| !self.yanked_versions.contains_key(*v))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Maintainer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub github: String,
}

impl fmt::Display for Maintainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() {
            &self.github
        } else {
            &self.name
        };
        if self.email.is_empty() {
            write!(f, "{}", name)
        } else {
            write!(f, "{} <{}>", name, self.email)
        }
    }
}

/// A checkout of the Bazel Central Registry.
#[derive(Debug, Clone)]
pub struct BcrRegistry {
    root: PathBuf,
}

impl BcrRegistry {
    /// Open the registry at `root`, failing with a remediation hint when unset.
    pub fn open(root: Option<&Path>) -> Result<Self> {
        let Some(root) = root else {
            return Err(BackendError::RegistryNotConfigured {
                registry: DISPLAY_NAME,
                command: "run `quay config set-bcr-root <path>` or set QUAY_BCR_ROOT".into(),
            }
            .into());
        };

        if !root.join("modules").is_dir() {
            return Err(BackendError::configuration(
                format!("no modules/ directory in BCR root {}", root.display()),
                "point bcr_root at a checkout of https://github.com/bazelbuild/bazel-central-registry",
            )
            .into());
        }

        Ok(BcrRegistry {
            root: root.to_path_buf(),
        })
    }

    fn module_dir(&self, name: &str) -> PathBuf {
        self.root.join("modules").join(name)
    }

    pub fn metadata(&self, name: &str) -> Result<ModuleMetadata> {
        let path = self.module_dir(name).join("metadata.json");
        if !path.is_file() {
            return Err(BackendError::dependency_not_found(name, DISPLAY_NAME).into());
        }

        let text = crate::util::fs::read_to_string(&path)?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Direct `bazel_dep` names of one published version.
    fn module_dependencies(&self, name: &str, version: &str) -> Vec<String> {
        let path = self.module_dir(name).join(version).join("MODULE.bazel");
        match std::fs::read_to_string(&path) {
            Ok(text) => ModuleFile::parse(text)
                .dependencies()
                .into_iter()
                .map(|d| d.name)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Why `version` of `name` was yanked, if it was.
    pub fn yank_reason(&self, name: &str, version: &str) -> Result<Option<String>> {
        Ok(self.metadata(name)?.yanked_versions.remove(version))
    }
}

impl PackageRegistry for BcrRegistry {
    fn display_name(&self) -> &'static str {
        DISPLAY_NAME
    }

    fn list_packages(&self) -> Result<Vec<String>> {
        subdirectory_names(&self.root.join("modules"))
    }

    fn contains(&self, name: &str) -> bool {
        self.module_dir(name).join("metadata.json").is_file()
    }

    fn versions(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.metadata(name)?.versions)
    }

    /// Newest version that has not been yanked.
    fn latest_version(&self, name: &str) -> Result<String> {
        self.metadata(name)?
            .latest_usable()
            .map(String::from)
            .ok_or_else(|| BackendError::dependency_not_found(name, DISPLAY_NAME).into())
    }

    fn info(&self, name: &str) -> Result<DependencyInfo> {
        let meta = self.metadata(name)?;
        let version = meta.latest_usable().unwrap_or_default().to_string();
        let dependencies = if version.is_empty() {
            Vec::new()
        } else {
            self.module_dependencies(name, &version)
        };

        Ok(DependencyInfo {
            name: name.to_string(),
            description: meta.homepage.clone(),
            homepage: meta.homepage,
            license: String::new(),
            maintainers: meta.maintainers.iter().map(ToString::to_string).collect(),
            version,
            dependencies,
        })
    }
}
