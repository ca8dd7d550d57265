//! vcpkg ports tree.
//!
//! Port metadata is read straight from the checkout instead of parsing
//! `vcpkg search` output:
//!
//! ```text
//! <vcpkg-root>/
//! ├── ports/<port>/
//! │   ├── vcpkg.json        # Port manifest
//! │   └── usage             # CMake usage hints
//! └── versions/<c>-/<port>.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::core::DependencyInfo;
use crate::sources::{subdirectory_names, PackageRegistry};
use crate::util::diagnostic::BackendError;

const DISPLAY_NAME: &str = "vcpkg ports";

/// A port's `vcpkg.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(rename = "version-semver", default)]
    version_semver: Option<String>,
    #[serde(rename = "version-date", default)]
    version_date: Option<String>,
    #[serde(rename = "version-string", default)]
    version_string: Option<String>,
    #[serde(rename = "port-version", default)]
    pub port_version: u32,
    /// A string or an array of lines.
    #[serde(default)]
    description: Value,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub license: Option<String>,
    /// A string or an array of strings.
    #[serde(default)]
    maintainers: Value,
    #[serde(default)]
    dependencies: Vec<Value>,
}

impl PortManifest {
    /// Version from whichever version field the port uses.
    pub fn version(&self) -> &str {
        self.version
            .as_deref()
            .or(self.version_semver.as_deref())
            .or(self.version_date.as_deref())
            .or(self.version_string.as_deref())
            .unwrap_or_default()
    }

    /// Version plus `#<port-version>` when the port has been revised.
    pub fn full_version(&self) -> String {
        with_port_version(self.version(), self.port_version)
    }

    pub fn description(&self) -> String {
        string_lines(&self.description).join("\n")
    }

    pub fn maintainers(&self) -> Vec<String> {
        string_lines(&self.maintainers)
    }

    /// Dependency names. Host-only tool ports such as `vcpkg-cmake` are kept.
    pub fn dependency_names(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .filter_map(|dep| match dep {
                Value::String(name) => Some(name.clone()),
                Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(String::from),
                _ => None,
            })
            .collect()
    }
}

/// `versions/<c>-/<port>.json`, newest first on disk.
#[derive(Debug, Deserialize)]
struct VersionDb {
    #[serde(default)]
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    #[serde(default)]
    version: Option<String>,
    #[serde(rename = "version-semver", default)]
    version_semver: Option<String>,
    #[serde(rename = "version-date", default)]
    version_date: Option<String>,
    #[serde(rename = "version-string", default)]
    version_string: Option<String>,
    #[serde(rename = "port-version", default)]
    port_version: u32,
}

impl VersionEntry {
    fn display(&self) -> Option<String> {
        let base = self
            .version
            .as_deref()
            .or(self.version_semver.as_deref())
            .or(self.version_date.as_deref())
            .or(self.version_string.as_deref())?;
        Some(with_port_version(base, self.port_version))
    }
}

/// `10.2.1` with port-version 1 is `10.2.1#1`, the spelling vcpkg uses.
fn with_port_version(version: &str, port_version: u32) -> String {
    if port_version > 0 && !version.is_empty() {
        format!("{}#{}", version, port_version)
    } else {
        version.to_string()
    }
}

fn string_lines(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(lines) => lines
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// A vcpkg checkout's ports tree.
#[derive(Debug, Clone)]
pub struct VcpkgPorts {
    root: PathBuf,
}

impl VcpkgPorts {
    pub fn open(root: Option<&Path>) -> Result<Self> {
        let Some(root) = root else {
            return Err(BackendError::RegistryNotConfigured {
                registry: "vcpkg root",
                command: "run `quay config set-vcpkg-root <path>` or set VCPKG_ROOT".into(),
            }
            .into());
        };

        if !root.join("ports").is_dir() {
            return Err(BackendError::configuration(
                format!("no ports/ directory in vcpkg root {}", root.display()),
                "point vcpkg_root at a clone of https://github.com/microsoft/vcpkg",
            )
            .into());
        }

        Ok(VcpkgPorts {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn port_dir(&self, name: &str) -> PathBuf {
        self.root.join("ports").join(name)
    }

    pub fn port_manifest(&self, name: &str) -> Result<PortManifest> {
        let path = self.port_dir(name).join("vcpkg.json");
        if !path.is_file() {
            return Err(BackendError::dependency_not_found(name, DISPLAY_NAME).into());
        }

        let text = crate::util::fs::read_to_string(&path)?;
        serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// The port's `usage` file, if it ships one.
    pub fn usage(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.port_dir(name).join("usage")).ok()
    }

    fn version_db_path(&self, name: &str) -> Option<PathBuf> {
        let first = name.chars().next()?;
        Some(
            self.root
                .join("versions")
                .join(format!("{}-", first))
                .join(format!("{}.json", name)),
        )
    }
}

impl PackageRegistry for VcpkgPorts {
    fn display_name(&self) -> &'static str {
        DISPLAY_NAME
    }

    fn list_packages(&self) -> Result<Vec<String>> {
        subdirectory_names(&self.root.join("ports"))
    }

    fn contains(&self, name: &str) -> bool {
        self.port_dir(name).join("vcpkg.json").is_file()
    }

    fn versions(&self, name: &str) -> Result<Vec<String>> {
        let manifest = self.port_manifest(name)?;

        if let Some(path) = self.version_db_path(name).filter(|p| p.is_file()) {
            let text = crate::util::fs::read_to_string(&path)?;
            let db: VersionDb = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            let mut versions: Vec<String> =
                db.versions.iter().filter_map(VersionEntry::display).collect();
            versions.reverse();
            return Ok(versions);
        }

        let version = manifest.full_version();
        if version.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![version])
        }
    }

    fn info(&self, name: &str) -> Result<DependencyInfo> {
        let manifest = self.port_manifest(name)?;
        Ok(DependencyInfo {
            name: name.to_string(),
            version: manifest.full_version(),
            description: manifest.description(),
            homepage: manifest.homepage.clone(),
            license: manifest.license.clone().unwrap_or_default(),
            maintainers: manifest.maintainers(),
            dependencies: manifest.dependency_names(),
        })
    }
}
