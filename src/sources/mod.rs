//! Local package registries.
//!
//! Both registries are plain directory trees checked out on disk, one
//! subdirectory per package. Nothing here touches the network.
//!
//! ```text
//! <bcr-root>/modules/<name>/metadata.json
//! <bcr-root>/modules/<name>/<version>/MODULE.bazel
//!
//! <vcpkg-root>/ports/<name>/vcpkg.json
//! <vcpkg-root>/versions/<first-letter>-/<name>.json
//! ```

pub mod bcr;
pub mod vcpkg;

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::{Dependency, DependencyInfo};
use crate::util::diagnostic::BackendError;

pub use bcr::BcrRegistry;
pub use vcpkg::VcpkgPorts;

/// Read access to a local package registry.
pub trait PackageRegistry {
    /// Display name used in messages, e.g. "Bazel Central Registry".
    fn display_name(&self) -> &'static str;

    /// Every package name, sorted.
    fn list_packages(&self) -> Result<Vec<String>>;

    fn contains(&self, name: &str) -> bool;

    /// Published versions, oldest first.
    fn versions(&self, name: &str) -> Result<Vec<String>>;

    fn info(&self, name: &str) -> Result<DependencyInfo>;

    /// The last entry of the version list.
    fn latest_version(&self, name: &str) -> Result<String> {
        self.versions(name)?
            .pop()
            .ok_or_else(|| BackendError::dependency_not_found(name, self.display_name()).into())
    }

    /// Case-insensitive substring match over package names.
    ///
    /// Metadata is loaded only for matching names; packages whose metadata
    /// fails to parse are skipped.
    fn search(&self, query: &str) -> Result<Vec<Dependency>> {
        let needle = query.to_lowercase();
        let mut found = Vec::new();

        for name in self.list_packages()? {
            if !name.to_lowercase().contains(&needle) {
                continue;
            }
            match self.info(&name) {
                Ok(info) => found.push(
                    Dependency::new(info.name, info.version).with_description(info.description),
                ),
                Err(e) => tracing::debug!("skipping {}: {:#}", name, e),
            }
        }

        Ok(found)
    }
}

/// Sorted names of the non-hidden subdirectories of `dir`.
fn subdirectory_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read registry at {}", dir.display()))?;

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if entry.path().is_dir() {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}
