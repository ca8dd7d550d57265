//! Project detection and identity.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

/// The three supported build backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// CMake driven through vcpkg manifest mode.
    Vcpkg,
    Bazel,
    Meson,
}

impl BackendKind {
    /// Detection order matters: a vcpkg project may also carry a meson.build.
    pub const ALL: [BackendKind; 3] = [BackendKind::Vcpkg, BackendKind::Bazel, BackendKind::Meson];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Vcpkg => "vcpkg",
            BackendKind::Bazel => "bazel",
            BackendKind::Meson => "meson",
        }
    }

    /// File whose presence marks a project as using this backend.
    pub fn marker_file(&self) -> &'static str {
        match self {
            BackendKind::Vcpkg => "vcpkg.json",
            BackendKind::Bazel => "MODULE.bazel",
            BackendKind::Meson => "meson.build",
        }
    }

    /// First backend whose marker file exists in `root`.
    pub fn detect(root: &Path) -> Option<BackendKind> {
        Self::ALL
            .into_iter()
            .find(|kind| root.join(kind.marker_file()).is_file())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vcpkg" | "cmake" => Ok(BackendKind::Vcpkg),
            "bazel" => Ok(BackendKind::Bazel),
            "meson" => Ok(BackendKind::Meson),
            _ => Err(format!(
                "unknown backend '{}'; expected vcpkg, bazel or meson",
                s
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn cmake_project_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)project\s*\(\s*([^\s\)]+)").expect("valid regex"))
}

fn meson_project_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"project\s*\(\s*['"]([^'"]+)['"]"#).expect("valid regex"))
}

/// Project name from the first `project(...)` call in a CMakeLists.txt.
pub fn cmake_project_name(cmakelists: &str) -> Option<String> {
    cmake_project_re()
        .captures(cmakelists)
        .map(|c| c[1].trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

/// Project name from the `project('name', ...)` call in a meson.build.
pub fn meson_project_name(meson_build: &str) -> Option<String> {
    meson_project_re()
        .captures(meson_build)
        .map(|c| c[1].to_string())
}
