//! On-disk fixtures: registry mirrors and small projects.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::BackendKind;

/// Write `modules/<name>/metadata.json` into a BCR mirror, plus one directory
/// per version.
pub fn write_bcr_module(root: &Path, name: &str, versions: &[&str], homepage: &str) {
    let module = root.join("modules").join(name);
    std::fs::create_dir_all(&module).expect("failed to create module dir");

    let metadata = serde_json::json!({
        "homepage": homepage,
        "maintainers": [{ "name": "Test Maintainer", "email": "test@example.com" }],
        "versions": versions,
        "yanked_versions": {},
    });
    std::fs::write(
        module.join("metadata.json"),
        serde_json::to_string_pretty(&metadata).expect("metadata serializes"),
    )
    .expect("failed to write metadata.json");

    for version in versions {
        std::fs::create_dir_all(module.join(version)).expect("failed to create version dir");
    }
}

/// Write `ports/<name>/vcpkg.json` into a vcpkg root.
pub fn write_vcpkg_port(root: &Path, name: &str, manifest: &str) {
    let port = root.join("ports").join(name);
    std::fs::create_dir_all(&port).expect("failed to create port dir");
    std::fs::write(port.join("vcpkg.json"), manifest).expect("failed to write port manifest");
}

/// Write `subprojects/<name>.wrap`.
pub fn write_wrap(project: &Path, name: &str, directory: &str, wrapdb_version: &str) -> PathBuf {
    let subprojects = project.join("subprojects");
    std::fs::create_dir_all(&subprojects).expect("failed to create subprojects");
    let path = subprojects.join(format!("{}.wrap", name));
    std::fs::write(
        &path,
        format!(
            "[wrap-file]\ndirectory = {}\nsource_url = https://example.com/{}.tar.gz\nwrapdb_version = {}\n\n[provide]\n{} = {}_dep\n",
            directory, name, wrapdb_version, name, name
        ),
    )
    .expect("failed to write wrap");
    path
}

/// A temporary project containing just the backend's marker file.
pub fn project_with_marker(kind: BackendKind) -> TempDir {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let contents = match kind {
        BackendKind::Vcpkg => "{\n  \"name\": \"calc\",\n  \"version\": \"0.1.0\",\n  \"dependencies\": []\n}\n",
        BackendKind::Bazel => "module(name = \"calc\", version = \"0.1.0\")\n",
        BackendKind::Meson => "project('calc', 'cpp', version : '0.1.0')\n",
    };
    std::fs::write(tmp.path().join(kind.marker_file()), contents).expect("failed to write marker");
    tmp
}

/// Drop a fake executable at `path`, creating parent directories.
pub fn fake_binary(path: &Path) {
    std::fs::create_dir_all(path.parent().expect("path has a parent"))
        .expect("failed to create parent dir");
    std::fs::write(path, b"\x7fELF").expect("failed to write binary");
    crate::util::fs::set_executable(path).expect("failed to set executable bit");
}

/// Drop a fake static library at `path`.
pub fn fake_library(path: &Path) {
    std::fs::create_dir_all(path.parent().expect("path has a parent"))
        .expect("failed to create parent dir");
    std::fs::write(path, b"!<arch>\n").expect("failed to write library");
}
