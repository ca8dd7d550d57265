//! Artifact normalization.
//!
//! Every backend lays out its outputs differently. After a successful build
//! the executables and libraries are copied into one canonical directory,
//! `<root>/.bin/native/<dir-label>/`, which is wiped first so nothing stale
//! survives from an earlier build.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

use crate::builder::context::BackendContext;
use crate::core::Profile;
use crate::util::diagnostic::BackendError;
use crate::util::fs::{is_executable, make_writable, recreate_dir};
use crate::util::process::OutputMode;
use crate::util::shell::Status;

/// Build byproducts that are never artifacts, even when executable.
const INTERMEDIATE_EXTENSIONS: &[&str] = &[
    "o", "obj", "d", "params", "sh", "cppmap", "repo_mapping", "cmake", "ninja", "make", "txt",
    "json", "py", "log", "manifest",
];

/// Directories the scan never descends into.
const SKIPPED_DIRS: &[&str] = &[
    "CMakeFiles",
    "_deps",
    "vcpkg_installed",
    "Testing",
    "meson-info",
    "meson-logs",
    "meson-private",
    "subprojects",
    "external",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Executable,
    StaticLibrary,
    SharedLibrary,
}

/// Decide whether a file is a build artifact worth keeping.
pub fn classify(path: &Path) -> Option<ArtifactKind> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') || name.contains("runfiles") {
        return None;
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("a" | "lib") => return Some(ArtifactKind::StaticLibrary),
        Some("so" | "dylib" | "dll") => return Some(ArtifactKind::SharedLibrary),
        Some(ext) if INTERMEDIATE_EXTENSIONS.contains(&ext) => return None,
        _ => {}
    }

    // libfoo.so.1.2
    if name.contains(".so.") {
        return Some(ArtifactKind::SharedLibrary);
    }

    is_executable(path).then_some(ArtifactKind::Executable)
}

fn skip_dir(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name) || name.ends_with(".p") || name.contains("runfiles")
}

/// Artifacts under `root`, at most `max_depth` levels down. Symlinks are followed.
pub fn collect(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !skip_dir(&entry.file_name().to_string_lossy())
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| classify(path).is_some())
        .collect();

    found.sort();
    found
}

/// Copy `sources` into the canonical directory for `profile`.
///
/// The directory is recreated first. A file that fails to copy or sign is
/// reported and skipped. Returns the copied paths.
pub fn normalize(
    ctx: &BackendContext,
    profile: &Profile,
    sources: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    let dest_dir = ctx.artifact_dir(profile);
    let copied = copy_into(ctx, &dest_dir, sources)?;

    if cfg!(target_os = "macos") {
        for dest in &copied {
            if classify(dest) == Some(ArtifactKind::Executable) {
                ad_hoc_sign(ctx, dest);
            }
        }
    }

    ctx.shell.status(
        Status::Copied,
        format!(
            "{} artifact(s) to {}",
            copied.len(),
            ctx.display_path(&dest_dir).display()
        ),
    );
    Ok(copied)
}

/// Recreate `dest_dir` and copy `sources` into it, first file name wins.
pub fn copy_into(
    ctx: &BackendContext,
    dest_dir: &Path,
    sources: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    recreate_dir(dest_dir)?;

    let mut seen = HashSet::new();
    let mut copied = Vec::new();

    for source in sources {
        let Some(name) = source.file_name() else {
            continue;
        };
        if !seen.insert(name.to_os_string()) {
            tracing::debug!("skipping duplicate artifact {}", source.display());
            continue;
        }

        let dest = dest_dir.join(name);
        if let Err(e) = std::fs::copy(source, &dest) {
            tracing::warn!("failed to copy {}: {}", source.display(), e);
            ctx.shell
                .warn(format!("could not copy {}: {}", source.display(), e));
            continue;
        }
        if let Err(e) = make_writable(&dest) {
            tracing::warn!("failed to make {} writable: {}", dest.display(), e);
        }
        copied.push(dest);
    }

    copied.sort();
    Ok(copied)
}

fn ad_hoc_sign(ctx: &BackendContext, path: &Path) {
    let cmd = ctx
        .command("codesign")
        .args(["-s", "-", "--force"])
        .arg(path);

    match ctx.run(&cmd, OutputMode::Capture) {
        Ok(output) if output.success() => {}
        Ok(output) => {
            tracing::warn!("codesign failed for {}: {}", path.display(), output.stderr.trim());
            ctx.shell.warn(format!("could not sign {}", path.display()));
        }
        Err(e) => {
            tracing::warn!("codesign failed for {}: {}", path.display(), e);
            ctx.shell.warn(format!("could not sign {}", path.display()));
        }
    }
}

/// Test and benchmark binaries are never picked implicitly by `run`.
pub fn is_test_or_bench(name: &str) -> bool {
    let stem = name.strip_suffix(".exe").unwrap_or(name);
    ["_test", "_tests", "_bench", "_benchmark"]
        .iter()
        .any(|suffix| stem.ends_with(suffix))
        || stem.starts_with("test_")
}

/// Executables directly inside `dir`, sorted.
pub fn executables_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| classify(path) == Some(ArtifactKind::Executable))
        .collect();
    found.sort();
    found
}

/// Executables in `dir` that `run` may choose without being told.
pub fn runnable_candidates(dir: &Path) -> Vec<PathBuf> {
    executables_in(dir)
        .into_iter()
        .filter(|path| !is_test_or_bench(&file_name(path)))
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Pick the program to run from `dir`.
///
/// An explicit target must exist; otherwise exactly one candidate must.
pub fn resolve_executable(dir: &Path, target: Option<&str>) -> Result<PathBuf> {
    if let Some(target) = target {
        let exe = format!("{}{}", target, std::env::consts::EXE_SUFFIX);
        let path = dir.join(&exe);
        if path.is_file() {
            return Ok(path);
        }
        return Err(BackendError::TargetNotFound {
            message: format!("target `{}` not found in {}", target, dir.display()),
            candidates: executables_in(dir).iter().map(|p| file_name(p)).collect(),
        }
        .into());
    }

    pick_single(runnable_candidates(dir), dir)
}

/// Exactly one candidate, or `TargetNotFound` naming what was found.
pub fn pick_single(mut candidates: Vec<PathBuf>, searched: &Path) -> Result<PathBuf> {
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(BackendError::TargetNotFound {
            message: format!("no executable found in {}", searched.display()),
            candidates: Vec::new(),
        }
        .into()),
        _ => Err(BackendError::TargetNotFound {
            message: format!("more than one executable in {}", searched.display()),
            candidates: candidates.iter().map(|p| file_name(p)).collect(),
        }
        .into()),
    }
}
