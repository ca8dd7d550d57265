//! The contract every build backend implements.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::builder::context::BackendContext;
use crate::builder::scaffold::ScaffoldFile;
use crate::core::{
    BackendKind, BenchOptions, BuildOptions, CleanOptions, Dependency, DependencyInfo, InitConfig,
    RunOptions, TestOptions,
};
use crate::util::diagnostic::BackendError;
use crate::util::process::{OutputMode, ProcessOutput};

/// Backend availability status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendAvailability {
    /// Tool found and new enough.
    Available { version: semver::Version },

    /// Tool not on PATH.
    NotInstalled {
        tool: String,
        /// e.g. "apt install meson"
        install_hint: String,
    },

    VersionTooOld {
        found: semver::Version,
        required: semver::VersionReq,
    },
}

impl BackendAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, BackendAvailability::Available { .. })
    }

    /// Get error message if not available.
    pub fn error_message(&self) -> Option<String> {
        match self {
            BackendAvailability::Available { .. } => None,
            BackendAvailability::NotInstalled { tool, install_hint } => {
                Some(format!("{} not found. {}", tool, install_hint))
            }
            BackendAvailability::VersionTooOld { found, required } => {
                Some(format!("version {} found, but {} required", found, required))
            }
        }
    }
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Human-readable profile, e.g. `-O2` or `release+asan`.
    pub label: String,
    pub artifact_dir: PathBuf,
    pub artifacts: Vec<PathBuf>,
}

/// Counts scraped from the test runner's summary, when it printed one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TestSummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

impl fmt::Display for TestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} passed, {} failed", self.passed, self.failed)?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOutcome {
    pub summary: Option<TestSummary>,
}

/// Exit status of a program launched by `run` or `bench`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
}

/// One buildable target as the backend names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub name: String,
    /// Backend-specific kind, e.g. `cc_binary` or `executable`.
    pub kind: String,
}

/// What `clean` removed. Cleaning never fails; problems are reported as warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed: Vec<PathBuf>,
}

impl CleanReport {
    pub(crate) fn remove(&mut self, ctx: &BackendContext, path: &Path) {
        if ctx.remove_best_effort(path) {
            self.removed.push(path.to_path_buf());
        }
    }

    pub(crate) fn remove_all<I>(&mut self, ctx: &BackendContext, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        for path in paths {
            self.remove(ctx, &path);
        }
    }
}

/// A build system quay can drive.
///
/// Implementations shell out through the context's runner, never change the
/// process working directory, and leave artifacts in the canonical
/// `.bin/native/<dir-label>` layout.
pub trait BuildBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn context(&self) -> &BackendContext;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Whether the backend's tool is installed.
    fn availability(&self) -> Result<BackendAvailability>;

    fn build(&self, opts: &BuildOptions) -> Result<BuildOutcome>;

    /// Run the project's tests, skipping suites that belong to test frameworks.
    fn test(&self, opts: &TestOptions) -> Result<TestOutcome>;

    /// Build, then run one executable with the console handed over to it.
    fn run(&self, opts: &RunOptions) -> Result<RunOutcome>;

    fn bench(&self, opts: &BenchOptions) -> Result<RunOutcome>;

    fn clean(&self, opts: &CleanOptions) -> CleanReport;

    fn list_targets(&self) -> Result<Vec<BuildTarget>>;

    /// Declare a dependency. An empty version means the latest known one.
    ///
    /// Returns the entry as written.
    fn add_dependency(&self, name: &str, version: &str) -> Result<Dependency>;

    fn remove_dependency(&self, name: &str) -> Result<()>;

    fn list_dependencies(&self) -> Result<Vec<Dependency>>;

    fn search_dependencies(&self, query: &str) -> Result<Vec<Dependency>>;

    fn dependency_info(&self, name: &str) -> Result<DependencyInfo>;

    fn generate_gitignore(&self, root: &Path) -> Result<()> {
        let text = self
            .context()
            .scaffolder
            .render(ScaffoldFile::Gitignore(self.kind()), &InitConfig::new(""));
        crate::util::fs::write_string(&root.join(".gitignore"), &text)
    }

    /// Root manifest and build files.
    fn generate_build_src(&self, root: &Path, config: &InitConfig) -> Result<()>;

    fn generate_build_test(&self, root: &Path, config: &InitConfig) -> Result<()>;

    fn generate_build_bench(&self, root: &Path, config: &InitConfig) -> Result<()>;
}

/// Map a failed toolchain step to `BuildFailure`.
pub(crate) fn ensure_built(
    output: ProcessOutput,
    backend: &'static str,
    phase: &'static str,
) -> Result<ProcessOutput> {
    if output.success() {
        return Ok(output);
    }
    Err(BackendError::BuildFailure {
        backend,
        phase,
        code: output.code,
        output: output.combined(),
    }
    .into())
}

/// Parse a version out of `--version` output, tolerating two-part versions
/// and suffixes like `1.3.0.dev1` or `7.1.0-homebrew`.
pub fn parse_version_flexible(version_str: &str) -> Option<semver::Version> {
    let clean_version = version_str
        .trim()
        .split(|c: char| !c.is_ascii_digit() && c != '.')
        .next()
        .unwrap_or(version_str)
        .trim_end_matches('.');

    if let Ok(v) = clean_version.parse() {
        return Some(v);
    }

    let parts: Vec<&str> = clean_version.split('.').collect();
    let major = parts.first().and_then(|s| s.parse().ok())?;
    let minor = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
    let patch = parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);

    Some(semver::Version::new(major, minor, patch))
}

/// Run `<tool> --version` and compare against `required`.
pub(crate) fn check_tool(
    ctx: &BackendContext,
    tool: &str,
    required: &str,
    install_hint: &str,
) -> Result<BackendAvailability> {
    let not_installed = || BackendAvailability::NotInstalled {
        tool: tool.to_string(),
        install_hint: install_hint.to_string(),
    };

    let output = match ctx.run(&ctx.command(tool).arg("--version"), OutputMode::Capture) {
        Ok(output) if output.success() => output,
        Ok(_) => return Ok(not_installed()),
        Err(e) => {
            tracing::debug!("{} --version failed: {:#}", tool, e);
            return Ok(not_installed());
        }
    };

    let version = output
        .stdout
        .split_whitespace()
        .filter(|word| word.starts_with(|c: char| c.is_ascii_digit()))
        .find_map(parse_version_flexible)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "could not parse {} version from output: {}",
                tool,
                output.stdout.trim()
            )
        })?;

    let required = semver::VersionReq::parse(required)?;
    if required.matches(&version) {
        Ok(BackendAvailability::Available { version })
    } else {
        Ok(BackendAvailability::VersionTooOld {
            found: version,
            required,
        })
    }
}
