//! Everything a backend shim needs from the outside world.
//!
//! Registry roots, the process runner and the template renderer are passed in
//! here rather than looked up globally, so shims can be built against a
//! temporary directory and a scripted runner in tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::builder::scaffold::{MinimalScaffolder, Scaffolder};
use crate::core::Profile;
use crate::util::config::GlobalConfig;
use crate::util::process::{OutputMode, ProcessBuilder, ProcessOutput, ProcessRunner, SystemRunner};
use crate::util::shell::{Shell, Status};

/// Where normalized artifacts and build caches live, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub bin_dir: String,
    pub cache_dir: String,
    pub platform: String,
}

impl Default for OutputLayout {
    fn default() -> Self {
        OutputLayout {
            bin_dir: ".bin".to_string(),
            cache_dir: ".cache".to_string(),
            platform: "native".to_string(),
        }
    }
}

/// Shared state handed to every backend shim.
#[derive(Clone)]
pub struct BackendContext {
    pub project_root: PathBuf,
    pub runner: Arc<dyn ProcessRunner>,
    pub shell: Shell,
    pub layout: OutputLayout,
    pub vcpkg_root: Option<PathBuf>,
    pub bcr_root: Option<PathBuf>,
    pub scaffolder: Arc<dyn Scaffolder>,
}

impl fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendContext")
            .field("project_root", &self.project_root)
            .field("layout", &self.layout)
            .field("vcpkg_root", &self.vcpkg_root)
            .field("bcr_root", &self.bcr_root)
            .finish_non_exhaustive()
    }
}

impl BackendContext {
    /// Context using real processes and no registries.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        BackendContext {
            project_root: project_root.into(),
            runner: Arc::new(SystemRunner),
            shell: Shell::default(),
            layout: OutputLayout::default(),
            vcpkg_root: None,
            bcr_root: None,
            scaffolder: Arc::new(MinimalScaffolder),
        }
    }

    /// Context with registry roots taken from the user's config.
    pub fn from_config(project_root: impl Into<PathBuf>, config: &GlobalConfig) -> Self {
        BackendContext::new(project_root)
            .with_vcpkg_root(config.resolved_vcpkg_root())
            .with_bcr_root(config.resolved_bcr_root())
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_vcpkg_root(mut self, root: Option<PathBuf>) -> Self {
        self.vcpkg_root = root;
        self
    }

    pub fn with_bcr_root(mut self, root: Option<PathBuf>) -> Self {
        self.bcr_root = root;
        self
    }

    pub fn with_scaffolder(mut self, scaffolder: Arc<dyn Scaffolder>) -> Self {
        self.scaffolder = scaffolder;
        self
    }

    /// Absolute path of something under the project root.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.project_root.join(relative)
    }

    /// `<root>/.bin/native`
    pub fn artifact_root(&self) -> PathBuf {
        self.project_root
            .join(&self.layout.bin_dir)
            .join(&self.layout.platform)
    }

    /// `<root>/.bin/native/<dir-label>`
    pub fn artifact_dir(&self, profile: &Profile) -> PathBuf {
        self.artifact_root().join(profile.dir_name())
    }

    /// `<root>/.cache/native`
    pub fn cache_root(&self) -> PathBuf {
        self.project_root
            .join(&self.layout.cache_dir)
            .join(&self.layout.platform)
    }

    /// A command that runs inside the project root.
    pub fn command(&self, program: &str) -> ProcessBuilder {
        ProcessBuilder::new(program).cwd(&self.project_root)
    }

    pub fn run(&self, cmd: &ProcessBuilder, mode: OutputMode) -> Result<ProcessOutput> {
        tracing::debug!("{}", cmd.display_command());
        self.runner.run(cmd, mode)
    }

    /// Run a step whose output is only interesting when it fails.
    ///
    /// Verbose mode streams instead. On failure the captured output is echoed
    /// so nothing the tool printed is lost.
    pub fn run_quiet_step(
        &self,
        cmd: &ProcessBuilder,
        status: Status,
        message: &str,
        verbose: bool,
    ) -> Result<ProcessOutput> {
        if verbose || self.shell.is_verbose() {
            self.shell.status(status, message);
            return self.run(cmd, OutputMode::Stream);
        }

        let spinner = self.shell.spinner(status, message);
        let output = self.run(cmd, OutputMode::Capture);
        spinner.finish();

        let output = output?;
        if !output.success() {
            self.shell.raw(&output.combined());
        }
        Ok(output)
    }

    /// Remove a path, downgrading failure to a warning. Returns true if something was removed.
    pub fn remove_best_effort(&self, path: &Path) -> bool {
        match crate::util::fs::remove_path(path) {
            Ok(removed) => {
                if removed {
                    self.shell
                        .status(Status::Removed, self.display_path(path).display());
                }
                removed
            }
            Err(e) => {
                tracing::warn!("failed to remove {}: {}", path.display(), e);
                self.shell
                    .warn(format!("could not remove {}: {}", path.display(), e));
                false
            }
        }
    }

    /// Path relative to the project root, for messages.
    pub fn display_path<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.project_root).unwrap_or(path)
    }
}
