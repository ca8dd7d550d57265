//! Bazel backend with a local Bazel Central Registry mirror.
//!
//! Output symlinks are hidden behind `--symlink_prefix=.bazel-`, so a build
//! leaves `.bazel-bin`, `.bazel-out` and friends next to `MODULE.bazel`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use crate::builder::artifacts;
use crate::builder::backend::{
    check_tool, ensure_built, BackendAvailability, BuildBackend, BuildOutcome, BuildTarget,
    CleanReport, RunOutcome, TestOutcome, TestSummary,
};
use crate::builder::ci;
use crate::builder::context::BackendContext;
use crate::builder::scaffold::ScaffoldFile;
use crate::core::manifest::ModuleFile;
use crate::core::{
    BackendKind, BenchOptions, BuildOptions, CleanOptions, Dependency, DependencyInfo, InitConfig,
    RunOptions, TestOptions,
};
use crate::sources::{BcrRegistry, PackageRegistry};
use crate::util::diagnostic::BackendError;
use crate::util::fs::{read_to_string, write_string};
use crate::util::process::{OutputMode, ProcessBuilder};
use crate::util::shell::Status;

const NAME: &str = "bazel";

const SYMLINK_PREFIX: &str = ".bazel-";

/// `bazel test` exit code when the pattern matched no test targets.
const NO_TESTS_FOUND: i32 = 4;

const TARGET_SUFFIXES_NOT_RUN: [&str; 4] = ["_lib", "_test", "_tests", "_bench"];

fn bazel_install_hint() -> String {
    if cfg!(target_os = "macos") {
        "Install Bazelisk: brew install bazelisk".to_string()
    } else if cfg!(target_os = "windows") {
        "Install Bazelisk: winget install Bazel.Bazelisk".to_string()
    } else {
        "Install Bazelisk: npm install -g @bazel/bazelisk, or https://github.com/bazelbuild/bazelisk/releases"
            .to_string()
    }
}

#[derive(Debug)]
pub struct BazelBackend {
    ctx: BackendContext,
}

impl BazelBackend {
    pub fn new(ctx: BackendContext) -> Self {
        BazelBackend { ctx }
    }

    fn module_path(&self) -> PathBuf {
        self.ctx.path("MODULE.bazel")
    }

    fn load_module(&self) -> Result<ModuleFile> {
        let path = self.module_path();
        if !path.is_file() {
            return Err(BackendError::ManifestNotFound { path }.into());
        }
        Ok(ModuleFile::parse(read_to_string(&path)?))
    }

    fn save_module(&self, module: &ModuleFile) -> Result<()> {
        write_string(&self.module_path(), module.as_str())
    }

    fn registry(&self) -> Result<BcrRegistry> {
        BcrRegistry::open(self.ctx.bcr_root.as_deref())
    }

    fn bazel(&self, verb: &str) -> ProcessBuilder {
        self.ctx.command("bazel").arg(verb)
    }

    /// Options every building verb takes.
    fn output_flags(&self, verbose: bool) -> Vec<String> {
        let mut flags = vec![format!("--symlink_prefix={}", SYMLINK_PREFIX)];
        if !verbose {
            flags.push("--noshow_progress".to_string());
        }
        flags
    }

    /// `bazel-bin`, preferring the hidden symlink.
    fn bin_dir(&self) -> Option<PathBuf> {
        [format!("{}bin", SYMLINK_PREFIX), "bazel-bin".to_string()]
            .iter()
            .map(|name| self.ctx.path(name))
            .find(|path| path.exists())
    }

    /// Executable targets `run` may pick when none is named.
    fn run_candidates(&self) -> Vec<String> {
        let runnable = |name: &str| !TARGET_SUFFIXES_NOT_RUN.iter().any(|s| name.ends_with(s));

        let root: Vec<String> = rules_in(&self.ctx.path("BUILD.bazel"))
            .into_iter()
            .filter(|(kind, name)| !matches!(kind.as_str(), "cc_library" | "cc_test") && runnable(name))
            .map(|(_, name)| format!("//:{}", name))
            .collect();
        if !root.is_empty() {
            return root;
        }

        rules_in(&self.ctx.path("src/BUILD.bazel"))
            .into_iter()
            .filter(|(kind, name)| kind == "cc_binary" && runnable(name))
            .map(|(_, name)| format!("//src:{}", name))
            .collect()
    }

    fn resolve_run_label(&self, target: Option<&str>) -> Result<String> {
        if let Some(target) = target {
            return Ok(label(target));
        }

        let mut candidates = self.run_candidates();
        match candidates.len() {
            1 => Ok(candidates.remove(0)),
            0 => Err(BackendError::TargetNotFound {
                message: "no runnable target found in BUILD.bazel or src/BUILD.bazel".into(),
                candidates: Vec::new(),
            }
            .into()),
            _ => Err(BackendError::TargetNotFound {
                message: "more than one runnable target".into(),
                candidates,
            }
            .into()),
        }
    }

    fn bench_label(&self, verbose: bool) -> Result<String> {
        let query = self.bazel("query").arg("kind(cc_binary, //bench:*)");
        match self.ctx.run(&query, OutputMode::Capture) {
            Ok(output) if output.success() => {
                if let Some(first) = output.stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
                    return Ok(first.to_string());
                }
            }
            Ok(output) => {
                if verbose {
                    self.ctx.shell.raw(&output.combined());
                }
                tracing::debug!("bench query failed, falling back to bench/BUILD.bazel");
            }
            Err(e) => tracing::debug!("bench query failed: {:#}", e),
        }

        rules_in(&self.ctx.path("bench/BUILD.bazel"))
            .into_iter()
            .find(|(kind, _)| kind == "cc_binary")
            .map(|(_, name)| format!("//bench:{}", name))
            .ok_or_else(|| {
                BackendError::NoBenchmarksFound {
                    searched: "//bench".into(),
                }
                .into()
            })
    }

    /// Latest BCR version of `module`, or `None` with a warning.
    fn latest_from_registry(&self, module: &str) -> Option<String> {
        let registry = match self.registry() {
            Ok(registry) => registry,
            Err(e) => {
                self.ctx
                    .shell
                    .warn(format!("skipping bazel_dep `{}`: {:#}", module, e));
                return None;
            }
        };
        match registry.latest_version(module) {
            Ok(version) => Some(version),
            Err(e) => {
                self.ctx
                    .shell
                    .warn(format!("skipping bazel_dep `{}`: {:#}", module, e));
                None
            }
        }
    }
}

impl BuildBackend for BazelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Bazel
    }

    fn context(&self) -> &BackendContext {
        &self.ctx
    }

    fn availability(&self) -> Result<BackendAvailability> {
        check_tool(&self.ctx, "bazel", ">=6.0", &bazel_install_hint())
    }

    fn build(&self, opts: &BuildOptions) -> Result<BuildOutcome> {
        let profile = opts.profile();
        if opts.clean {
            self.clean(&CleanOptions::default());
        }

        let mut cmd = self.bazel("build").args(profile.bazel_flags());
        if let Some(jobs) = opts.jobs.filter(|&j| j > 0) {
            cmd = cmd.arg(format!("--jobs={}", jobs));
        }
        if let Some(toolchain) = &opts.toolchain {
            cmd = cmd.arg(format!("--config={}", toolchain));
        }
        cmd = cmd
            .arg(opts.target.as_deref().map(label).unwrap_or_else(|| "//...".to_string()))
            .args(self.output_flags(opts.verbose));

        self.ctx
            .shell
            .status(Status::Building, format!("with Bazel [{}]", profile.label()));
        let output = self.ctx.run(&cmd, OutputMode::Stream)?;
        ensure_built(output, NAME, "build")?;

        let mut found = Vec::new();
        match self.bin_dir() {
            Some(bin) => {
                found.extend(artifacts::collect(&bin.join("src"), 1));
                found.extend(artifacts::collect(&bin, 1));
            }
            None => tracing::warn!("no bazel-bin found after build"),
        }
        let copied = artifacts::normalize(&self.ctx, &profile, &found)?;

        let artifact_dir = self.ctx.artifact_dir(&profile);
        self.ctx.shell.status(
            Status::Finished,
            format!("{} in {}", profile.label(), self.ctx.display_path(&artifact_dir).display()),
        );
        Ok(BuildOutcome {
            label: profile.label(),
            artifact_dir,
            artifacts: copied,
        })
    }

    fn test(&self, opts: &TestOptions) -> Result<TestOutcome> {
        let mut cmd = self.bazel("test");
        match opts.filter.as_deref() {
            Some(pattern) if pattern.contains("//") || pattern.starts_with(':') => {
                cmd = cmd.arg(pattern);
            }
            Some(filter) => {
                cmd = cmd.arg("//...").arg(format!("--test_filter={}", filter));
            }
            None => cmd = cmd.arg("//..."),
        }
        if let Some(toolchain) = &opts.toolchain {
            cmd = cmd.arg(format!("--config={}", toolchain));
        }
        cmd = cmd
            .arg(if opts.verbose {
                "--test_output=all"
            } else {
                "--test_output=errors"
            })
            .args(self.output_flags(opts.verbose));

        self.ctx.shell.status(Status::Testing, "with Bazel");
        let output = self.ctx.run(&cmd, OutputMode::Stream)?;

        if output.code == Some(NO_TESTS_FOUND) {
            self.ctx.shell.warn("no test targets found");
            return Ok(TestOutcome::default());
        }
        if !output.success() {
            return Err(BackendError::TestFailure {
                backend: NAME,
                code: output.code,
                output: output.combined(),
            }
            .into());
        }

        Ok(TestOutcome {
            summary: parse_test_summary(&output.combined()),
        })
    }

    fn run(&self, opts: &RunOptions) -> Result<RunOutcome> {
        let target = self.resolve_run_label(opts.target.as_deref())?;

        let mut cmd = self.bazel("run").args(opts.profile().bazel_flags());
        if let Some(toolchain) = &opts.toolchain {
            cmd = cmd.arg(format!("--config={}", toolchain));
        }
        cmd = cmd.args(self.output_flags(opts.verbose)).arg(&target);
        if !opts.args.is_empty() {
            cmd = cmd.arg("--").args(&opts.args);
        }

        self.ctx.shell.status(Status::Running, &target);
        let output = self.ctx.run(&cmd, OutputMode::Inherit)?;
        Ok(RunOutcome {
            exit_code: output.exit_code(),
        })
    }

    fn bench(&self, opts: &BenchOptions) -> Result<RunOutcome> {
        let target = match &opts.target {
            Some(target) => label(target),
            None => self.bench_label(opts.verbose)?,
        };

        let mut cmd = self.bazel("run").args(["-c", "opt"]);
        if let Some(toolchain) = &opts.toolchain {
            cmd = cmd.arg(format!("--config={}", toolchain));
        }
        if opts.verbose {
            cmd = cmd.arg("--verbose_failures");
        }
        cmd = cmd.args(self.output_flags(opts.verbose)).arg(&target);

        self.ctx.shell.status(Status::Running, &target);
        let output = self.ctx.run(&cmd, OutputMode::Inherit)?;
        Ok(RunOutcome {
            exit_code: output.exit_code(),
        })
    }

    fn clean(&self, opts: &CleanOptions) -> CleanReport {
        let mut cmd = self.bazel("clean");
        if opts.all {
            cmd = cmd.arg("--expunge");
        }
        self.ctx.shell.status(Status::Cleaning, "bazel outputs");
        match self.ctx.run(&cmd, OutputMode::Capture) {
            Ok(output) if output.success() => {}
            Ok(output) => {
                tracing::warn!("bazel clean failed: {}", output.stderr.trim());
                self.ctx
                    .shell
                    .warn("bazel clean failed (workspace may not be initialized)");
            }
            Err(e) => {
                tracing::warn!("bazel clean failed: {:#}", e);
                self.ctx.shell.warn(format!("could not run bazel clean: {:#}", e));
            }
        }

        let mut report = CleanReport::default();
        report.remove(&self.ctx, &self.ctx.artifact_root());
        report.remove(&self.ctx, &self.ctx.path("build"));

        let root = &self.ctx.project_root;
        let links = crate::util::fs::glob_entries(root, "bazel-*")
            .into_iter()
            .chain(crate::util::fs::glob_entries(root, &format!("{}*", SYMLINK_PREFIX)));
        report.remove_all(&self.ctx, links);

        if opts.all {
            report.remove_all(&self.ctx, [self.ctx.path(".bazel"), self.ctx.path("external")]);
            report.remove_all(&self.ctx, ci::CI_DIRS.iter().map(|d| self.ctx.path(d)));
        }
        report
    }

    fn list_targets(&self) -> Result<Vec<BuildTarget>> {
        let cmd = self.bazel("query").args(["//...", "--output", "label_kind"]);
        let output = self.ctx.run(&cmd, OutputMode::Capture)?;
        if !output.success() {
            return Err(BackendError::ToolFailed {
                tool: "bazel query".into(),
                action: "listing targets",
                code: output.code,
                output: output.combined(),
            }
            .into());
        }
        Ok(parse_label_kinds(&output.stdout))
    }

    fn add_dependency(&self, name: &str, version: &str) -> Result<Dependency> {
        let mut module = self.load_module()?;

        let registry = match (&self.ctx.bcr_root, version.is_empty()) {
            (None, false) => None,
            _ => Some(self.registry()?),
        };

        let version = match &registry {
            Some(registry) => {
                if !registry.contains(name) {
                    return Err(
                        BackendError::dependency_not_found(name, registry.display_name()).into(),
                    );
                }
                if version.is_empty() {
                    registry.latest_version(name)?
                } else {
                    if !registry.versions(name)?.iter().any(|v| v == version) {
                        self.ctx.shell.warn(format!(
                            "{} {} is not published in the {}",
                            name,
                            version,
                            registry.display_name()
                        ));
                    } else if let Some(reason) = registry.yank_reason(name, version)? {
                        self.ctx
                            .shell
                            .warn(format!("{} {} was yanked: {}", name, version, reason));
                    }
                    version.to_string()
                }
            }
            None => version.to_string(),
        };

        module.set_dependency(name, &version);
        self.save_module(&module)?;
        self.ctx
            .shell
            .status(Status::Added, format!("{}@{} to MODULE.bazel", name, version));
        self.ctx.shell.note(format!(
            "reference it from BUILD.bazel as deps = [\"@{}//:<target>\"]",
            name
        ));

        Ok(Dependency::new(name, version))
    }

    fn remove_dependency(&self, name: &str) -> Result<()> {
        let mut module = self.load_module()?;
        if !module.remove_dependency(name) {
            return Err(BackendError::dependency_not_found(name, "MODULE.bazel").into());
        }
        self.save_module(&module)?;
        self.ctx
            .shell
            .status(Status::Removed, format!("{} from MODULE.bazel", name));
        Ok(())
    }

    fn list_dependencies(&self) -> Result<Vec<Dependency>> {
        Ok(self.load_module()?.dependencies())
    }

    fn search_dependencies(&self, query: &str) -> Result<Vec<Dependency>> {
        self.registry()?.search(query)
    }

    fn dependency_info(&self, name: &str) -> Result<DependencyInfo> {
        self.registry()?.info(name)
    }

    fn generate_build_src(&self, root: &Path, config: &InitConfig) -> Result<()> {
        let mut module = ModuleFile::new_module(&config.name, &config.version);

        let frameworks = config
            .test_framework
            .map(|f| f.bcr_module())
            .into_iter()
            .chain(config.bench_framework.map(|f| f.bcr_module()));
        for dep in config.dependencies.iter().map(String::as_str).chain(frameworks) {
            if module.contains(dep) {
                continue;
            }
            if let Some(version) = self.latest_from_registry(dep) {
                module.set_dependency(dep, &version);
            }
        }
        write_string(&root.join("MODULE.bazel"), module.as_str())?;

        let scaffolder = &self.ctx.scaffolder;
        write_string(
            &root.join(".bazelrc"),
            &scaffolder.render(ScaffoldFile::Bazelrc, config),
        )?;
        write_string(
            &root.join("BUILD.bazel"),
            &scaffolder.render(ScaffoldFile::BazelBuild, config),
        )
    }

    fn generate_build_test(&self, root: &Path, config: &InitConfig) -> Result<()> {
        write_string(
            &root.join("tests/BUILD.bazel"),
            &self.ctx.scaffolder.render(ScaffoldFile::BazelTests, config),
        )
    }

    fn generate_build_bench(&self, root: &Path, config: &InitConfig) -> Result<()> {
        write_string(
            &root.join("bench/BUILD.bazel"),
            &self.ctx.scaffolder.render(ScaffoldFile::BazelBench, config),
        )
    }
}

/// `calc` becomes `//:calc`; anything that already looks like a label is kept.
fn label(target: &str) -> String {
    if target.starts_with("//") || target.starts_with(':') || target.starts_with('@') {
        target.to_string()
    } else {
        format!("//:{}", target)
    }
}

fn rule_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(\w+)\s*\(").expect("valid regex"))
}

fn name_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bname\s*=\s*"([^"]+)""#).expect("valid regex"))
}

/// `(rule kind, name)` for each top-level rule call in a BUILD file.
fn parse_rules(text: &str) -> Vec<(String, String)> {
    let starts: Vec<(usize, &str)> = rule_start_re()
        .captures_iter(text)
        .filter_map(|caps| Some((caps.get(0)?.start(), caps.get(1)?.as_str())))
        .collect();

    starts
        .iter()
        .enumerate()
        .filter(|(_, (_, kind))| *kind != "load")
        .filter_map(|(i, (start, kind))| {
            let end = starts.get(i + 1).map(|(next, _)| *next).unwrap_or(text.len());
            let name = name_attr_re().captures(&text[*start..end])?;
            Some((kind.to_string(), name[1].to_string()))
        })
        .collect()
}

fn rules_in(path: &Path) -> Vec<(String, String)> {
    std::fs::read_to_string(path)
        .map(|text| parse_rules(&text))
        .unwrap_or_default()
}

/// `cc_binary rule //src:main` lines, keeping C/C++ rules.
fn parse_label_kinds(output: &str) -> Vec<BuildTarget> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 || !parts[0].starts_with("cc_") {
                return None;
            }
            Some(BuildTarget {
                name: parts[parts.len() - 1].to_string(),
                kind: parts[0].to_string(),
            })
        })
        .collect()
}

fn test_status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^(?:@\S*)?//\S+\s+(?:\(cached\)\s+)?(PASSED|FAILED|FLAKY|TIMEOUT|INCOMPLETE|SKIPPED|NO STATUS)\b",
        )
        .expect("valid regex")
    })
}

/// Count the per-target status lines Bazel prints after a test run.
fn parse_test_summary(output: &str) -> Option<TestSummary> {
    let mut summary = TestSummary::default();
    let mut seen = false;

    for caps in test_status_re().captures_iter(output) {
        seen = true;
        match &caps[1] {
            "PASSED" | "FLAKY" => summary.passed += 1,
            "SKIPPED" | "NO STATUS" => summary.skipped += 1,
            _ => summary.failed += 1,
        }
    }

    seen.then_some(summary)
}
