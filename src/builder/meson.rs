//! Meson backend. Dependencies are WrapDB wraps under `subprojects/`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::builder::artifacts;
use crate::builder::backend::{
    check_tool, ensure_built, BackendAvailability, BuildBackend, BuildOutcome, BuildTarget,
    CleanReport, RunOutcome, TestOutcome, TestSummary,
};
use crate::builder::ci;
use crate::builder::context::BackendContext;
use crate::builder::scaffold::ScaffoldFile;
use crate::core::manifest::WrapFile;
use crate::core::{
    BackendKind, BenchOptions, BuildOptions, CleanOptions, Dependency, DependencyInfo, InitConfig,
    OptLevel, Profile, RunOptions, TestOptions,
};
use crate::util::diagnostic::{suggestions, BackendError};
use crate::util::fs::{ensure_dir, glob_entries, write_string};
use crate::util::process::{OutputMode, ProcessBuilder, ProcessOutput};
use crate::util::shell::Status;

const NAME: &str = "meson";

const BUILD_DIR: &str = "builddir";

/// Suites registered by framework subprojects.
const THIRD_PARTY_SUITES: [&str; 5] = ["google-benchmark", "gtest", "gmock", "catch2", "doctest"];

const ARTIFACT_TYPES: [&str; 4] = ["executable", "static library", "shared library", "shared module"];

/// One entry of `meson introspect --targets`.
#[derive(Debug, Clone, Deserialize)]
struct IntrospectTarget {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    filename: Vec<PathBuf>,
    #[serde(default)]
    subproject: Option<String>,
}

impl IntrospectTarget {
    fn is_own(&self) -> bool {
        self.subproject.is_none()
    }
}

fn meson_install_hint() -> String {
    if cfg!(target_os = "macos") {
        "Install Meson: brew install meson, or pip install meson ninja".to_string()
    } else {
        "Install Meson: pip install meson ninja, or your distribution's meson package".to_string()
    }
}

#[derive(Debug)]
pub struct MesonBackend {
    ctx: BackendContext,
}

impl MesonBackend {
    pub fn new(ctx: BackendContext) -> Self {
        MesonBackend { ctx }
    }

    fn build_dir(&self) -> PathBuf {
        self.ctx.path(BUILD_DIR)
    }

    fn subprojects(&self) -> PathBuf {
        self.ctx.path("subprojects")
    }

    fn wrap_path(&self, name: &str) -> PathBuf {
        self.subprojects().join(format!("{}.wrap", name))
    }

    fn meson(&self) -> ProcessBuilder {
        self.ctx.command("meson")
    }

    /// Options shared by `setup` and `configure`.
    fn profile_args(profile: &Profile) -> Vec<String> {
        let (build_type, optimization) = profile.meson_build_type();
        let mut args = vec![
            format!("--buildtype={}", build_type),
            format!("--optimization={}", optimization),
        ];
        if profile.opt_level == Some(OptLevel::Fast) {
            args.push("-Dc_args=-ffast-math".to_string());
            args.push("-Dcpp_args=-ffast-math".to_string());
        }
        args
    }

    /// `meson setup` a fresh build dir, or reconfigure the existing one for `profile`.
    fn configure(&self, profile: &Profile, toolchain: Option<&str>, verbose: bool) -> Result<()> {
        let mut args = Self::profile_args(profile);

        if !self.build_dir().is_dir() {
            if let Some(san) = profile.sanitizer {
                args.push(format!("-Db_sanitize={}", san.runtime_name()));
            }
            if let Some(toolchain) = toolchain {
                args.push("--native-file".to_string());
                args.push(self.ctx.path(toolchain).display().to_string());
            }
            let cmd = self.meson().args(["setup", BUILD_DIR]).args(args);
            let output = self.ctx.run_quiet_step(
                &cmd,
                Status::Configuring,
                &format!("{} [{}]", BUILD_DIR, profile.label()),
                verbose,
            )?;
            ensure_built(output, NAME, "setup")?;
            return Ok(());
        }

        let sanitize = profile.sanitizer.map(|s| s.runtime_name()).unwrap_or("none");
        args.push(format!("-Db_sanitize={}", sanitize));
        let cmd = self.meson().args(["configure", BUILD_DIR]).args(args);
        let output = self.ctx.run_quiet_step(
            &cmd,
            Status::Configuring,
            &format!("{} [{}]", BUILD_DIR, profile.label()),
            verbose,
        )?;
        if !output.success() {
            tracing::warn!("meson configure exited with {:?}", output.code);
            self.ctx
                .shell
                .warn("meson configure failed; building with the existing configuration");
        }
        Ok(())
    }

    fn compile(&self, target: Option<&str>, jobs: Option<usize>, verbose: bool) -> Result<()> {
        let mut cmd = self.meson().args(["compile", "-C", BUILD_DIR]);
        if let Some(jobs) = jobs.filter(|&j| j > 0) {
            cmd = cmd.args(["-j", &jobs.to_string()]);
        }
        if let Some(target) = target {
            cmd = cmd.arg(target);
        }
        if verbose {
            cmd = cmd.arg("-v");
        }
        let output = self.ctx.run(&cmd, OutputMode::Stream)?;
        ensure_built(output, NAME, "compile")?;
        Ok(())
    }

    fn introspect(&self) -> Result<Vec<IntrospectTarget>> {
        let cmd = self.meson().args(["introspect", "--targets", BUILD_DIR]);
        let output = self.ctx.run(&cmd, OutputMode::Capture)?;
        if !output.success() {
            return Err(BackendError::ToolFailed {
                tool: "meson introspect".into(),
                action: "reading build targets",
                code: output.code,
                output: output.combined(),
            }
            .into());
        }
        serde_json::from_str(&output.stdout).context("failed to parse meson introspection output")
    }

    /// Built files of the project's own targets, falling back to a scan of the build dir.
    fn built_artifacts(&self) -> Vec<PathBuf> {
        match self.introspect() {
            Ok(targets) => targets
                .into_iter()
                .filter(|t| t.is_own() && ARTIFACT_TYPES.contains(&t.kind.as_str()))
                .flat_map(|t| t.filename)
                .filter(|path| path.is_file())
                .collect(),
            Err(e) => {
                tracing::debug!("introspection unavailable, scanning {}: {:#}", BUILD_DIR, e);
                artifacts::collect(&self.build_dir(), 2)
            }
        }
    }

    fn resolve_run_target(&self, target: Option<&str>) -> Result<PathBuf> {
        let build_dir = self.build_dir();
        let introspected: Vec<PathBuf> = self
            .introspect()
            .map(|targets| {
                targets
                    .into_iter()
                    .filter(|t| t.is_own() && t.kind == "executable")
                    .filter(|t| target.map_or(true, |wanted| t.name == wanted))
                    .flat_map(|t| t.filename)
                    .filter(|path| path.is_file())
                    .collect()
            })
            .unwrap_or_default();

        if let Some(target) = target {
            let exe = format!("{}{}", target, std::env::consts::EXE_SUFFIX);
            return introspected
                .into_iter()
                .chain([build_dir.join("src").join(&exe), build_dir.join(&exe)])
                .find(|path| path.is_file())
                .ok_or_else(|| {
                    BackendError::TargetNotFound {
                        message: format!("target `{}` not found in {}", target, BUILD_DIR),
                        candidates: Vec::new(),
                    }
                    .into()
                });
        }

        let mut candidates: Vec<PathBuf> = introspected
            .into_iter()
            .filter(|path| {
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                !artifacts::is_test_or_bench(&name.unwrap_or_default())
            })
            .collect();
        if candidates.is_empty() {
            candidates = artifacts::runnable_candidates(&build_dir.join("src"));
            candidates.extend(artifacts::runnable_candidates(&build_dir));
        }
        artifacts::pick_single(candidates, Path::new(BUILD_DIR))
    }

    fn resolve_bench(&self, target: Option<&str>) -> Result<PathBuf> {
        let build_dir = self.build_dir();
        let search = [build_dir.join("bench"), build_dir.clone()];

        if let Some(target) = target {
            let exe = format!("{}{}", target, std::env::consts::EXE_SUFFIX);
            if let Some(found) = search.iter().map(|dir| dir.join(&exe)).find(|p| p.is_file()) {
                return Ok(found);
            }
        } else {
            for dir in &search {
                let benches: Vec<PathBuf> = artifacts::executables_in(dir)
                    .into_iter()
                    .filter(|path| {
                        path.file_stem()
                            .map(|s| s.to_string_lossy().ends_with("_bench"))
                            .unwrap_or(false)
                    })
                    .collect();
                if !benches.is_empty() {
                    return artifacts::pick_single(benches, dir);
                }
            }
        }

        Err(BackendError::NoBenchmarksFound {
            searched: format!("{}/bench and {}", BUILD_DIR, BUILD_DIR),
        }
        .into())
    }

    /// `meson wrap install` run in `root`. Returns the raw process output.
    fn wrap_install(&self, root: &Path, name: &str) -> Result<ProcessOutput> {
        ensure_dir(&root.join("subprojects"))?;
        let cmd = ProcessBuilder::new("meson")
            .args(["wrap", "install", name])
            .cwd(root);
        self.ctx.run_quiet_step(
            &cmd,
            Status::Installing,
            &format!("{}.wrap", name),
            false,
        )
    }
}

impl BuildBackend for MesonBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Meson
    }

    fn context(&self) -> &BackendContext {
        &self.ctx
    }

    fn availability(&self) -> Result<BackendAvailability> {
        check_tool(&self.ctx, "meson", ">=1.0", &meson_install_hint())
    }

    fn build(&self, opts: &BuildOptions) -> Result<BuildOutcome> {
        let profile = opts.profile();
        if opts.clean {
            self.ctx.remove_best_effort(&self.build_dir());
            self.ctx.remove_best_effort(&self.ctx.artifact_dir(&profile));
        }

        self.configure(&profile, opts.toolchain.as_deref(), opts.verbose)?;

        self.ctx
            .shell
            .status(Status::Building, format!("with Meson [{}]", profile.label()));
        tracing::info!("compiling {} in {}", profile.label(), BUILD_DIR);
        self.compile(opts.target.as_deref(), opts.jobs, opts.verbose)?;

        let found = self.built_artifacts();
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
        if !self.build_dir().is_dir() {
            self.build(&BuildOptions {
                verbose: opts.verbose,
                toolchain: opts.toolchain.clone(),
                ..Default::default()
            })?;
        }

        let mut cmd = self.meson().args(["test", "-C", BUILD_DIR]);
        for suite in THIRD_PARTY_SUITES {
            cmd = cmd.args(["--no-suite", suite]);
        }
        cmd = cmd.arg(if opts.verbose { "-v" } else { "--quiet" });
        if let Some(filter) = &opts.filter {
            cmd = cmd.arg(filter);
        }

        self.ctx.shell.status(Status::Testing, "with Meson");
        let output = self.ctx.run(&cmd, OutputMode::Stream)?;
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
        self.build(&opts.build_options())?;
        let exe = self.resolve_run_target(opts.target.as_deref())?;

        self.ctx
            .shell
            .status(Status::Running, self.ctx.display_path(&exe).display());
        let cmd = ProcessBuilder::new(&exe)
            .args(&opts.args)
            .cwd(&self.ctx.project_root);
        let output = self.ctx.run(&cmd, OutputMode::Inherit)?;
        Ok(RunOutcome {
            exit_code: output.exit_code(),
        })
    }

    fn bench(&self, opts: &BenchOptions) -> Result<RunOutcome> {
        if !self.build_dir().is_dir() {
            self.build(&BuildOptions {
                verbose: opts.verbose,
                toolchain: opts.toolchain.clone(),
                ..Default::default()
            })?;
        }

        let exe = self.resolve_bench(opts.target.as_deref())?;
        self.ctx
            .shell
            .status(Status::Running, self.ctx.display_path(&exe).display());
        let output = self.ctx.run(
            &ProcessBuilder::new(&exe).cwd(&self.ctx.project_root),
            OutputMode::Inherit,
        )?;
        Ok(RunOutcome {
            exit_code: output.exit_code(),
        })
    }

    fn clean(&self, opts: &CleanOptions) -> CleanReport {
        let mut report = CleanReport::default();
        report.remove_all(
            &self.ctx,
            [self.build_dir(), self.ctx.path("build"), self.ctx.artifact_root()],
        );

        if opts.all {
            report.remove(&self.ctx, &self.subprojects().join("packagecache"));
            report.remove_all(
                &self.ctx,
                glob_entries(&self.ctx.project_root, "build-*"),
            );
            report.remove_all(&self.ctx, ci::CI_DIRS.iter().map(|d| self.ctx.path(d)));
        }
        report
    }

    fn list_targets(&self) -> Result<Vec<BuildTarget>> {
        if !self.build_dir().is_dir() {
            return Err(BackendError::configuration(
                format!("build directory `{}` does not exist", BUILD_DIR),
                "run `quay build` first",
            )
            .into());
        }

        Ok(self
            .introspect()?
            .into_iter()
            .filter(IntrospectTarget::is_own)
            .map(|t| BuildTarget {
                name: t.name,
                kind: t.kind,
            })
            .collect())
    }

    fn add_dependency(&self, name: &str, version: &str) -> Result<Dependency> {
        let path = self.wrap_path(name);

        if path.is_file() {
            self.ctx
                .shell
                .status(Status::Skipped, format!("{} (subprojects/{}.wrap exists)", name, name));
        } else {
            let output = self.wrap_install(&self.ctx.project_root, name)?;
            if !output.success() {
                let text = output.combined();
                if text.to_lowercase().contains("not found") {
                    return Err(BackendError::dependency_not_found(name, "WrapDB").into());
                }
                return Err(BackendError::ToolFailed {
                    tool: "meson wrap install".into(),
                    action: "installing a wrap",
                    code: output.code,
                    output: text,
                }
                .into());
            }
            self.ctx
                .shell
                .status(Status::Added, format!("subprojects/{}.wrap", name));
        }

        let installed = WrapFile::load(&path)?.version();
        if !version.is_empty() && installed != version {
            self.ctx.shell.warn(format!(
                "requested {} {}, but the wrap provides {}",
                name, version, installed
            ));
        }
        self.ctx.shell.note(format!(
            "use it from meson.build as {}_dep = dependency('{}')",
            name.replace('-', "_"),
            name
        ));

        Ok(Dependency::new(name, installed))
    }

    fn remove_dependency(&self, name: &str) -> Result<()> {
        let path = self.wrap_path(name);
        if !path.is_file() {
            return Err(BackendError::dependency_not_found(name, "subprojects/").into());
        }

        let wrap = WrapFile::load(&path)?;
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
        for dir in wrap.extracted_dirs(&self.subprojects()) {
            self.ctx.remove_best_effort(&dir);
        }

        self.ctx
            .shell
            .status(Status::Removed, format!("subprojects/{}.wrap", name));
        Ok(())
    }

    fn list_dependencies(&self) -> Result<Vec<Dependency>> {
        glob_entries(&self.subprojects(), "*.wrap")
            .iter()
            .map(|path| {
                let wrap = WrapFile::load(path)?;
                Ok(Dependency::new(wrap.name.clone(), wrap.version()))
            })
            .collect()
    }

    fn search_dependencies(&self, _query: &str) -> Result<Vec<Dependency>> {
        Err(BackendError::NotSupported {
            backend: NAME,
            operation: "dependency search",
            hint: Some(suggestions::WRAPDB.to_string()),
        }
        .into())
    }

    fn dependency_info(&self, _name: &str) -> Result<DependencyInfo> {
        Err(BackendError::NotSupported {
            backend: NAME,
            operation: "dependency info",
            hint: Some(suggestions::WRAPDB.to_string()),
        }
        .into())
    }

    fn generate_build_src(&self, root: &Path, config: &InitConfig) -> Result<()> {
        write_string(
            &root.join("meson.build"),
            &self.ctx.scaffolder.render(ScaffoldFile::MesonBuild, config),
        )?;

        let frameworks = config
            .test_framework
            .map(|f| f.wrap_name())
            .into_iter()
            .chain(config.bench_framework.map(|f| f.wrap_name()));
        let mut wraps: Vec<&str> = config.dependencies.iter().map(String::as_str).collect();
        for wrap in frameworks {
            if !wraps.contains(&wrap) {
                wraps.push(wrap);
            }
        }

        ensure_dir(&root.join("subprojects"))?;
        for wrap in wraps {
            match self.wrap_install(root, wrap) {
                Ok(output) if output.success() => {}
                Ok(_) => self
                    .ctx
                    .shell
                    .warn(format!("could not install the {} wrap", wrap)),
                Err(e) => self
                    .ctx
                    .shell
                    .warn(format!("could not install the {} wrap: {:#}", wrap, e)),
            }
        }
        Ok(())
    }

    fn generate_build_test(&self, root: &Path, config: &InitConfig) -> Result<()> {
        write_string(
            &root.join("tests/meson.build"),
            &self.ctx.scaffolder.render(ScaffoldFile::MesonTests, config),
        )
    }

    fn generate_build_bench(&self, root: &Path, config: &InitConfig) -> Result<()> {
        write_string(
            &root.join("bench/meson.build"),
            &self.ctx.scaffolder.render(ScaffoldFile::MesonBench, config),
        )
    }
}

fn summary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(Ok|Fail|Skipped):\s+(\d+)\s*$").expect("valid regex")
    })
}

/// The `Ok: / Fail: / Skipped:` block `meson test` prints last.
fn parse_test_summary(output: &str) -> Option<TestSummary> {
    let mut summary = TestSummary::default();
    let mut seen = false;

    for caps in summary_re().captures_iter(output) {
        let count: usize = caps[2].parse().ok()?;
        seen = true;
        match &caps[1] {
            "Ok" => summary.passed = count,
            "Fail" => summary.failed = count,
            _ => summary.skipped = count,
        }
    }

    seen.then_some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Sanitizer;
    use crate::test_support::{
        fake_binary, fake_library, project_with_marker, write_wrap, MockProcessOutput, MockRunner,
    };
    use crate::util::shell::Shell;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        project: TempDir,
        runner: Arc<MockRunner>,
        backend: MesonBackend,
    }

    fn fixture() -> Fixture {
        let project = project_with_marker(BackendKind::Meson);
        let runner = Arc::new(MockRunner::new());
        let ctx = BackendContext::new(project.path())
            .with_runner(runner.clone())
            .with_shell(Shell::quiet());
        Fixture {
            project,
            runner,
            backend: MesonBackend::new(ctx),
        }
    }

    fn introspection(targets: &[(&str, &str, PathBuf, Option<&str>)]) -> String {
        let entries: Vec<serde_json::Value> = targets
            .iter()
            .map(|(name, kind, file, subproject)| {
                serde_json::json!({
                    "name": name,
                    "id": format!("{}@exe", name),
                    "type": kind,
                    "filename": [file],
                    "subproject": subproject,
                })
            })
            .collect();
        serde_json::to_string(&entries).unwrap()
    }

    /// Setup creates builddir; compile drops `calc`, its tests and a subproject library.
    fn expect_build(f: &Fixture) -> PathBuf {
        let build_dir = f.project.path().join(BUILD_DIR);
        let setup_dir = build_dir.clone();
        f.runner
            .on_command("meson setup", MockProcessOutput::success(""), move |_| {
                std::fs::create_dir_all(&setup_dir).unwrap();
            });
        f.runner
            .expect_prefix("meson configure", MockProcessOutput::success(""));

        let out = build_dir.clone();
        f.runner
            .on_command("meson compile", MockProcessOutput::success(""), move |_| {
                fake_binary(&out.join("src/calc"));
                fake_binary(&out.join("tests/calc_tests"));
                fake_library(&out.join("libcalc_lib.a"));
                fake_library(&out.join("subprojects/fmt-10.2.0/libfmt.a"));
            });

        f.runner.expect(
            "meson introspect --targets builddir",
            MockProcessOutput::success(introspection(&[
                ("calc", "executable", build_dir.join("src/calc"), None),
                ("calc_tests", "executable", build_dir.join("tests/calc_tests"), None),
                ("calc_lib", "static library", build_dir.join("libcalc_lib.a"), None),
                ("fmt", "static library", build_dir.join("subprojects/fmt-10.2.0/libfmt.a"), Some("fmt")),
            ])),
        );
        build_dir
    }

    #[cfg(unix)]
    #[test]
    fn test_build_sets_up_and_normalizes_own_targets() {
        let f = fixture();
        expect_build(&f);

        let outcome = f
            .backend
            .build(&BuildOptions {
                opt_level: Some(OptLevel::Fast),
                sanitizer: Some(Sanitizer::Address),
                jobs: Some(6),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(outcome.label, "-Ofast+asan");
        let names: Vec<String> = outcome
            .artifacts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["calc", "calc_tests", "libcalc_lib.a"]);
        assert_eq!(
            f.runner.calls()[..2],
            [
                "meson setup builddir --buildtype=release --optimization=3 -Dc_args=-ffast-math -Dcpp_args=-ffast-math -Db_sanitize=address",
                "meson compile -C builddir -j 6",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_builddir_is_reconfigured() {
        let f = fixture();
        expect_build(&f);
        std::fs::create_dir_all(f.project.path().join(BUILD_DIR)).unwrap();

        f.backend
            .build(&BuildOptions {
                release: true,
                target: Some("calc".into()),
                verbose: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            f.runner.calls()[..2],
            [
                "meson configure builddir --buildtype=release --optimization=2 -Db_sanitize=none",
                "meson compile -C builddir calc -v",
            ]
        );
    }

    #[test]
    fn test_configure_failure_is_a_warning_but_setup_failure_is_not() {
        let f = fixture();
        f.runner
            .expect_prefix("meson setup", MockProcessOutput::failure(1, "ERROR: Dependency \"fmt\" not found"));

        let err = f.backend.build(&BuildOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "meson setup failed (exit code 1)");

        let g = fixture();
        std::fs::create_dir_all(g.project.path().join(BUILD_DIR)).unwrap();
        g.runner
            .expect_prefix("meson configure", MockProcessOutput::failure(1, "no change"));
        g.runner
            .expect_prefix("meson compile", MockProcessOutput::success(""));
        g.runner
            .expect_prefix("meson introspect", MockProcessOutput::success("[]"));
        g.backend.build(&BuildOptions::default()).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_build_falls_back_to_scan() {
        let f = fixture();
        let out = f.project.path().join(BUILD_DIR);
        std::fs::create_dir_all(&out).unwrap();
        f.runner
            .expect_prefix("meson configure", MockProcessOutput::success(""));
        f.runner
            .on_command("meson compile", MockProcessOutput::success(""), move |_| {
                fake_binary(&out.join("calc"));
                fake_binary(&out.join("calc.p/main.cpp.o"));
            });
        f.runner
            .expect_prefix("meson introspect", MockProcessOutput::failure(1, "not a build dir"));

        let outcome = f.backend.build(&BuildOptions::default()).unwrap();
        assert_eq!(outcome.artifacts, vec![outcome.artifact_dir.join("calc")]);
    }

    #[test]
    fn test_test_excludes_framework_suites() {
        let f = fixture();
        std::fs::create_dir_all(f.project.path().join(BUILD_DIR)).unwrap();
        f.runner.expect_prefix(
            "meson test",
            MockProcessOutput::success(
                "1/2 calc:unit / calc_tests OK 0.01s\n\n\
                 Ok:                 2   \n\
                 Expected Fail:      0   \n\
                 Fail:               0   \n\
                 Unexpected Pass:    0   \n\
                 Skipped:            1   \n\
                 Timeout:            0   \n",
            ),
        );

        let outcome = f
            .backend
            .test(&TestOptions {
                filter: Some("calc_tests".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            outcome.summary,
            Some(TestSummary {
                passed: 2,
                failed: 0,
                skipped: 1
            })
        );
        assert_eq!(
            f.runner.calls(),
            vec!["meson test -C builddir --no-suite google-benchmark --no-suite gtest --no-suite gmock --no-suite catch2 --no-suite doctest --quiet calc_tests"]
        );
    }

    #[test]
    fn test_test_failure() {
        let f = fixture();
        std::fs::create_dir_all(f.project.path().join(BUILD_DIR)).unwrap();
        f.runner
            .expect_prefix("meson test", MockProcessOutput::failure(1, "Fail: 1"));

        let err = f.backend.test(&TestOptions::default()).unwrap_err();
        assert!(matches!(
            crate::util::diagnostic::backend_error(&err),
            Some(BackendError::TestFailure { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_picks_the_only_program() {
        let f = fixture();
        let build_dir = expect_build(&f);
        let exe = build_dir.join("src/calc");
        f.runner
            .expect(&format!("{} 42", exe.display()), MockProcessOutput::failure(2, ""));

        let outcome = f
            .backend
            .run(&RunOptions {
                args: vec!["42".into()],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(outcome.exit_code, 2);
        let last = f.runner.recorded().pop().unwrap();
        assert_eq!(last.mode, OutputMode::Inherit);
        assert_eq!(last.cwd.as_deref(), Some(f.project.path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_unknown_target() {
        let f = fixture();
        expect_build(&f);

        let err = f
            .backend
            .run(&RunOptions {
                target: Some("server".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            crate::util::diagnostic::backend_error(&err),
            Some(BackendError::TargetNotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_bench_finds_single_bench_binary() {
        let f = fixture();
        let build_dir = f.project.path().join(BUILD_DIR);
        fake_binary(&build_dir.join("bench/calc_bench"));
        fake_binary(&build_dir.join("src/calc"));
        f.runner.expect(
            &build_dir.join("bench/calc_bench").display().to_string(),
            MockProcessOutput::success(""),
        );

        let outcome = f.backend.bench(&BenchOptions::default()).unwrap();
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn test_bench_none() {
        let f = fixture();
        std::fs::create_dir_all(f.project.path().join(BUILD_DIR)).unwrap();

        let err = f
            .backend
            .bench(&BenchOptions {
                target: Some("calc_bench".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            crate::util::diagnostic::backend_error(&err),
            Some(BackendError::NoBenchmarksFound { .. })
        ));
    }

    #[test]
    fn test_clean() {
        let f = fixture();
        let root = f.project.path();
        for dir in [BUILD_DIR, ".bin/native/debug", "subprojects/packagecache", "build-cross", ".cache/ci/host"] {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }

        assert_eq!(f.backend.clean(&CleanOptions::default()).removed.len(), 2);
        assert!(root.join("subprojects/packagecache").is_dir());

        let report = f.backend.clean(&CleanOptions {
            all: true,
            verbose: false,
        });
        assert_eq!(
            report.removed,
            vec![
                root.join("subprojects/packagecache"),
                root.join("build-cross"),
                root.join(".cache/ci")
            ]
        );
        assert!(f.backend.clean(&CleanOptions::default()).removed.is_empty());
    }

    #[test]
    fn test_add_installs_wrap_and_warns_on_version_mismatch() {
        let f = fixture();
        let project = f.project.path().to_path_buf();
        f.runner.on_command(
            "meson wrap install fmt",
            MockProcessOutput::success("Installed fmt version 10.2.0 revision 1"),
            move |_| {
                write_wrap(&project, "fmt", "fmt-10.2.0", "10.2.0-1");
            },
        );

        let dep = f.backend.add_dependency("fmt", "9.1.0").unwrap();
        assert_eq!(dep, Dependency::new("fmt", "10.2.0"));
        assert_eq!(f.runner.recorded()[0].cwd.as_deref(), Some(f.project.path()));

        // Second add is a no-op.
        f.backend.add_dependency("fmt", "").unwrap();
        assert_eq!(f.runner.calls().len(), 1);
    }

    #[test]
    fn test_add_unknown_wrap() {
        let f = fixture();
        f.runner.expect_prefix(
            "meson wrap install",
            MockProcessOutput::failure(1, "ERROR: Wrap nosuchlib not found in wrapdb"),
        );

        let err = f.backend.add_dependency("nosuchlib", "").unwrap_err();
        assert_eq!(err.to_string(), "dependency `nosuchlib` not found in WrapDB");
    }

    #[test]
    fn test_remove_deletes_wrap_and_extracted_dirs() {
        let f = fixture();
        let root = f.project.path();
        write_wrap(root, "fmt", "fmt-10.2.0", "10.2.0-1");
        std::fs::create_dir_all(root.join("subprojects/fmt-10.2.0/include")).unwrap();
        write_wrap(root, "gtest", "googletest-1.14.0", "1.14.0-1");

        f.backend.remove_dependency("fmt").unwrap();

        assert!(!root.join("subprojects/fmt.wrap").exists());
        assert!(!root.join("subprojects/fmt-10.2.0").exists());
        assert_eq!(
            f.backend.list_dependencies().unwrap(),
            vec![Dependency::new("gtest", "1.14.0")]
        );

        let err = f.backend.remove_dependency("fmt").unwrap_err();
        assert!(matches!(
            crate::util::diagnostic::backend_error(&err),
            Some(BackendError::DependencyNotFound { .. })
        ));
    }

    #[test]
    fn test_remove_never_leaves_subprojects() {
        let f = fixture();
        let root = f.project.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/main.cpp"), "int main() {}\n").unwrap();
        std::fs::create_dir_all(root.join("subprojects")).unwrap();
        std::fs::write(
            root.join("subprojects/foo.wrap"),
            "[wrap-file]\ndirectory = ../src\n",
        )
        .unwrap();

        f.backend.remove_dependency("foo").unwrap();

        assert!(!root.join("subprojects/foo.wrap").exists());
        assert!(root.join("src/main.cpp").is_file());
    }

    #[test]
    fn test_list_without_subprojects() {
        let f = fixture();
        assert!(f.backend.list_dependencies().unwrap().is_empty());
    }

    #[test]
    fn test_search_and_info_not_supported() {
        let f = fixture();

        let err = f.backend.search_dependencies("fmt").unwrap_err();
        let err = crate::util::diagnostic::backend_error(&err).unwrap();
        assert_eq!(err.to_string(), "meson does not support dependency search");
        assert!(err.hint().unwrap().contains("wrapdb.mesonbuild.com"));

        assert!(f.backend.dependency_info("fmt").is_err());
    }

    #[test]
    fn test_list_targets() {
        let f = fixture();
        assert!(f.backend.list_targets().is_err());

        let build_dir = f.project.path().join(BUILD_DIR);
        std::fs::create_dir_all(&build_dir).unwrap();
        f.runner.expect(
            "meson introspect --targets builddir",
            MockProcessOutput::success(introspection(&[
                ("calc", "executable", build_dir.join("calc"), None),
                ("gtest", "static library", build_dir.join("libgtest.a"), Some("gtest")),
            ])),
        );

        assert_eq!(
            f.backend.list_targets().unwrap(),
            vec![BuildTarget {
                name: "calc".into(),
                kind: "executable".into()
            }]
        );
    }

    #[test]
    fn test_generate_installs_framework_wraps() {
        let f = fixture();
        let root = TempDir::new().unwrap();
        f.runner
            .expect("meson wrap install gtest", MockProcessOutput::success(""));
        f.runner.expect(
            "meson wrap install google-benchmark",
            MockProcessOutput::failure(1, "network unreachable"),
        );
        let mut config = InitConfig::new("calc");
        config.test_framework = Some(crate::core::TestFramework::GoogleTest);
        config.bench_framework = Some(crate::core::BenchFramework::GoogleBenchmark);

        f.backend.generate_build_src(root.path(), &config).unwrap();
        f.backend.generate_build_test(root.path(), &config).unwrap();
        f.backend.generate_build_bench(root.path(), &config).unwrap();

        assert!(std::fs::read_to_string(root.path().join("meson.build"))
            .unwrap()
            .contains("subdir('tests')"));
        assert!(root.path().join("tests/meson.build").is_file());
        assert!(root.path().join("bench/meson.build").is_file());
        assert!(root.path().join("subprojects").is_dir());
        assert!(f
            .runner
            .recorded()
            .iter()
            .all(|call| call.cwd.as_deref() == Some(root.path())));
    }

    #[test]
    fn test_parse_summary_absent() {
        assert_eq!(parse_test_summary("ninja: no work to do."), None);
    }
}
