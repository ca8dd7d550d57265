//! CMake + vcpkg backend.
//!
//! Builds configure into `.cache/native/<dir-label>` and share one
//! `vcpkg_installed` tree so dependencies are built once per project:
//!
//! ```text
//! .cache/native/
//! ├── debug/ release/ O2-asan/ ...   # CMake binary dirs
//! ├── test/ bench/                   # ENABLE_TESTING / ENABLE_BENCHMARKS trees
//! └── vcpkg_installed/
//! ```

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
use crate::core::manifest::VcpkgManifest;
use crate::core::project::cmake_project_name;
use crate::core::{
    BackendKind, BenchOptions, BuildOptions, CleanOptions, Dependency, DependencyInfo, InitConfig,
    Profile, RunOptions, TestOptions,
};
use crate::sources::{PackageRegistry, VcpkgPorts};
use crate::util::diagnostic::BackendError;
use crate::util::fs::{ensure_dir, read_to_string, write_string};
use crate::util::process::{OutputMode, ProcessBuilder};
use crate::util::shell::Status;

const NAME: &str = "vcpkg";

/// Suites that belong to test frameworks pulled in as dependencies.
const THIRD_PARTY_TESTS: &str = "^(google-benchmark|gtest|gmock|catch2|doctest)([_-]|$)";

/// Arguments of the last successful configure, kept inside the build tree.
const CONFIGURE_STAMP: &str = ".quay-configure";

/// Build trees `clean` knows about besides the per-profile ones.
const AUX_BUILD_DIRS: [&str; 2] = ["test", "bench"];

/// Extra leftovers removed by `clean --all`.
const ALL_CLEAN_DIRS: [&str; 5] = [
    ci::CI_DIRS[0],
    ci::CI_DIRS[1],
    "out",
    "cmake-build-debug",
    "cmake-build-release",
];

fn cmake_install_hint() -> String {
    if cfg!(target_os = "macos") {
        "Install CMake: brew install cmake, or https://cmake.org/download/".to_string()
    } else if cfg!(target_os = "windows") {
        "Install CMake: winget install Kitware.CMake, or https://cmake.org/download/".to_string()
    } else {
        "Install CMake: apt install cmake, pip install cmake, or https://cmake.org/download/"
            .to_string()
    }
}

/// CMake project driven through vcpkg manifest mode.
#[derive(Debug)]
pub struct VcpkgBackend {
    ctx: BackendContext,
}

impl VcpkgBackend {
    pub fn new(ctx: BackendContext) -> Self {
        VcpkgBackend { ctx }
    }

    fn manifest_path(&self) -> PathBuf {
        self.ctx.path("vcpkg.json")
    }

    fn load_manifest(&self) -> Result<VcpkgManifest> {
        let path = self.manifest_path();
        if !path.is_file() {
            return Err(BackendError::ManifestNotFound { path }.into());
        }
        VcpkgManifest::parse(&read_to_string(&path)?)
    }

    fn save_manifest(&self, manifest: &VcpkgManifest) -> Result<()> {
        write_string(&self.manifest_path(), &manifest.to_json_string())
    }

    fn ports(&self) -> Result<VcpkgPorts> {
        VcpkgPorts::open(self.ctx.vcpkg_root.as_deref())
    }

    /// Name from `project(...)` in CMakeLists.txt; test and bench targets derive from it.
    fn project_name(&self) -> String {
        std::fs::read_to_string(self.ctx.path("CMakeLists.txt"))
            .ok()
            .and_then(|text| cmake_project_name(&text))
            .unwrap_or_else(|| "project".to_string())
    }

    /// Build tree relative to the project root, e.g. `.cache/native/debug`.
    fn build_dir(&self, name: &str) -> PathBuf {
        Path::new(&self.ctx.layout.cache_dir)
            .join(&self.ctx.layout.platform)
            .join(name)
    }

    fn with_env(&self, cmd: ProcessBuilder) -> ProcessBuilder {
        let cmd = cmd.envs([
            ("VCPKG_FEATURE_FLAGS", "manifests"),
            ("VCPKG_DISABLE_REGISTRY_UPDATE", "1"),
        ]);
        match &self.ctx.vcpkg_root {
            Some(root) => cmd.env("VCPKG_ROOT", root.to_string_lossy()),
            None => cmd,
        }
    }

    fn cmake(&self) -> ProcessBuilder {
        self.with_env(self.ctx.command("cmake"))
    }

    fn configure_args(
        &self,
        build_dir: &Path,
        build_type: &str,
        profile: Option<&Profile>,
        toolchain: Option<&str>,
        extra: &[&str],
    ) -> Vec<String> {
        let mut args = Vec::new();
        let has_presets = self.ctx.path("CMakePresets.json").is_file();

        if has_presets {
            args.push("--preset=default".to_string());
        }
        args.push("-B".to_string());
        args.push(build_dir.display().to_string());

        if !has_presets {
            match &self.ctx.vcpkg_root {
                Some(root) => args.push(format!(
                    "-DCMAKE_TOOLCHAIN_FILE={}",
                    root.join("scripts/buildsystems/vcpkg.cmake").display()
                )),
                None => self
                    .ctx
                    .shell
                    .warn("vcpkg root not configured; configuring without the vcpkg toolchain"),
            }
        }

        args.push(format!("-DCMAKE_BUILD_TYPE={}", build_type));
        args.push(format!(
            "-DVCPKG_INSTALLED_DIR={}",
            self.ctx.cache_root().join("vcpkg_installed").display()
        ));

        if let Some(profile) = profile {
            let mut compile: Vec<String> = profile.opt_level.iter().map(|l| l.flag()).collect();
            let mut link = Vec::new();
            if let Some(san) = profile.sanitizer {
                compile.extend(san.compile_flags());
                link.extend(san.link_flags());
            }
            if !compile.is_empty() {
                let flags = compile.join(" ");
                args.push(format!("-DCMAKE_C_FLAGS={}", flags));
                args.push(format!("-DCMAKE_CXX_FLAGS={}", flags));
            }
            if !link.is_empty() {
                let flags = link.join(" ");
                args.push(format!("-DCMAKE_EXE_LINKER_FLAGS={}", flags));
                args.push(format!("-DCMAKE_SHARED_LINKER_FLAGS={}", flags));
            }
        }

        if let Some(toolchain) = toolchain {
            args.push(format!(
                "-DVCPKG_CHAINLOAD_TOOLCHAIN_FILE={}",
                self.ctx.path(toolchain).display()
            ));
        }

        args.extend(extra.iter().map(|s| s.to_string()));
        args
    }

    /// Configure `build_dir` unless its cache was made with the same arguments.
    ///
    /// CMake keeps cached values such as the toolchain file over later `-D`
    /// flags, so a changed argument list starts from an empty cache.
    fn configure(&self, build_dir: &Path, args: Vec<String>, verbose: bool) -> Result<()> {
        let dir = self.ctx.path(build_dir);
        let stamp = dir.join(CONFIGURE_STAMP);
        let recorded = args.join("\n");

        if dir.join("CMakeCache.txt").is_file() {
            if std::fs::read_to_string(&stamp).is_ok_and(|previous| previous == recorded) {
                tracing::debug!("{} already configured", build_dir.display());
                return Ok(());
            }
            tracing::info!("configure arguments for {} changed", build_dir.display());
            for stale in ["CMakeCache.txt", "CMakeFiles"] {
                self.ctx.remove_best_effort(&dir.join(stale));
            }
        }
        ensure_dir(&dir)?;

        let cmd = self.cmake().args(args);
        let output = self.ctx.run_quiet_step(
            &cmd,
            Status::Configuring,
            &format!("{}", build_dir.display()),
            verbose,
        )?;
        ensure_built(output, NAME, "configure")?;
        write_string(&stamp, &recorded)
    }

    fn build_target(&self, build_dir: &Path, target: &str, jobs: usize) -> Result<()> {
        let cmd = self
            .cmake()
            .args(["--build", &build_dir.display().to_string(), "--target", target])
            .args(["--parallel", &jobs.to_string()]);
        let output = self.ctx.run(&cmd, OutputMode::Stream)?;
        ensure_built(output, NAME, "build")?;
        Ok(())
    }

    fn targets_in(&self, build_dir: &Path) -> Result<Vec<BuildTarget>> {
        let dir = build_dir.display().to_string();
        if self.ctx.path(build_dir).join("build.ninja").is_file() {
            let cmd = self.ctx.command("ninja").args(["-C", &dir, "-t", "targets", "all"]);
            let output = self.ctx.run(&cmd, OutputMode::Capture)?;
            return Ok(parse_ninja_targets(&output.stdout));
        }

        let cmd = self.cmake().args(["--build", &dir, "--target", "help"]);
        let output = self.ctx.run(&cmd, OutputMode::Capture)?;
        Ok(parse_make_targets(&output.stdout))
    }
}

impl BuildBackend for VcpkgBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vcpkg
    }

    fn context(&self) -> &BackendContext {
        &self.ctx
    }

    fn availability(&self) -> Result<BackendAvailability> {
        check_tool(&self.ctx, "cmake", ">=3.21", &cmake_install_hint())
    }

    fn build(&self, opts: &BuildOptions) -> Result<BuildOutcome> {
        let profile = opts.profile();
        let build_dir = self.build_dir(&profile.dir_name());
        let build_type = profile.cmake_build_type();

        if opts.clean {
            self.ctx.remove_best_effort(&self.ctx.path(&build_dir));
            self.ctx.remove_best_effort(&self.ctx.artifact_dir(&profile));
        }

        self.ctx.shell.status(
            Status::Building,
            format!("{} [{}] ({})", self.project_name(), profile.label(), build_type),
        );
        tracing::info!("building {} into {}", profile.label(), build_dir.display());

        let args = self.configure_args(
            &build_dir,
            build_type,
            Some(&profile),
            opts.toolchain.as_deref(),
            &[],
        );
        self.configure(&build_dir, args, opts.verbose)?;

        let mut cmd = self.cmake().args([
            "--build",
            &build_dir.display().to_string(),
            "--config",
            build_type,
        ]);
        if opts.verbose {
            cmd = cmd.arg("--verbose");
        }
        cmd = cmd.args(["--parallel", &opts.job_count().to_string()]);
        if let Some(target) = &opts.target {
            cmd = cmd.args(["--target", target]);
        }
        let output = self.ctx.run(&cmd, OutputMode::Stream)?;
        ensure_built(output, NAME, "build")?;

        let found = artifacts::collect(&self.ctx.path(&build_dir), 3);
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
        let build_dir = self.build_dir("test");
        let args = self.configure_args(
            &build_dir,
            "Debug",
            None,
            opts.toolchain.as_deref(),
            &["-DENABLE_TESTING=ON"],
        );
        self.configure(&build_dir, args, opts.verbose)?;

        let jobs = BuildOptions::default().job_count();
        self.build_target(&build_dir, &format!("{}_tests", self.project_name()), jobs)?;

        let mut cmd = self.with_env(self.ctx.command("ctest")).args([
            "--test-dir",
            &build_dir.display().to_string(),
            "--output-on-failure",
        ]);
        if opts.verbose {
            cmd = cmd.arg("--verbose");
        }
        if let Some(filter) = &opts.filter {
            cmd = cmd.args(["-R", filter]);
        }
        cmd = cmd.args(["-E", THIRD_PARTY_TESTS]);

        self.ctx.shell.status(Status::Testing, self.project_name());
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
            summary: parse_ctest_summary(&output.stdout),
        })
    }

    fn run(&self, opts: &RunOptions) -> Result<RunOutcome> {
        let outcome = self.build(&opts.build_options())?;
        let exe = artifacts::resolve_executable(&outcome.artifact_dir, opts.target.as_deref())?;

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
        let build_dir = self.build_dir("bench");
        let args = self.configure_args(
            &build_dir,
            "Release",
            None,
            opts.toolchain.as_deref(),
            &["-DENABLE_BENCHMARKS=ON"],
        );
        self.configure(&build_dir, args, opts.verbose)?;

        let target = opts
            .target
            .clone()
            .unwrap_or_else(|| format!("{}_bench", self.project_name()));
        self.build_target(&build_dir, &target, BuildOptions::default().job_count())?;

        let exe_name = format!("{}{}", target, std::env::consts::EXE_SUFFIX);
        let abs = self.ctx.path(&build_dir);
        let candidates = [abs.join("bench").join(&exe_name), abs.join(&exe_name)];
        let Some(exe) = candidates.iter().find(|p| p.is_file()) else {
            return Err(BackendError::NoBenchmarksFound {
                searched: format!("{}/bench and {}", build_dir.display(), build_dir.display()),
            }
            .into());
        };

        self.ctx.shell.status(Status::Running, &target);
        let output = self.ctx.run(
            &ProcessBuilder::new(exe).cwd(&self.ctx.project_root),
            OutputMode::Inherit,
        )?;
        Ok(RunOutcome {
            exit_code: output.exit_code(),
        })
    }

    fn clean(&self, opts: &CleanOptions) -> CleanReport {
        let mut report = CleanReport::default();
        report.remove(&self.ctx, &self.ctx.artifact_root());

        let cache = self.ctx.cache_root();
        let dirs = Profile::all_dir_names()
            .into_iter()
            .chain(AUX_BUILD_DIRS.iter().map(|s| s.to_string()));
        report.remove_all(&self.ctx, dirs.map(|name| cache.join(name)));

        if opts.all {
            report.remove(&self.ctx, &cache);
            report.remove_all(&self.ctx, ALL_CLEAN_DIRS.iter().map(|d| self.ctx.path(d)));
            report.remove_all(
                &self.ctx,
                crate::util::fs::glob_entries(&self.ctx.project_root, "build-*"),
            );
        }
        report
    }

    fn list_targets(&self) -> Result<Vec<BuildTarget>> {
        let cache = self.ctx.cache_root();
        let mut dirs: Vec<String> = std::fs::read_dir(&cache)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().is_dir())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|name| name != "vcpkg_installed")
                    .collect()
            })
            .unwrap_or_default();
        dirs.sort();

        for name in dirs {
            let build_dir = self.build_dir(&name);
            match self.targets_in(&build_dir) {
                Ok(targets) if !targets.is_empty() => return Ok(targets),
                Ok(_) => {}
                Err(e) => tracing::debug!("no targets from {}: {:#}", build_dir.display(), e),
            }
        }

        Err(BackendError::configuration(
            "no configured build directory found",
            "run `quay build` first",
        )
        .into())
    }

    fn add_dependency(&self, name: &str, version: &str) -> Result<Dependency> {
        let mut manifest = self.load_manifest()?;
        let ports = self.ports()?;
        if !ports.contains(name) {
            return Err(BackendError::dependency_not_found(name, ports.display_name()).into());
        }

        let version = if version.is_empty() {
            ports.latest_version(name)?
        } else {
            version.to_string()
        };

        if !manifest.has_baseline() {
            self.ctx.shell.warn(
                "vcpkg.json has no builtin-baseline; version constraints are ignored until \
                 `vcpkg x-update-baseline --add-initial-baseline` is run",
            );
        }

        manifest.set_dependency(name, &version);
        self.save_manifest(&manifest)?;
        self.ctx
            .shell
            .status(Status::Added, format!("{} >= {} to vcpkg.json", name, version));

        if let Some(usage) = ports.usage(name) {
            self.ctx.shell.note(format!("usage for {}:", name));
            self.ctx.shell.raw(usage.trim());
        }

        Ok(Dependency::new(name, version))
    }

    fn remove_dependency(&self, name: &str) -> Result<()> {
        let mut manifest = self.load_manifest()?;
        if !manifest.remove_dependency(name) {
            return Err(BackendError::dependency_not_found(name, "vcpkg.json").into());
        }
        self.save_manifest(&manifest)?;
        self.ctx
            .shell
            .status(Status::Removed, format!("{} from vcpkg.json", name));
        Ok(())
    }

    fn list_dependencies(&self) -> Result<Vec<Dependency>> {
        if !self.manifest_path().is_file() {
            return Ok(Vec::new());
        }
        Ok(self.load_manifest()?.dependencies())
    }

    fn search_dependencies(&self, query: &str) -> Result<Vec<Dependency>> {
        self.ports()?.search(query)
    }

    fn dependency_info(&self, name: &str) -> Result<DependencyInfo> {
        self.ports()?.info(name)
    }

    fn generate_build_src(&self, root: &Path, config: &InitConfig) -> Result<()> {
        let manifest_name = config.name.to_lowercase().replace('_', "-");
        let mut manifest = VcpkgManifest::new_project(&manifest_name, &config.version);
        for dep in &config.dependencies {
            manifest.set_dependency(dep, "");
        }
        if let Some(framework) = config.test_framework {
            manifest.set_dependency(framework.vcpkg_port(), "");
        }
        if let Some(framework) = config.bench_framework {
            manifest.set_dependency(framework.vcpkg_port(), "");
        }
        write_string(&root.join("vcpkg.json"), &manifest.to_json_string())?;

        let scaffolder = &self.ctx.scaffolder;
        write_string(
            &root.join("CMakePresets.json"),
            &scaffolder.render(ScaffoldFile::CMakePresets, config),
        )?;
        write_string(
            &root.join("CMakeLists.txt"),
            &scaffolder.render(ScaffoldFile::CMakeLists, config),
        )
    }

    fn generate_build_test(&self, root: &Path, config: &InitConfig) -> Result<()> {
        write_string(
            &root.join("tests/CMakeLists.txt"),
            &self.ctx.scaffolder.render(ScaffoldFile::CMakeTests, config),
        )
    }

    fn generate_build_bench(&self, root: &Path, config: &InitConfig) -> Result<()> {
        write_string(
            &root.join("bench/CMakeLists.txt"),
            &self.ctx.scaffolder.render(ScaffoldFile::CMakeBench, config),
        )
    }
}

/// `name: RULE` lines from `ninja -t targets all`, keeping linked targets only.
fn parse_ninja_targets(output: &str) -> Vec<BuildTarget> {
    output
        .lines()
        .filter_map(|line| {
            let (name, rule) = line.trim().split_once(':')?;
            let name = name.trim();
            if name.is_empty() || name.contains('/') {
                return None;
            }
            let rule = rule.trim().to_ascii_uppercase();
            let kind = if rule.contains("EXECUTABLE_LINKER") {
                "executable"
            } else if rule.contains("LIBRARY_LINKER") {
                "library"
            } else {
                return None;
            };
            Some(BuildTarget {
                name: name.to_string(),
                kind: kind.to_string(),
            })
        })
        .collect()
}

/// `... name` lines from the Makefile generator's `help` target.
fn parse_make_targets(output: &str) -> Vec<BuildTarget> {
    const INTERNAL: &[&str] = &[
        "all",
        "clean",
        "depend",
        "help",
        "install",
        "install/local",
        "install/strip",
        "list_install_components",
        "package",
        "package_source",
        "rebuild_cache",
        "edit_cache",
        "test",
    ];

    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("... "))
        .filter_map(|rest| rest.split_whitespace().next())
        .filter(|name| !INTERNAL.contains(name))
        .filter(|name| ![".o", ".i", ".s"].iter().any(|ext| name.ends_with(ext)))
        .map(|name| BuildTarget {
            name: name.to_string(),
            kind: "target".to_string(),
        })
        .collect()
}

fn ctest_summary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d+% tests passed, (\d+) tests? failed out of (\d+)").expect("valid regex")
    })
}

fn parse_ctest_summary(output: &str) -> Option<TestSummary> {
    let caps = ctest_summary_re().captures(output)?;
    let failed: usize = caps[1].parse().ok()?;
    let total: usize = caps[2].parse().ok()?;
    Some(TestSummary {
        passed: total.saturating_sub(failed),
        failed,
        skipped: 0,
    })
}
