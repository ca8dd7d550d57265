//! `quay ci`: build once per toolchain listed in `quay-ci.toml`.
//!
//! A toolchain builds inside a container, or on the host for
//! `runner = "native"`, with its own cache:
//!
//! ```text
//! docker run --rm -v <root>:/workspace:ro -v .cache/ci/<name>:/build <image> bash -c <script>
//! ```
//!
//! Artifacts are then collected from the cache on the host and copied into
//! `.bin/ci/<name>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::artifacts;
use crate::builder::backend::ensure_built;
use crate::builder::context::BackendContext;
use crate::core::manifest::ci::{
    CiConfig, CiToolchain, DockerBuild, DockerConfig, DockerMode, PullPolicy, Runner,
};
use crate::core::BackendKind;
use crate::util::diagnostic::BackendError;
use crate::util::fs::{ensure_dir, glob_entries};
use crate::util::hash::Fingerprint;
use crate::util::process::{OutputMode, ProcessBuilder};
use crate::util::shell::Status;

/// Mount points inside the container.
const WORKSPACE: &str = "/workspace";
const BUILD: &str = "/build";
const OUTPUT: &str = "/out";

/// CI images are expected to carry a vcpkg checkout here.
const IMAGE_VCPKG_ROOT: &str = "/opt/vcpkg";

/// `bazel test` exit code when the pattern matched no test targets.
const NO_TESTS_FOUND: i32 = 4;

/// Hex digits of the content hash in built image tags.
const TAG_HASH_LEN: usize = 12;

/// CI build caches and artifacts, removed by every backend's `clean --all`.
pub const CI_DIRS: [&str; 2] = [".cache/ci", ".bin/ci"];

#[derive(Debug, Clone, Default)]
pub struct CiRequest {
    /// Only this toolchain, active or not.
    pub toolchain: Option<String>,
    /// Rebuild `mode = "build"` images even when the tag exists.
    pub rebuild: bool,
    pub run: bool,
    pub test: bool,
    pub bench: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct CiOutcome {
    pub toolchain: String,
    pub artifact_dir: PathBuf,
    pub artifacts: Vec<PathBuf>,
}

/// Build every selected toolchain in order, stopping at the first failure.
pub fn run_ci(
    ctx: &BackendContext,
    kind: BackendKind,
    config: &CiConfig,
    req: &CiRequest,
) -> Result<Vec<CiOutcome>> {
    let toolchains = config.select(req.toolchain.as_deref())?;

    for tc in toolchains.iter().filter(|tc| !tc.active) {
        ctx.shell.warn(format!(
            "toolchain `{}` is inactive; building it because it was named",
            tc.name
        ));
    }
    if req.toolchain.is_none() && config.inactive_count() > 0 {
        tracing::info!("skipping {} inactive toolchain(s)", config.inactive_count());
    }

    if toolchains.iter().any(|tc| tc.runner == Runner::Docker) {
        ensure_docker(ctx)?;
    }

    let mut outcomes = Vec::new();
    for tc in toolchains {
        tracing::info!("ci build for {} with the {} backend", tc.name, kind);
        outcomes.push(ToolchainBuild::new(ctx, kind, config, tc).run(req)?);
    }
    Ok(outcomes)
}

fn ensure_docker(ctx: &BackendContext) -> Result<()> {
    let unavailable = |detail: String| -> anyhow::Error {
        BackendError::configuration(
            format!("docker is not available: {}", detail),
            "install Docker, or set runner = \"native\" on the toolchain",
        )
        .into()
    };

    match ctx.run(&ctx.command("docker").arg("--version"), OutputMode::Capture) {
        Ok(output) if output.success() => {
            tracing::debug!("{}", output.stdout.trim());
            Ok(())
        }
        Ok(output) => Err(unavailable(output.stderr.trim().to_string())),
        Err(e) => Err(unavailable(format!("{:#}", e))),
    }
}

fn image_exists(ctx: &BackendContext, image: &str) -> Result<bool> {
    let cmd = ctx
        .command("docker")
        .args(["image", "inspect", "--format", "{{.Id}}", image]);
    Ok(ctx.run(&cmd, OutputMode::Capture)?.success())
}

/// Tag for a `mode = "build"` image: `quay/<name>:<hash>` over the
/// Dockerfile, the build args and the platform.
pub fn image_tag(root: &Path, name: &str, build: &DockerBuild, platform: Option<&str>) -> Result<String> {
    let mut fingerprint = Fingerprint::new();
    fingerprint.update_file(&root.join(&build.dockerfile))?;
    for (key, value) in &build.args {
        fingerprint.update_str(&format!("{}={}", key, value));
    }
    if let Some(platform) = platform {
        fingerprint.update_str(platform);
    }
    Ok(format!(
        "quay/{}:{}",
        name.to_ascii_lowercase(),
        fingerprint.finish_short(TAG_HASH_LEN)
    ))
}

/// One generated `bash` script.
struct Script {
    lines: Vec<String>,
}

impl Script {
    fn new() -> Self {
        Script {
            lines: vec!["set -e".to_string()],
        }
    }

    fn command(&mut self, words: &[String]) -> Result<()> {
        let line = join(words)?;
        self.lines.push(line);
        Ok(())
    }

    fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    fn finish(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

fn join(words: &[String]) -> Result<String> {
    shlex::try_join(words.iter().map(String::as_str)).context("build argument contains a NUL byte")
}

fn quote(word: &str) -> Result<String> {
    Ok(shlex::try_quote(word)
        .context("build argument contains a NUL byte")?
        .into_owned())
}

/// The project, build cache and vcpkg checkout as the script sees them.
struct ScriptPaths {
    source: String,
    build: String,
    vcpkg: Option<String>,
}

struct ToolchainBuild<'a> {
    ctx: &'a BackendContext,
    kind: BackendKind,
    config: &'a CiConfig,
    tc: &'a CiToolchain,
    cache_dir: PathBuf,
    out_dir: PathBuf,
}

impl<'a> ToolchainBuild<'a> {
    fn new(
        ctx: &'a BackendContext,
        kind: BackendKind,
        config: &'a CiConfig,
        tc: &'a CiToolchain,
    ) -> Self {
        ToolchainBuild {
            ctx,
            kind,
            config,
            tc,
            cache_dir: ctx.path(&ctx.layout.cache_dir).join("ci").join(&tc.name),
            out_dir: config.output_dir(&ctx.project_root).join(&tc.name),
        }
    }

    fn run(&self, req: &CiRequest) -> Result<CiOutcome> {
        ensure_dir(&self.cache_dir)?;

        let image = match self.tc.runner {
            Runner::Docker => Some(self.resolve_image(req)?),
            Runner::Native => None,
        };
        let image = image.as_deref();
        let paths = self.script_paths();
        let label = match image {
            Some(image) => format!("{} in {}", self.tc.name, image),
            None => format!("{} on the host", self.tc.name),
        };

        let script = self.build_script(&paths, req)?;
        let output = self.ctx.run_quiet_step(
            &self.script_command(image, &paths, &script),
            Status::Building,
            &label,
            req.verbose,
        )?;
        ensure_built(output, self.kind.as_str(), "build")?;

        if req.test {
            self.run_tests(image, &paths, req.verbose)?;
        }

        let found = self.built_artifacts();
        let copied = artifacts::copy_into(self.ctx, &self.out_dir, &found)?;
        self.ctx.shell.status(
            Status::Copied,
            format!(
                "{} artifact(s) to {}",
                copied.len(),
                self.ctx.display_path(&self.out_dir).display()
            ),
        );

        if req.run {
            let exe = artifacts::resolve_executable(&self.out_dir, None)?;
            self.run_artifact(image, &exe, "running")?;
        }
        if req.bench {
            let benches: Vec<PathBuf> = artifacts::executables_in(&self.out_dir)
                .into_iter()
                .filter(|path| is_bench(path))
                .collect();
            if benches.is_empty() {
                return Err(BackendError::NoBenchmarksFound {
                    searched: self.ctx.display_path(&self.out_dir).display().to_string(),
                }
                .into());
            }
            for bench in &benches {
                self.run_artifact(image, bench, "benchmarking")?;
            }
        }

        self.ctx.shell.status(
            Status::Finished,
            format!(
                "{} in {}",
                self.tc.name,
                self.ctx.display_path(&self.out_dir).display()
            ),
        );
        Ok(CiOutcome {
            toolchain: self.tc.name.clone(),
            artifact_dir: self.out_dir.clone(),
            artifacts: copied,
        })
    }

    fn docker(&self) -> Result<&'a DockerConfig> {
        self.tc.docker.as_ref().ok_or_else(|| {
            BackendError::configuration(
                format!("toolchain `{}` has no [toolchains.docker] table", self.tc.name),
                "add one, or set runner = \"native\"",
            )
            .into()
        })
    }

    fn platform(&self) -> Option<&'a str> {
        self.tc.docker.as_ref().and_then(|d| d.platform.as_deref())
    }

    fn resolve_image(&self, req: &CiRequest) -> Result<String> {
        let docker = self.docker()?;
        if docker.mode == DockerMode::Build {
            return self.build_image(docker, req);
        }

        let Some(image) = docker.image.clone() else {
            return Err(BackendError::configuration(
                format!("toolchain `{}` needs docker.image", self.tc.name),
                "name the image to use, or switch to mode = \"build\"",
            )
            .into());
        };

        let pull = match (docker.mode, docker.pull_policy) {
            (DockerMode::Local, _) | (_, PullPolicy::Never) => {
                if !image_exists(self.ctx, &image)? {
                    return Err(BackendError::configuration(
                        format!("image `{}` is not available locally", image),
                        "pull or build it first, or use mode = \"pull\" with a pull policy that allows pulling",
                    )
                    .into());
                }
                false
            }
            (_, PullPolicy::Always) => true,
            (_, PullPolicy::IfNotPresent) => !image_exists(self.ctx, &image)?,
        };

        if pull {
            let mut cmd = self.ctx.command("docker").arg("pull");
            if let Some(platform) = self.platform() {
                cmd = cmd.args(["--platform", platform]);
            }
            cmd = cmd.arg(&image);
            let output = self.ctx.run_quiet_step(
                &cmd,
                Status::Installing,
                &format!("image {}", image),
                req.verbose,
            )?;
            if !output.success() {
                return Err(BackendError::ToolFailed {
                    tool: "docker pull".to_string(),
                    action: "pulling the toolchain image",
                    code: output.code,
                    output: output.combined(),
                }
                .into());
            }
        }
        Ok(image)
    }

    fn build_image(&self, docker: &DockerConfig, req: &CiRequest) -> Result<String> {
        let Some(recipe) = &docker.build else {
            return Err(BackendError::configuration(
                format!("toolchain `{}` uses mode = \"build\" without docker.build", self.tc.name),
                "add docker.build.dockerfile",
            )
            .into());
        };

        let tag = image_tag(&self.ctx.project_root, &self.tc.name, recipe, self.platform())
            .with_context(|| format!("failed to hash the image inputs of `{}`", self.tc.name))?;
        if !req.rebuild && image_exists(self.ctx, &tag)? {
            self.ctx
                .shell
                .status(Status::Skipped, format!("image {} is up to date", tag));
            return Ok(tag);
        }

        let context = match &recipe.context {
            Some(dir) => self.ctx.path(dir),
            None => self.ctx.project_root.clone(),
        };
        let mut cmd = self
            .ctx
            .command("docker")
            .args(["build", "-f"])
            .arg(self.ctx.path(&recipe.dockerfile))
            .args(["-t", &tag]);
        if let Some(platform) = self.platform() {
            cmd = cmd.args(["--platform", platform]);
        }
        for (key, value) in &recipe.args {
            cmd = cmd.args(["--build-arg", &format!("{}={}", key, value)]);
        }
        cmd = cmd.arg(context);

        let output =
            self.ctx
                .run_quiet_step(&cmd, Status::Building, &format!("image {}", tag), req.verbose)?;
        if !output.success() {
            return Err(BackendError::ToolFailed {
                tool: "docker build".to_string(),
                action: "building the toolchain image",
                code: output.code,
                output: output.combined(),
            }
            .into());
        }
        Ok(tag)
    }

    fn script_paths(&self) -> ScriptPaths {
        match self.tc.runner {
            Runner::Docker => ScriptPaths {
                source: WORKSPACE.to_string(),
                build: BUILD.to_string(),
                vcpkg: Some(IMAGE_VCPKG_ROOT.to_string()),
            },
            Runner::Native => ScriptPaths {
                source: self.ctx.project_root.display().to_string(),
                build: self.cache_dir.display().to_string(),
                vcpkg: self.ctx.vcpkg_root.as_ref().map(|p| p.display().to_string()),
            },
        }
    }

    /// Backend variables first, then the toolchain's own, which win.
    fn env(&self, paths: &ScriptPaths) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if self.kind == BackendKind::Vcpkg {
            env.insert("VCPKG_FEATURE_FLAGS".to_string(), "manifests".to_string());
            env.insert("VCPKG_DISABLE_REGISTRY_UPDATE".to_string(), "1".to_string());
            if let Some(root) = &paths.vcpkg {
                env.insert("VCPKG_ROOT".to_string(), root.clone());
            }
        }
        env.extend(self.tc.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// `docker run` with the platform and environment; `volumes` are `-v` specs.
    fn docker_run(&self, image: &str, paths: &ScriptPaths, volumes: &[String], workdir: &str) -> ProcessBuilder {
        let mut cmd = self.ctx.command("docker").args(["run", "--rm"]);
        if let Some(platform) = self.platform() {
            cmd = cmd.args(["--platform", platform]);
        }
        for volume in volumes {
            cmd = cmd.args(["-v", volume]);
        }
        for (key, value) in self.env(paths) {
            cmd = cmd.args(["-e", &format!("{}={}", key, value)]);
        }
        cmd.args(["-w", workdir, image])
    }

    fn script_command(&self, image: Option<&str>, paths: &ScriptPaths, script: &str) -> ProcessBuilder {
        match image {
            Some(image) => {
                // Meson downloads wraps into subprojects/ of the source tree.
                let access = if self.kind == BackendKind::Meson { "" } else { ":ro" };
                let volumes = [
                    format!("{}:{}{}", self.ctx.project_root.display(), WORKSPACE, access),
                    format!("{}:{}", self.cache_dir.display(), BUILD),
                ];
                self.docker_run(image, paths, &volumes, WORKSPACE)
                    .args(["bash", "-c", script])
            }
            None => {
                let env = self.env(paths);
                self.ctx
                    .command("bash")
                    .args(["-c", script])
                    .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            }
        }
    }

    fn build_type(&self) -> String {
        self.tc.build_type(&self.config.build)
    }

    fn optimization(&self) -> &str {
        self.config.build.optimization.as_deref().unwrap_or("2")
    }

    fn jobs(&self) -> Option<String> {
        (self.config.build.jobs > 0).then(|| self.config.build.jobs.to_string())
    }

    fn build_script(&self, paths: &ScriptPaths, req: &CiRequest) -> Result<String> {
        let build = &self.config.build;
        let build_type = self.build_type();
        let extra = self.tc.build_args(build);
        let mut script = Script::new();

        match self.kind {
            BackendKind::Vcpkg => {
                let Some(vcpkg) = &paths.vcpkg else {
                    return Err(BackendError::RegistryNotConfigured {
                        registry: "vcpkg root",
                        command: "run `quay config set-vcpkg-root <path>` or set VCPKG_ROOT".into(),
                    }
                    .into());
                };
                let tree = format!("{}/cmake", paths.build);
                let mut configure = vec![
                    "cmake".to_string(),
                    "-GNinja".to_string(),
                    "-S".to_string(),
                    paths.source.clone(),
                    "-B".to_string(),
                    tree.clone(),
                    format!("-DCMAKE_BUILD_TYPE={}", build_type),
                    format!("-DCMAKE_TOOLCHAIN_FILE={}/scripts/buildsystems/vcpkg.cmake", vcpkg),
                    format!("-DVCPKG_INSTALLED_DIR={}/vcpkg_installed", paths.build),
                    format!("-DCMAKE_CXX_FLAGS=-O{}", self.optimization()),
                ];
                if req.test {
                    configure.push("-DENABLE_TESTING=ON".to_string());
                }
                if req.bench {
                    configure.push("-DENABLE_BENCHMARKS=ON".to_string());
                }
                configure.extend(self.tc.cmake_args(build).iter().cloned());
                script.command(&configure)?;

                let mut compile = vec![
                    "cmake".to_string(),
                    "--build".to_string(),
                    tree,
                    "--config".to_string(),
                    build_type,
                ];
                if let Some(jobs) = self.jobs() {
                    compile.extend(["--parallel".to_string(), jobs]);
                }
                compile.extend(extra.iter().cloned());
                script.command(&compile)?;
            }
            BackendKind::Bazel => {
                let mut cmd = self.bazel_command("build", paths);
                cmd.extend(extra.iter().cloned());
                cmd.push("//...".to_string());
                script.command(&cmd)?;
            }
            BackendKind::Meson => {
                let tree = format!("{}/meson", paths.build);
                let mut setup = vec![
                    "meson".to_string(),
                    "setup".to_string(),
                    tree.clone(),
                    paths.source.clone(),
                    format!("--buildtype={}", build_type.to_ascii_lowercase()),
                    format!("--optimization={}", self.optimization()),
                ];
                setup.extend(build.meson_args.iter().cloned());
                script.push(format!(
                    "test -f {} || {}",
                    quote(&format!("{}/build.ninja", tree))?,
                    join(&setup)?
                ));

                let mut compile = vec!["meson".to_string(), "compile".to_string(), "-C".to_string(), tree];
                if let Some(jobs) = self.jobs() {
                    compile.extend(["-j".to_string(), jobs]);
                }
                compile.extend(extra.iter().cloned());
                script.command(&compile)?;
            }
        }
        Ok(script.finish())
    }

    /// `bazel <verb>` with the cache kept under the build dir and nothing
    /// written into the (possibly read-only) workspace.
    fn bazel_command(&self, verb: &str, paths: &ScriptPaths) -> Vec<String> {
        let mode = if self.build_type() == "Debug" { "dbg" } else { "opt" };
        let mut cmd = vec![
            "bazel".to_string(),
            format!("--output_base={}/output_base", paths.build),
            verb.to_string(),
            "-c".to_string(),
            mode.to_string(),
            "--symlink_prefix=/dev/null".to_string(),
            "--lockfile_mode=off".to_string(),
            format!("--repository_cache={}/repository_cache", paths.build),
            format!("--copt=-O{}", self.optimization()),
        ];
        if let Some(jobs) = self.jobs() {
            cmd.push(format!("--jobs={}", jobs));
        }
        cmd
    }

    fn test_script(&self, paths: &ScriptPaths) -> Result<String> {
        let mut script = Script::new();
        let cmd = match self.kind {
            BackendKind::Vcpkg => vec![
                "ctest".to_string(),
                "--test-dir".to_string(),
                format!("{}/cmake", paths.build),
                "--output-on-failure".to_string(),
            ],
            BackendKind::Bazel => {
                let mut cmd = self.bazel_command("test", paths);
                cmd.push("--test_output=errors".to_string());
                cmd.push("//...".to_string());
                cmd
            }
            BackendKind::Meson => vec![
                "meson".to_string(),
                "test".to_string(),
                "-C".to_string(),
                format!("{}/meson", paths.build),
                "--print-errorlogs".to_string(),
            ],
        };
        script.command(&cmd)?;
        Ok(script.finish())
    }

    fn run_tests(&self, image: Option<&str>, paths: &ScriptPaths, verbose: bool) -> Result<()> {
        let script = self.test_script(paths)?;
        let output = self.ctx.run_quiet_step(
            &self.script_command(image, paths, &script),
            Status::Testing,
            &self.tc.name,
            verbose,
        )?;
        if output.success() {
            return Ok(());
        }
        if self.kind == BackendKind::Bazel && output.code == Some(NO_TESTS_FOUND) {
            self.ctx
                .shell
                .warn(format!("no test targets for toolchain `{}`", self.tc.name));
            return Ok(());
        }
        Err(BackendError::TestFailure {
            backend: self.kind.as_str(),
            code: output.code,
            output: output.combined(),
        }
        .into())
    }

    /// Build outputs in the host-side cache.
    fn built_artifacts(&self) -> Vec<PathBuf> {
        match self.kind {
            BackendKind::Vcpkg => artifacts::collect(&self.cache_dir.join("cmake"), 3),
            BackendKind::Meson => artifacts::collect(&self.cache_dir.join("meson"), 4),
            BackendKind::Bazel => {
                glob_entries(&self.cache_dir, "output_base/execroot/*/bazel-out/*/bin")
                    .into_iter()
                    // Host tools built for the exec configuration.
                    .filter(|dir| !dir.to_string_lossy().contains("-exec"))
                    .flat_map(|dir| artifacts::collect(&dir, 6))
                    .collect()
            }
        }
    }

    /// Run a collected executable where it was built.
    fn run_artifact(&self, image: Option<&str>, exe: &Path, action: &'static str) -> Result<()> {
        let name = exe
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.ctx
            .shell
            .status(Status::Running, format!("{} ({})", name, self.tc.name));

        let paths = self.script_paths();
        let cmd = match image {
            Some(image) => {
                let volumes = [format!("{}:{}:ro", self.out_dir.display(), OUTPUT)];
                self.docker_run(image, &paths, &volumes, OUTPUT)
                    .arg(format!("{}/{}", OUTPUT, name))
            }
            None => {
                let env = self.env(&paths);
                ProcessBuilder::new(exe)
                    .cwd(&self.ctx.project_root)
                    .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            }
        };

        let output = self.ctx.run(&cmd, OutputMode::Inherit)?;
        if !output.success() {
            return Err(BackendError::ToolFailed {
                tool: name,
                action,
                code: output.code,
                output: String::new(),
            }
            .into());
        }
        Ok(())
    }
}

fn is_bench(path: &Path) -> bool {
    let name = path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.ends_with("_bench") || name.ends_with("_benchmark")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::test_support::{fake_binary, fake_library, MockProcessOutput, MockRunner};
    use crate::util::diagnostic::backend_error;
    use crate::util::shell::Shell;

    const DOCKER_VERSION: &str = "Docker version 27.1.1, build 6312585\n";

    struct Fixture {
        project: TempDir,
        runner: Arc<MockRunner>,
        ctx: BackendContext,
    }

    fn fixture() -> Fixture {
        let project = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new());
        let ctx = BackendContext::new(project.path())
            .with_runner(runner.clone())
            .with_shell(Shell::quiet());
        Fixture {
            project,
            runner,
            ctx,
        }
    }

    impl Fixture {
        fn cache(&self, name: &str) -> PathBuf {
            self.project.path().join(".cache/ci").join(name)
        }

        fn out(&self, name: &str) -> PathBuf {
            self.project.path().join(".bin/ci").join(name)
        }

        /// Prefix of the `docker run` that executes build and test scripts.
        fn script_run(&self, name: &str, access: &str) -> String {
            format!(
                "docker run --rm -v {}:/workspace{} -v {}:/build",
                self.project.path().display(),
                access,
                self.cache(name).display()
            )
        }
    }

    fn config(text: &str) -> CiConfig {
        CiConfig::parse(text).unwrap()
    }

    /// The script line containing `word`, split back into words.
    fn script_line(command: &str, word: &str) -> Vec<String> {
        let (_, script) = command.split_once("bash -c ").unwrap();
        script
            .lines()
            .filter_map(shlex::split)
            .find(|words| words.iter().any(|w| w == word))
            .unwrap_or_else(|| panic!("no `{}` in {}", word, script))
    }

    const AMD64: &str = r#"
[build]
optimization = "3"
jobs = 4

[[toolchains]]
name = "linux-amd64"
env = { CC = "gcc-13" }
docker = { image = "ghcr.io/acme/cpp:13" }
"#;

    #[cfg(unix)]
    #[test]
    fn test_pulls_missing_image_builds_and_collects() {
        let f = fixture();
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix("docker image inspect", MockProcessOutput::failure(1, "No such image"))
            .expect("docker pull ghcr.io/acme/cpp:13", MockProcessOutput::success(""));
        let tree = f.cache("linux-amd64").join("cmake");
        f.runner.on_command(
            &f.script_run("linux-amd64", ":ro"),
            MockProcessOutput::success(""),
            move |_| {
                fake_binary(&tree.join("calc"));
                fake_library(&tree.join("libcalc_lib.a"));
                fake_binary(&tree.join("CMakeFiles/CompilerIdCXX/a.out"));
            },
        );

        let outcomes = run_ci(&f.ctx, BackendKind::Vcpkg, &config(AMD64), &CiRequest::default()).unwrap();

        assert_eq!(outcomes.len(), 1);
        let out = f.out("linux-amd64");
        assert_eq!(outcomes[0].artifact_dir, out);
        assert_eq!(outcomes[0].artifacts, vec![out.join("calc"), out.join("libcalc_lib.a")]);

        let build = f.runner.find_call("docker run").unwrap();
        assert!(build.contains("-e CC=gcc-13"));
        assert!(build.contains("-e VCPKG_ROOT=/opt/vcpkg"));
        assert!(build.contains("-w /workspace ghcr.io/acme/cpp:13 bash -c set -e\n"));
        assert!(build.contains("cmake -GNinja -S /workspace -B /build/cmake"));
        assert!(build.contains("CMAKE_TOOLCHAIN_FILE=/opt/vcpkg/scripts/buildsystems/vcpkg.cmake"));
        assert!(build.contains("-DCMAKE_CXX_FLAGS=-O3"));
        assert!(build.contains("cmake --build /build/cmake --config Release --parallel 4"));
        assert!(!build.contains("ENABLE_TESTING"));
    }

    #[test]
    fn test_present_image_is_not_pulled() {
        let f = fixture();
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix("docker image inspect", MockProcessOutput::success("sha256:abc\n"))
            .expect_prefix("docker run", MockProcessOutput::success(""));

        run_ci(&f.ctx, BackendKind::Vcpkg, &config(AMD64), &CiRequest::default()).unwrap();

        assert!(f.runner.find_call("docker pull").is_none());
        assert!(f.out("linux-amd64").is_dir());
    }

    #[test]
    fn test_local_image_must_exist() {
        let f = fixture();
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix("docker image inspect", MockProcessOutput::failure(1, "No such image"));

        let cfg = config("[[toolchains]]\nname = \"old\"\ndocker = { mode = \"local\", image = \"cpp:old\" }\n");
        let err = run_ci(&f.ctx, BackendKind::Vcpkg, &cfg, &CiRequest::default()).unwrap_err();

        assert_eq!(err.to_string(), "image `cpp:old` is not available locally");
        assert!(f.runner.find_call("docker pull").is_none());
        assert!(f.runner.find_call("docker run").is_none());
    }

    #[test]
    fn test_missing_docker_is_a_configuration_error() {
        let f = fixture();
        f.runner
            .expect("docker --version", MockProcessOutput::spawn_failure());

        let err = run_ci(&f.ctx, BackendKind::Vcpkg, &config(AMD64), &CiRequest::default()).unwrap_err();
        let err = backend_error(&err).unwrap();

        assert!(matches!(err, BackendError::Configuration { .. }));
        assert!(err.hint().unwrap().contains("runner = \"native\""));
    }

    const ARM64: &str = r#"
[[toolchains]]
name = "Linux-ARM64"
docker = { mode = "build", platform = "linux/arm64", build = { dockerfile = "ci/Dockerfile", args = { UBUNTU = "24.04" } } }
"#;

    fn write_dockerfile(f: &Fixture, text: &str) {
        std::fs::create_dir_all(f.project.path().join("ci")).unwrap();
        std::fs::write(f.project.path().join("ci/Dockerfile"), text).unwrap();
    }

    #[test]
    fn test_image_tag_follows_dockerfile_and_args() {
        let f = fixture();
        write_dockerfile(&f, "FROM ubuntu:24.04\n");
        let cfg = config(ARM64);
        let tc = &cfg.toolchains[0];
        let docker = tc.docker.as_ref().unwrap();
        let recipe = docker.build.as_ref().unwrap();
        let tag = |recipe: &DockerBuild| {
            image_tag(f.project.path(), &tc.name, recipe, docker.platform.as_deref()).unwrap()
        };

        let first = tag(recipe);
        assert!(first.starts_with("quay/linux-arm64:"));
        assert_eq!(first.len(), "quay/linux-arm64:".len() + TAG_HASH_LEN);
        assert_eq!(tag(recipe), first);

        let mut other_args = recipe.clone();
        other_args.args.insert("UBUNTU".into(), "22.04".into());
        assert_ne!(tag(&other_args), first);

        write_dockerfile(&f, "FROM ubuntu:24.04\nRUN apt-get install -y ninja-build\n");
        assert_ne!(tag(recipe), first);
    }

    #[test]
    fn test_build_mode_builds_once_per_content() {
        let f = fixture();
        write_dockerfile(&f, "FROM ubuntu:24.04\n");
        let cfg = config(ARM64);
        let recipe = cfg.toolchains[0].docker.as_ref().unwrap().build.as_ref().unwrap();
        let tag = image_tag(f.project.path(), "Linux-ARM64", recipe, Some("linux/arm64")).unwrap();

        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix_times("docker image inspect", MockProcessOutput::failure(1, ""), 1)
            .expect_prefix("docker image inspect", MockProcessOutput::success("sha256:abc\n"))
            .expect_prefix("docker build", MockProcessOutput::success(""))
            .expect_prefix("docker run", MockProcessOutput::success(""));

        run_ci(&f.ctx, BackendKind::Meson, &cfg, &CiRequest::default()).unwrap();
        run_ci(&f.ctx, BackendKind::Meson, &cfg, &CiRequest::default()).unwrap();

        let builds: Vec<String> = f
            .runner
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("docker build"))
            .collect();
        assert_eq!(
            builds,
            vec![format!(
                "docker build -f {} -t {} --platform linux/arm64 --build-arg UBUNTU=24.04 {}",
                f.project.path().join("ci/Dockerfile").display(),
                tag,
                f.project.path().display()
            )]
        );

        let run = f.runner.find_call("docker run").unwrap();
        assert!(run.starts_with("docker run --rm --platform linux/arm64 -v "));
        // Meson writes wraps into the source tree.
        assert!(run.contains(&format!("{}:/workspace -v", f.project.path().display())));
        assert!(run.contains(&format!(" -w /workspace {} bash -c", tag)));

        f.runner.verify().unwrap();
    }

    #[test]
    fn test_rebuild_ignores_existing_tag() {
        let f = fixture();
        write_dockerfile(&f, "FROM ubuntu:24.04\n");
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix_times("docker build", MockProcessOutput::success(""), 1)
            .expect_prefix("docker run", MockProcessOutput::success(""));

        let req = CiRequest {
            rebuild: true,
            ..Default::default()
        };
        run_ci(&f.ctx, BackendKind::Meson, &config(ARM64), &req).unwrap();

        assert!(f.runner.find_call("docker image inspect").is_none());
        f.runner.verify().unwrap();
    }

    #[test]
    fn test_failed_image_build() {
        let f = fixture();
        write_dockerfile(&f, "FROM ubuntu:24.04\n");
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix("docker image inspect", MockProcessOutput::failure(1, ""))
            .expect_prefix("docker build", MockProcessOutput::failure(1, "failed to solve"));

        let err = run_ci(&f.ctx, BackendKind::Meson, &config(ARM64), &CiRequest::default()).unwrap_err();

        match backend_error(&err) {
            Some(BackendError::ToolFailed { tool, output, .. }) => {
                assert_eq!(tool, "docker build");
                assert!(output.contains("failed to solve"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(f.runner.find_call("docker run").is_none());
    }

    #[test]
    fn test_native_runner_builds_on_the_host() {
        let f = fixture();
        f.runner.expect_prefix("bash -c", MockProcessOutput::success(""));

        let cfg = config(
            "[build]\ntype = \"debug\"\nmeson_args = [\"-Dwerror=true\"]\n\n[[toolchains]]\nname = \"host\"\nrunner = \"native\"\nenv = { CXX = \"clang++\" }\n",
        );
        run_ci(&f.ctx, BackendKind::Meson, &cfg, &CiRequest::default()).unwrap();

        let calls = f.runner.recorded();
        assert_eq!(calls.len(), 1, "no docker calls: {:?}", f.runner.calls());
        let call = &calls[0];
        let tree = f.cache("host").join("meson").display().to_string();
        let root = f.project.path().display().to_string();

        assert_eq!(
            script_line(&call.command, "setup"),
            [
                "test".to_string(),
                "-f".to_string(),
                format!("{}/build.ninja", tree),
                "||".to_string(),
                "meson".to_string(),
                "setup".to_string(),
                tree.clone(),
                root,
                "--buildtype=debug".to_string(),
                "--optimization=2".to_string(),
                "-Dwerror=true".to_string(),
            ]
        );
        assert_eq!(
            script_line(&call.command, "compile"),
            ["meson", "compile", "-C", tree.as_str()]
        );
        assert!(call.env.contains(&("CXX".to_string(), "clang++".to_string())));
        assert_eq!(call.cwd.as_deref(), Some(f.project.path()));
    }

    #[test]
    fn test_native_vcpkg_needs_a_root() {
        let f = fixture();
        let cfg = config("[[toolchains]]\nname = \"host\"\nrunner = \"native\"\n");

        let err = run_ci(&f.ctx, BackendKind::Vcpkg, &cfg, &CiRequest::default()).unwrap_err();

        assert!(matches!(
            backend_error(&err),
            Some(BackendError::RegistryNotConfigured { .. })
        ));
        assert!(f.runner.calls().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_bazel_keeps_outputs_in_the_cache() {
        let f = fixture();
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix("docker image inspect", MockProcessOutput::success("sha256:abc\n"));
        let out = f.cache("linux-amd64").join("output_base/execroot/_main/bazel-out");
        f.runner.on_command("docker run", MockProcessOutput::success(""), move |_| {
            fake_binary(&out.join("k8-opt/bin/src/calc"));
            fake_binary(&out.join("k8-opt-exec-ST-1/bin/external/protoc"));
            fake_binary(&out.join("k8-opt-exec-ST-1/bin/tools/gen"));
        });

        let outcomes = run_ci(&f.ctx, BackendKind::Bazel, &config(AMD64), &CiRequest::default()).unwrap();

        assert_eq!(outcomes[0].artifacts, vec![f.out("linux-amd64").join("calc")]);
        let run = f.runner.find_call("docker run").unwrap();
        assert_eq!(
            script_line(&run, "bazel"),
            [
                "bazel",
                "--output_base=/build/output_base",
                "build",
                "-c",
                "opt",
                "--symlink_prefix=/dev/null",
                "--lockfile_mode=off",
                "--repository_cache=/build/repository_cache",
                "--copt=-O3",
                "--jobs=4",
                "//...",
            ]
        );
        assert!(!run.contains("VCPKG"));
    }

    #[test]
    fn test_failing_tests() {
        let f = fixture();
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix("docker image inspect", MockProcessOutput::success("sha256:abc\n"))
            .expect_contains("ctest --test-dir /build/cmake", MockProcessOutput::failure(8, "1 test failed"))
            .expect_prefix("docker run", MockProcessOutput::success(""));

        let req = CiRequest {
            test: true,
            ..Default::default()
        };
        let err = run_ci(&f.ctx, BackendKind::Vcpkg, &config(AMD64), &req).unwrap_err();

        match backend_error(&err) {
            Some(BackendError::TestFailure { backend, code, .. }) => {
                assert_eq!(*backend, "vcpkg");
                assert_eq!(*code, Some(8));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let build = f.runner.find_call("docker run").unwrap();
        assert!(build.contains("-DENABLE_TESTING=ON"));
    }

    #[test]
    fn test_bazel_without_test_targets_is_not_a_failure() {
        let f = fixture();
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix("docker image inspect", MockProcessOutput::success("sha256:abc\n"))
            .expect_contains(" test -c opt", MockProcessOutput::failure(NO_TESTS_FOUND, "No test targets were found"))
            .expect_prefix("docker run", MockProcessOutput::success(""));

        let req = CiRequest {
            test: true,
            ..Default::default()
        };
        run_ci(&f.ctx, BackendKind::Bazel, &config(AMD64), &req).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_run_and_bench_inside_the_image() {
        let f = fixture();
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix("docker image inspect", MockProcessOutput::success("sha256:abc\n"));
        let out = f.out("linux-amd64");
        let artifact_run = format!("docker run --rm -v {}:/out:ro", out.display());
        f.runner
            .expect_prefix(&artifact_run, MockProcessOutput::success(""));
        let tree = f.cache("linux-amd64").join("cmake");
        f.runner.on_command("docker run", MockProcessOutput::success(""), move |_| {
            fake_binary(&tree.join("calc"));
            fake_binary(&tree.join("bench/calc_bench"));
        });

        let req = CiRequest {
            run: true,
            bench: true,
            ..Default::default()
        };
        run_ci(&f.ctx, BackendKind::Vcpkg, &config(AMD64), &req).unwrap();

        let runs: Vec<String> = f
            .runner
            .calls()
            .into_iter()
            .filter(|c| c.starts_with(&artifact_run))
            .collect();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].ends_with("-w /out ghcr.io/acme/cpp:13 /out/calc"));
        assert!(runs[1].ends_with("/out/calc_bench"));
        assert!(runs[0].contains("-e CC=gcc-13"));

        let build = f.runner.find_call(&f.script_run("linux-amd64", ":ro")).unwrap();
        assert!(build.contains("-DENABLE_BENCHMARKS=ON"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_fails_the_run() {
        let f = fixture();
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix("docker image inspect", MockProcessOutput::success("sha256:abc\n"));
        let out = f.out("linux-amd64");
        f.runner.expect_prefix(
            &format!("docker run --rm -v {}:/out:ro", out.display()),
            MockProcessOutput::failure(3, ""),
        );
        let tree = f.cache("linux-amd64").join("cmake");
        f.runner.on_command("docker run", MockProcessOutput::success(""), move |_| {
            fake_binary(&tree.join("calc"));
        });

        let req = CiRequest {
            run: true,
            ..Default::default()
        };
        let err = run_ci(&f.ctx, BackendKind::Vcpkg, &config(AMD64), &req).unwrap_err();

        assert_eq!(err.to_string(), "`calc` failed while running (exit code 3)");
    }

    #[test]
    fn test_bench_without_benchmarks() {
        let f = fixture();
        f.runner
            .expect("docker --version", MockProcessOutput::success(DOCKER_VERSION))
            .expect_prefix("docker image inspect", MockProcessOutput::success("sha256:abc\n"))
            .expect_prefix("docker run", MockProcessOutput::success(""));

        let req = CiRequest {
            bench: true,
            ..Default::default()
        };
        let err = run_ci(&f.ctx, BackendKind::Vcpkg, &config(AMD64), &req).unwrap_err();

        assert!(matches!(
            backend_error(&err),
            Some(BackendError::NoBenchmarksFound { .. })
        ));
    }

    #[test]
    fn test_named_toolchain_overrides_active_flag() {
        let f = fixture();
        f.runner.expect_prefix("bash -c", MockProcessOutput::success(""));
        let cfg = config(
            "[[toolchains]]\nname = \"a\"\nrunner = \"native\"\n\n[[toolchains]]\nname = \"b\"\nrunner = \"native\"\nactive = false\n",
        );

        let all = run_ci(&f.ctx, BackendKind::Meson, &cfg, &CiRequest::default()).unwrap();
        assert_eq!(all.iter().map(|o| o.toolchain.as_str()).collect::<Vec<_>>(), ["a"]);

        let req = CiRequest {
            toolchain: Some("b".to_string()),
            ..Default::default()
        };
        let named = run_ci(&f.ctx, BackendKind::Meson, &cfg, &req).unwrap();
        assert_eq!(named[0].toolchain, "b");
        assert!(f.out("b").is_dir());
    }

    #[test]
    fn test_script_quotes_arguments() {
        let f = fixture();
        f.runner.expect_prefix("bash -c", MockProcessOutput::success(""));
        let cfg = config(
            "[build]\nbuild_args = [\"--summary\", \"it's fine\"]\n\n[[toolchains]]\nname = \"host\"\nrunner = \"native\"\n",
        );

        run_ci(&f.ctx, BackendKind::Meson, &cfg, &CiRequest::default()).unwrap();

        let call = f.runner.find_call("bash -c").unwrap();
        let tree = f.cache("host").join("meson").display().to_string();
        assert_eq!(
            script_line(&call, "compile"),
            ["meson", "compile", "-C", tree.as_str(), "--summary", "it's fine"]
        );
    }
}
