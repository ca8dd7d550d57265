//! `quay init` command

use anyhow::{bail, Result};

use crate::cli::InitArgs;
use crate::GlobalOptions;
use quay::core::InitConfig;
use quay::util::fs::ensure_dir;
use quay::util::shell::Status;
use quay::BackendKind;

pub fn execute(args: InitArgs, opts: &GlobalOptions) -> Result<i32> {
    let root = opts
        .project_root
        .join(args.path.clone().unwrap_or_else(|| args.name.clone().into()));

    if let Some(existing) = BackendKind::detect(&root) {
        bail!(
            "{} already contains a {} project ({})",
            root.display(),
            existing,
            existing.marker_file()
        );
    }

    let kind = opts.backend.unwrap_or(BackendKind::Vcpkg);
    let config = InitConfig {
        name: args.name,
        is_library: args.lib,
        cpp_standard: args.cpp_standard,
        test_framework: args.test_framework,
        bench_framework: args.bench_framework,
        dependencies: args.dependencies,
        ..InitConfig::new("")
    };

    ensure_dir(&root)?;
    let backend = quay::create_backend(kind, opts.context_for(root.clone()));

    backend.generate_gitignore(&root)?;
    backend.generate_build_src(&root, &config)?;
    if config.test_framework.is_some() {
        backend.generate_build_test(&root, &config)?;
    }
    if config.bench_framework.is_some() {
        backend.generate_build_bench(&root, &config)?;
    }

    opts.shell.status(
        Status::Finished,
        format!("{} project `{}` in {}", kind, config.name, root.display()),
    );
    Ok(0)
}
