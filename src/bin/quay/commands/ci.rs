//! `quay ci` command

use anyhow::Result;

use crate::cli::CiArgs;
use crate::GlobalOptions;
use quay::builder::{run_ci, CiRequest};
use quay::core::manifest::CiConfig;

pub fn execute(args: CiArgs, opts: &GlobalOptions) -> Result<i32> {
    let config = CiConfig::load(&opts.project_root)?;
    let kind = match opts.backend {
        Some(kind) => kind,
        None => quay::detect_backend(&opts.project_root)?,
    };
    let ctx = opts.context_for(opts.project_root.clone());

    let req = CiRequest {
        toolchain: args.target,
        rebuild: args.rebuild,
        run: args.run,
        test: args.test,
        bench: args.bench,
        verbose: opts.verbose,
    };

    for outcome in run_ci(&ctx, kind, &config, &req)? {
        tracing::debug!(
            "{}: {} artifact(s) in {}",
            outcome.toolchain,
            outcome.artifacts.len(),
            outcome.artifact_dir.display()
        );
    }
    Ok(0)
}
