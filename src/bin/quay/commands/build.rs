//! `quay build` command

use anyhow::Result;

use crate::cli::BuildArgs;
use crate::GlobalOptions;
use quay::core::BuildOptions;

pub fn execute(args: BuildArgs, opts: &GlobalOptions) -> Result<i32> {
    let backend = opts.backend()?;

    if args.list {
        for target in backend.list_targets()? {
            println!("{} ({})", target.name, target.kind);
        }
        return Ok(0);
    }

    let build = BuildOptions {
        release: args.profile.release,
        opt_level: args.profile.opt_level,
        sanitizer: args.profile.sanitizer(),
        target: args.target,
        jobs: args.jobs,
        clean: args.clean,
        verbose: opts.verbose,
        toolchain: args.profile.toolchain,
    };

    let outcome = backend.build(&build)?;
    tracing::debug!(
        "{} artifact(s) in {}",
        outcome.artifacts.len(),
        outcome.artifact_dir.display()
    );
    Ok(0)
}
