//! `quay bench` command

use anyhow::Result;

use crate::cli::BenchArgs;
use crate::GlobalOptions;
use quay::core::BenchOptions;

pub fn execute(args: BenchArgs, opts: &GlobalOptions) -> Result<i32> {
    let backend = opts.backend()?;

    let outcome = backend.bench(&BenchOptions {
        verbose: opts.verbose,
        target: args.target,
        toolchain: args.toolchain,
    })?;

    Ok(outcome.exit_code)
}
