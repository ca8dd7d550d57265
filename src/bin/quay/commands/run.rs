//! `quay run` command
//!
//! Exits with the program's own exit code.

use anyhow::Result;

use crate::cli::RunArgs;
use crate::GlobalOptions;
use quay::core::RunOptions;

pub fn execute(args: RunArgs, opts: &GlobalOptions) -> Result<i32> {
    let backend = opts.backend()?;

    let outcome = backend.run(&RunOptions {
        release: args.profile.release,
        opt_level: args.profile.opt_level,
        sanitizer: args.profile.sanitizer(),
        target: args.target,
        args: args.args,
        verbose: opts.verbose,
        toolchain: args.profile.toolchain,
    })?;

    Ok(outcome.exit_code)
}
