//! `quay clean` command

use anyhow::Result;

use crate::cli::CleanArgs;
use crate::GlobalOptions;
use quay::core::CleanOptions;
use quay::util::shell::Status;

pub fn execute(args: CleanArgs, opts: &GlobalOptions) -> Result<i32> {
    let backend = opts.backend()?;

    let report = backend.clean(&CleanOptions {
        all: args.all,
        verbose: opts.verbose,
    });

    if report.removed.is_empty() {
        opts.shell.status(Status::Finished, "nothing to clean");
    } else {
        opts.shell.status(
            Status::Finished,
            format!("removed {} path(s)", report.removed.len()),
        );
    }
    Ok(0)
}
