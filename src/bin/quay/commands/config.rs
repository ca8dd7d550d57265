//! `quay config` command

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::{ConfigArgs, ConfigCommands};
use crate::GlobalOptions;
use quay::util::config::global_config_path;
use quay::util::shell::Status;
use quay::GlobalConfig;

pub fn execute(args: ConfigArgs, opts: &GlobalOptions) -> Result<i32> {
    let path = global_config_path().context("could not determine the home directory")?;
    let mut config = GlobalConfig::load_or_default(&path);

    match args.command {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(&config)?);
            let resolved = |root: Option<std::path::PathBuf>| {
                root.map(|p| p.display().to_string())
                    .unwrap_or_else(|| "not configured".to_string())
            };
            println!("# resolved vcpkg root: {}", resolved(config.resolved_vcpkg_root()));
            println!("# resolved BCR root: {}", resolved(config.resolved_bcr_root()));
            return Ok(0);
        }
        ConfigCommands::SetVcpkgRoot { path: root } => {
            config.vcpkg_root = Some(absolute(&root, opts)?);
        }
        ConfigCommands::SetBcrRoot { path: root } => {
            config.bcr_root = Some(absolute(&root, opts)?);
        }
    }

    config.save(&path)?;
    opts.shell
        .status(Status::Finished, format!("wrote {}", path.display()));
    Ok(0)
}

/// Roots are stored absolute; they must already exist.
fn absolute(root: &Path, opts: &GlobalOptions) -> Result<std::path::PathBuf> {
    let root = opts.project_root.join(root);
    root.canonicalize()
        .with_context(|| format!("{} does not exist", root.display()))
}
