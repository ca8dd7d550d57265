//! `quay doctor` command

use anyhow::Result;

use crate::GlobalOptions;
use quay::builder::{check_all, BackendAvailability};
use quay::util::config::global_config_path;

pub fn execute(opts: &GlobalOptions) -> Result<i32> {
    let ctx = opts.context_for(opts.project_root.clone());

    match quay::detect_backend(&opts.project_root) {
        Ok(kind) => println!("project: {} ({})", opts.project_root.display(), kind),
        Err(_) => println!("project: none detected in {}", opts.project_root.display()),
    }

    for (kind, status) in check_all(&ctx) {
        let line = match status {
            Ok(BackendAvailability::Available { version }) => format!("ok ({})", version),
            Ok(other) => other.error_message().unwrap_or_default(),
            Err(e) => format!("{:#}", e),
        };
        println!("{:>6}: {}", kind.as_str(), line);
    }

    let show = |root: Option<&std::path::Path>| {
        root.map(|p| p.display().to_string())
            .unwrap_or_else(|| "not configured".to_string())
    };
    println!("vcpkg root: {}", show(ctx.vcpkg_root.as_deref()));
    println!("BCR root: {}", show(ctx.bcr_root.as_deref()));
    if let Some(path) = global_config_path() {
        println!("config: {}", path.display());
    }

    Ok(0)
}
