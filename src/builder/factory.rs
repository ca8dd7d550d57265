//! Backend selection.
//!
//! Construction never touches the toolchain. Whether `cmake`, `bazel` or
//! `meson` is actually installed is checked lazily through
//! [`BuildBackend::availability`].

use std::path::Path;

use anyhow::Result;

use crate::builder::backend::{BackendAvailability, BuildBackend};
use crate::builder::bazel::BazelBackend;
use crate::builder::context::BackendContext;
use crate::builder::meson::MesonBackend;
use crate::builder::vcpkg::VcpkgBackend;
use crate::core::BackendKind;
use crate::util::diagnostic::{suggestions, BackendError};

/// The backend whose marker file is in `root`.
pub fn detect_backend(root: &Path) -> Result<BackendKind> {
    BackendKind::detect(root).ok_or_else(|| {
        BackendError::configuration(
            format!("no build manifest found in {}", root.display()),
            suggestions::NOT_A_PROJECT,
        )
        .into()
    })
}

pub fn create_backend(kind: BackendKind, ctx: BackendContext) -> Box<dyn BuildBackend> {
    tracing::debug!("using the {} backend for {}", kind, ctx.project_root.display());
    match kind {
        BackendKind::Vcpkg => Box::new(VcpkgBackend::new(ctx)),
        BackendKind::Bazel => Box::new(BazelBackend::new(ctx)),
        BackendKind::Meson => Box::new(MesonBackend::new(ctx)),
    }
}

/// Backend for the context's project, detected unless `explicit` is given.
pub fn open_backend(
    ctx: BackendContext,
    explicit: Option<BackendKind>,
) -> Result<Box<dyn BuildBackend>> {
    let kind = match explicit {
        Some(kind) => kind,
        None => detect_backend(&ctx.project_root)?,
    };
    Ok(create_backend(kind, ctx))
}

/// Check every backend's tool. Used by `quay doctor`.
pub fn check_all(ctx: &BackendContext) -> Vec<(BackendKind, Result<BackendAvailability>)> {
    BackendKind::ALL
        .into_iter()
        .map(|kind| (kind, create_backend(kind, ctx.clone()).availability()))
        .collect()
}
