//! quay - one set of verbs for C/C++ projects built with CMake+vcpkg, Bazel or Meson.
//!
//! The library detects which build system a project uses, drives that
//! tool's command line, and copies what it produced into a common
//! `.bin/native/<profile>` directory. Dependencies are edited in the
//! backend's own manifest: `vcpkg.json`, `MODULE.bazel`, or Meson wraps.

pub mod builder;
pub mod core;
pub mod sources;
pub mod util;

/// Test utilities and mocks for quay unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides a scripted process runner and on-disk fixtures.
#[cfg(test)]
pub mod test_support;

pub use builder::{create_backend, detect_backend, open_backend, BackendContext, BuildBackend};
pub use core::{BackendKind, Dependency, DependencyInfo, Profile};
pub use util::config::GlobalConfig;
pub use util::diagnostic::BackendError;
