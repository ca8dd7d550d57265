//! Build backends.
//!
//! Each backend drives one external build system (CMake with vcpkg, Bazel,
//! or Meson) behind the [`BuildBackend`] trait and leaves its artifacts in
//! the same `.bin/native/<profile>` layout.

pub mod artifacts;
pub mod backend;
pub mod bazel;
pub mod ci;
pub mod context;
pub mod factory;
pub mod meson;
pub mod scaffold;
pub mod vcpkg;

pub use backend::{
    BackendAvailability, BuildBackend, BuildOutcome, BuildTarget, CleanReport, RunOutcome,
    TestOutcome, TestSummary,
};
pub use bazel::BazelBackend;
pub use ci::{run_ci, CiOutcome, CiRequest};
pub use context::{BackendContext, OutputLayout};
pub use factory::{check_all, create_backend, detect_backend, open_backend};
pub use meson::MesonBackend;
pub use scaffold::{MinimalScaffolder, ScaffoldFile, Scaffolder};
pub use vcpkg::VcpkgBackend;
