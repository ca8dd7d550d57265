//! Core data structures for quay.
//!
//! - Build profiles and the per-verb option structs
//! - Dependency records and backend-native manifests
//! - Project detection

pub mod dependency;
pub mod manifest;
pub mod options;
pub mod profile;
pub mod project;

pub use dependency::{Dependency, DependencyInfo};
pub use options::{
    BenchFramework, BenchOptions, BuildOptions, CleanOptions, InitConfig, RunOptions,
    TestFramework, TestOptions,
};
pub use profile::{OptLevel, Profile, Sanitizer};
pub use project::BackendKind;
