//! Error taxonomy shared by every backend.
//!
//! Adapters return `anyhow::Result` and wrap one of these when the caller is
//! expected to react to the failure kind. Everything else is plain context.

use miette::Diagnostic;
use thiserror::Error;

/// Common help messages.
pub mod suggestions {
    /// No marker file in the working directory.
    pub const NOT_A_PROJECT: &str =
        "run inside a project containing vcpkg.json, MODULE.bazel or meson.build, or pass --backend";

    /// Build failed without verbose output.
    pub const BUILD_FAILED: &str = "run `quay build --verbose` for the full toolchain output";

    /// Wrap search has no local index.
    pub const WRAPDB: &str = "browse https://wrapdb.mesonbuild.com for available wraps";

    /// Target resolution came up empty or ambiguous.
    pub const PICK_TARGET: &str = "pass --target <name> to choose the executable";
}

/// A failure the calling verb can classify.
#[derive(Debug, Error, Diagnostic)]
pub enum BackendError {
    #[error("{message}")]
    #[diagnostic(code(quay::config))]
    Configuration {
        message: String,
        #[help]
        hint: String,
    },

    #[error("{registry} not configured")]
    #[diagnostic(code(quay::registry::not_configured))]
    RegistryNotConfigured {
        registry: &'static str,
        #[help]
        command: String,
    },

    #[error("manifest not found: {}", .path.display())]
    #[diagnostic(code(quay::manifest::missing))]
    ManifestNotFound { path: std::path::PathBuf },

    #[error("{backend} {phase} failed{}", exit_suffix(.code))]
    #[diagnostic(code(quay::build::failed))]
    BuildFailure {
        backend: &'static str,
        phase: &'static str,
        code: Option<i32>,
        output: String,
    },

    #[error("{backend} tests failed{}", exit_suffix(.code))]
    #[diagnostic(code(quay::test::failed))]
    TestFailure {
        backend: &'static str,
        code: Option<i32>,
        output: String,
    },

    #[error("`{tool}` failed while {action}{}", exit_suffix(.code))]
    #[diagnostic(code(quay::tool::failed))]
    ToolFailed {
        tool: String,
        action: &'static str,
        code: Option<i32>,
        output: String,
    },

    #[error("{message}{}", candidate_list(.candidates))]
    #[diagnostic(code(quay::run::target_not_found))]
    TargetNotFound {
        message: String,
        candidates: Vec<String>,
    },

    #[error("no benchmarks found in {searched}")]
    #[diagnostic(code(quay::bench::none))]
    NoBenchmarksFound { searched: String },

    #[error("dependency `{name}` not found in {location}")]
    #[diagnostic(code(quay::deps::not_found))]
    DependencyNotFound { name: String, location: String },

    #[error("{backend} does not support {operation}")]
    #[diagnostic(code(quay::unsupported))]
    NotSupported {
        backend: &'static str,
        operation: &'static str,
        #[help]
        hint: Option<String>,
    },
}

impl BackendError {
    pub fn configuration(message: impl Into<String>, hint: impl Into<String>) -> Self {
        BackendError::Configuration {
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn dependency_not_found(name: &str, location: impl Into<String>) -> Self {
        BackendError::DependencyNotFound {
            name: name.to_string(),
            location: location.into(),
        }
    }

    /// The remediation text attached to this error, if any.
    pub fn hint(&self) -> Option<String> {
        match self {
            BackendError::Configuration { hint, .. } => Some(hint.clone()),
            BackendError::RegistryNotConfigured { command, .. } => Some(command.clone()),
            BackendError::BuildFailure { .. } => Some(suggestions::BUILD_FAILED.to_string()),
            BackendError::TargetNotFound { .. } => Some(suggestions::PICK_TARGET.to_string()),
            BackendError::NotSupported { hint, .. } => hint.clone(),
            _ => None,
        }
    }

    /// Raw toolchain output carried by process failures.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            BackendError::BuildFailure { output, .. }
            | BackendError::TestFailure { output, .. }
            | BackendError::ToolFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    }
}

fn candidate_list(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!(": {}", candidates.join(", "))
    }
}

/// Downcast an `anyhow::Error` to a [`BackendError`], looking through context layers.
pub fn backend_error(err: &anyhow::Error) -> Option<&BackendError> {
    err.chain().find_map(|cause| cause.downcast_ref::<BackendError>())
}
