//! Shared utilities

pub mod config;
pub mod diagnostic;
pub mod fs;
pub mod hash;
pub mod process;
pub mod shell;

pub use config::GlobalConfig;
pub use diagnostic::{backend_error, BackendError};
pub use process::{OutputMode, ProcessBuilder, ProcessOutput, ProcessRunner, SystemRunner};
pub use shell::{Shell, Status};
