//! Command implementations

pub mod bench;
pub mod build;
pub mod ci;
pub mod clean;
pub mod config;
pub mod deps;
pub mod doctor;
pub mod init;
pub mod run;
