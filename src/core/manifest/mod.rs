//! Backend-native dependency manifests.
//!
//! Each backend declares dependencies in its own format. The editors here
//! change one entry at a time and leave the rest of the file alone.

pub mod ci;
pub mod module_file;
pub mod vcpkg_json;
pub mod wrap;

pub use ci::CiConfig;
pub use module_file::ModuleFile;
pub use vcpkg_json::VcpkgManifest;
pub use wrap::WrapFile;
