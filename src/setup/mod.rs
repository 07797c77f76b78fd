//! Setup Module
//!
//! Handles downloading, extracting and replacing the llama.cpp binaries.

pub mod downloader;
pub mod extractor;
pub mod installer;
pub mod lease;
pub mod paths;

pub use installer::{InstallKind, Installer};
pub use lease::{BinariesLease, LeaseHolder};
pub use paths::HomeLayout;
