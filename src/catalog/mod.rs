//! Release Catalog
//!
//! Lists the artifacts of the latest llama.cpp release and works out which
//! of them suit this machine.

pub mod client;
pub mod naming;
pub mod selection;
pub mod types;

pub use client::{parse_release, CatalogConfig, ReleaseCatalog, DEFAULT_ENDPOINT};
pub use naming::{AssetArch, AssetPlatform, AssetVariant};
pub use selection::{recommend, HostProfile, Recommendation};
pub use types::{Release, ReleaseAsset};
