//! Release catalog types
//!
//! `GitHub*` structs mirror the release API payload; [`Release`] and
//! [`ReleaseAsset`] are the normalized records the rest of the crate uses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::naming::{self, AssetArch, AssetPlatform, AssetVariant};

/// Raw release data from the GitHub API
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// Raw asset data from the GitHub API
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub id: u64,
    pub name: String,
    pub browser_download_url: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// One downloadable artifact of a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseAsset {
    pub id: u64,
    pub name: String,
    #[serde(alias = "url")]
    pub download_url: String,
    #[serde(alias = "size")]
    pub size_bytes: u64,
    #[serde(alias = "created")]
    pub created_at: DateTime<Utc>,
}

impl ReleaseAsset {
    pub fn variant(&self) -> AssetVariant {
        naming::variant(&self.name)
    }

    pub fn platform(&self) -> AssetPlatform {
        naming::platform(&self.name)
    }

    pub fn arch(&self) -> AssetArch {
        naming::arch(&self.name)
    }

    /// Build number parsed from the name, `"unknown"` when absent
    pub fn version_tag(&self) -> String {
        naming::version_tag(&self.name)
    }
}

impl From<GitHubAsset> for ReleaseAsset {
    fn from(asset: GitHubAsset) -> Self {
        Self {
            id: asset.id,
            name: asset.name,
            download_url: asset.browser_download_url,
            size_bytes: asset.size,
            created_at: asset.created_at,
        }
    }
}

/// Latest release, normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub version_tag: String,
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    pub fn find_asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

impl From<GitHubRelease> for Release {
    fn from(release: GitHubRelease) -> Self {
        Self {
            version_tag: release.tag_name,
            assets: release.assets.into_iter().map(ReleaseAsset::from).collect(),
        }
    }
}
