//! Host-aware asset recommendation
//!
//! Picks the primary archive that best fits this machine and, for CUDA
//! builds, the runtime archive carrying the same CUDA version token.

use serde::{Deserialize, Serialize};

use super::naming::{AssetArch, AssetPlatform, AssetVariant};
use super::types::{Release, ReleaseAsset};
use crate::hardware::GpuType;

/// What we know about the machine we are installing on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProfile {
    pub platform: AssetPlatform,
    pub arch: AssetArch,
    pub gpu: GpuType,
}

impl HostProfile {
    pub fn current(gpu: GpuType) -> Self {
        Self {
            platform: AssetPlatform::host(),
            arch: AssetArch::host(),
            gpu,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub primary: Option<ReleaseAsset>,
    /// Runtime libraries that must accompany a CUDA primary
    pub auxiliary: Option<ReleaseAsset>,
}

/// Backends worth trying for a GPU, best first
fn preference(gpu: GpuType) -> &'static [&'static str] {
    match gpu {
        GpuType::Nvidia => &["cuda", "vulkan", "cpu"],
        GpuType::Amd => &["vulkan", "hip", "cpu"],
        GpuType::Intel => &["vulkan", "sycl", "cpu"],
        GpuType::Apple => &["metal", "cpu"],
        GpuType::Cpu => &["cpu"],
    }
}

pub fn recommend(release: &Release, host: &HostProfile) -> Recommendation {
    let candidates: Vec<&ReleaseAsset> = release
        .assets
        .iter()
        .filter(|a| a.platform() == host.platform)
        .filter(|a| a.arch() == host.arch || a.arch() == AssetArch::Unknown)
        .filter(|a| !a.variant().is_auxiliary())
        .collect();

    let mut primary = None;
    for label in preference(host.gpu) {
        let matching: Vec<&ReleaseAsset> = candidates
            .iter()
            .copied()
            .filter(|a| a.variant().label() == *label)
            .collect();
        if let Some(best) = newest_cuda_first(matching) {
            primary = Some(best);
            break;
        }
    }

    // Any build for this OS beats nothing on macOS, where every build runs
    if primary.is_none() && host.platform == AssetPlatform::MacOs {
        primary = candidates.first().copied();
    }

    let auxiliary = primary.and_then(|p| matching_runtime(release, p));

    tracing::debug!(
        "[Catalog] Recommendation for {:?}: primary={:?} auxiliary={:?}",
        host,
        primary.map(|a| &a.name),
        auxiliary.map(|a| &a.name)
    );

    Recommendation {
        primary: primary.cloned(),
        auxiliary: auxiliary.cloned(),
    }
}

/// Highest CUDA version wins; other variants keep catalog order
fn newest_cuda_first(mut assets: Vec<&ReleaseAsset>) -> Option<&ReleaseAsset> {
    assets.sort_by(|a, b| cuda_key(b).cmp(&cuda_key(a)));
    assets.first().copied()
}

fn cuda_key(asset: &ReleaseAsset) -> Vec<u32> {
    match asset.variant() {
        AssetVariant::Cuda { version: Some(v) } => v.split('.').filter_map(|p| p.parse().ok()).collect(),
        _ => Vec::new(),
    }
}

/// Runtime asset for a CUDA primary, matched on CUDA version and platform.
///
/// `None` when the primary is not CUDA or no runtime carries its version
/// token; the caller then has to pick one by hand.
pub fn matching_runtime<'a>(release: &'a Release, primary: &ReleaseAsset) -> Option<&'a ReleaseAsset> {
    let AssetVariant::Cuda { version: Some(version) } = primary.variant() else {
        return None;
    };

    release.assets.iter().find(|a| {
        matches!(a.variant(), AssetVariant::CudaRuntime { version: Some(ref v) } if *v == version)
            && a.platform() == primary.platform()
    })
}
