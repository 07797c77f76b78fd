//! Asset file-name parsing
//!
//! llama.cpp encodes everything we know about an asset in its file name,
//! e.g. `llama-b6123-bin-win-cuda-12.4-x64.zip` or
//! `cudart-llama-bin-win-cuda-12.4-x64.zip`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"llama-b(\d+)-").expect("valid regex"));

static CUDA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)cuda[_-](\d+\.\d+)").expect("valid regex"));

/// Fallback when a name carries no build number
pub const UNKNOWN_VERSION: &str = "unknown";

/// Build number of a primary archive, or `"unknown"`
pub fn version_tag(name: &str) -> String {
    VERSION_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

/// CUDA version token (`12.4`) shared by a CUDA build and its runtime asset
pub fn cuda_version(name: &str) -> Option<String> {
    CUDA_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Accelerator backend an archive was built for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AssetVariant {
    /// Auxiliary CUDA runtime libraries
    CudaRuntime { version: Option<String> },
    Cuda { version: Option<String> },
    Vulkan,
    Hip,
    Sycl,
    Metal,
    Cpu,
    Other,
}

impl AssetVariant {
    pub fn is_auxiliary(&self) -> bool {
        matches!(self, AssetVariant::CudaRuntime { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssetVariant::CudaRuntime { .. } => "cudart",
            AssetVariant::Cuda { .. } => "cuda",
            AssetVariant::Vulkan => "vulkan",
            AssetVariant::Hip => "hip",
            AssetVariant::Sycl => "sycl",
            AssetVariant::Metal => "metal",
            AssetVariant::Cpu => "cpu",
            AssetVariant::Other => "other",
        }
    }
}

pub fn variant(name: &str) -> AssetVariant {
    let lower = name.to_lowercase();

    if lower.contains("cudart") {
        return AssetVariant::CudaRuntime {
            version: cuda_version(name),
        };
    }
    if lower.contains("cuda") {
        return AssetVariant::Cuda {
            version: cuda_version(name),
        };
    }
    if lower.contains("vulkan") {
        return AssetVariant::Vulkan;
    }
    if lower.contains("hip") || lower.contains("radeon") {
        return AssetVariant::Hip;
    }
    if lower.contains("sycl") {
        return AssetVariant::Sycl;
    }
    if lower.contains("metal") || (lower.contains("macos") && !lower.contains("x64")) {
        return AssetVariant::Metal;
    }
    if lower.contains("-bin-") && !["opencl", "kompute", "musa", "xcframework"].iter().any(|t| lower.contains(t)) {
        return AssetVariant::Cpu;
    }
    AssetVariant::Other
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetPlatform {
    Windows,
    MacOs,
    Linux,
    Unknown,
}

impl AssetPlatform {
    pub fn host() -> Self {
        match std::env::consts::OS {
            "windows" => AssetPlatform::Windows,
            "macos" => AssetPlatform::MacOs,
            "linux" => AssetPlatform::Linux,
            _ => AssetPlatform::Unknown,
        }
    }
}

pub fn platform(name: &str) -> AssetPlatform {
    let tokens = tokens(name);
    if tokens.iter().any(|t| *t == "win" || *t == "windows") {
        AssetPlatform::Windows
    } else if tokens.iter().any(|t| *t == "macos" || *t == "darwin") {
        AssetPlatform::MacOs
    } else if tokens.iter().any(|t| *t == "ubuntu" || *t == "linux") {
        AssetPlatform::Linux
    } else {
        AssetPlatform::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetArch {
    X64,
    Arm64,
    Unknown,
}

impl AssetArch {
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "x86_64" => AssetArch::X64,
            "aarch64" => AssetArch::Arm64,
            _ => AssetArch::Unknown,
        }
    }
}

pub fn arch(name: &str) -> AssetArch {
    let tokens = tokens(name);
    if tokens.iter().any(|t| matches!(t.as_str(), "x64" | "x86_64" | "amd64")) {
        AssetArch::X64
    } else if tokens.iter().any(|t| matches!(t.as_str(), "arm64" | "aarch64")) {
        AssetArch::Arm64
    } else {
        AssetArch::Unknown
    }
}

/// Lowercased `-`/`.` separated pieces of a file name
fn tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(['-', '.'])
        .map(str::to_string)
        .collect()
}
