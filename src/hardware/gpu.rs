//! GPU Detection
//!
//! Works out which accelerator the host has so a matching llama.cpp build
//! can be recommended:
//! 1. NVIDIA: `nvidia-smi`, on every platform
//! 2. Windows: `Win32_VideoController` via PowerShell
//! 3. Linux: `lspci` display controllers
//! 4. macOS: Apple Silicon means Metal
//! 5. Fallback to CPU if nothing is found

use serde::{Deserialize, Serialize};
use std::process::Command;

/// GPU type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuType {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Cpu,
}

impl GpuType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuType::Nvidia => "nvidia",
            GpuType::Amd => "amd",
            GpuType::Intel => "intel",
            GpuType::Apple => "apple",
            GpuType::Cpu => "cpu",
        }
    }
}

/// GPU detection result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuInfo {
    pub gpu_type: GpuType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vram_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_version: Option<String>,
}

impl GpuInfo {
    pub fn cpu_fallback() -> Self {
        GpuInfo {
            gpu_type: GpuType::Cpu,
            name: "CPU Only".to_string(),
            vram_mb: None,
            driver_version: None,
        }
    }
}

/// Main GPU detection function
///
/// Shells out to vendor tools, so call it from a blocking context.
pub fn detect_gpu() -> GpuInfo {
    tracing::info!("[GPU] Starting GPU detection...");

    if let Some(info) = detect_nvidia() {
        tracing::info!("[GPU] Detected NVIDIA GPU: {}", info.name);
        return info;
    }

    if let Some(info) = detect_platform() {
        tracing::info!("[GPU] Detected {} GPU: {}", info.gpu_type.as_str(), info.name);
        return info;
    }

    tracing::info!("[GPU] No GPU detected, falling back to CPU");
    GpuInfo::cpu_fallback()
}

/// Vendor of an adapter, judged by its marketing name
pub fn classify_gpu_name(name: &str) -> GpuType {
    let lower = name.to_lowercase();
    if lower.contains("nvidia") || lower.contains("geforce") || lower.contains("quadro") {
        GpuType::Nvidia
    } else if lower.contains("amd") || lower.contains("radeon") || lower.contains("ati ") {
        GpuType::Amd
    } else if lower.contains("intel") {
        GpuType::Intel
    } else if lower.contains("apple") {
        GpuType::Apple
    } else {
        GpuType::Cpu
    }
}

/// Detect NVIDIA GPU using nvidia-smi
fn detect_nvidia() -> Option<GpuInfo> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=name,memory.total,driver_version", "--format=csv,noheader,nounits"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
}

fn parse_nvidia_smi(stdout: &str) -> Option<GpuInfo> {
    let line = stdout.lines().next()?;
    let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    if parts.len() < 3 || parts[0].is_empty() {
        return None;
    }

    Some(GpuInfo {
        gpu_type: GpuType::Nvidia,
        name: parts[0].to_string(),
        vram_mb: parts[1].parse().ok(),
        driver_version: Some(parts[2].to_string()).filter(|v| !v.is_empty()),
    })
}

#[cfg(target_os = "windows")]
fn detect_platform() -> Option<GpuInfo> {
    let output = Command::new("powershell")
        .args([
            "-NoProfile",
            "-Command",
            r#"Get-WmiObject Win32_VideoController | ForEach-Object { "$($_.Name)|$($_.AdapterRAM)|$($_.DriverVersion)" }"#,
        ])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    parse_wmi(&String::from_utf8_lossy(&output.stdout))
}

/// Best adapter from `name|adapterRAM|driver` lines; discrete vendors win
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_wmi(stdout: &str) -> Option<GpuInfo> {
    let adapters: Vec<GpuInfo> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('|').collect();
            let name = parts.first()?.trim().to_string();
            let vram_bytes: u64 = parts.get(1).and_then(|v| v.trim().parse().ok()).unwrap_or(0);
            Some(GpuInfo {
                gpu_type: classify_gpu_name(&name),
                name,
                vram_mb: (vram_bytes > 0).then(|| vram_bytes / (1024 * 1024)),
                driver_version: parts.get(2).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
            })
        })
        .collect();

    best_adapter(adapters)
}

#[cfg(target_os = "linux")]
fn detect_platform() -> Option<GpuInfo> {
    let output = Command::new("lspci").output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_lspci(&String::from_utf8_lossy(&output.stdout))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_lspci(stdout: &str) -> Option<GpuInfo> {
    let adapters: Vec<GpuInfo> = stdout
        .lines()
        .filter(|l| {
            let lower = l.to_lowercase();
            lower.contains("vga compatible controller") || lower.contains("3d controller") || lower.contains("display controller")
        })
        .filter_map(|l| {
            // "01:00.0 VGA compatible controller: NVIDIA Corporation AD104 [GeForce RTX 4070]"
            let name = l.splitn(3, ':').nth(2)?.trim().to_string();
            Some(GpuInfo {
                gpu_type: classify_gpu_name(&name),
                name,
                vram_mb: None,
                driver_version: None,
            })
        })
        .collect();

    best_adapter(adapters)
}

#[cfg(target_os = "macos")]
fn detect_platform() -> Option<GpuInfo> {
    if std::env::consts::ARCH == "aarch64" {
        return Some(GpuInfo {
            gpu_type: GpuType::Apple,
            name: "Apple Silicon (Metal)".to_string(),
            vram_mb: None,
            driver_version: None,
        });
    }
    None
}

#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
fn detect_platform() -> Option<GpuInfo> {
    None
}

/// Prefer NVIDIA, then AMD, then Intel; unknown adapters are ignored
fn best_adapter(adapters: Vec<GpuInfo>) -> Option<GpuInfo> {
    let rank = |t: GpuType| match t {
        GpuType::Nvidia => 0,
        GpuType::Amd => 1,
        GpuType::Intel => 2,
        GpuType::Apple => 3,
        GpuType::Cpu => 4,
    };
    adapters
        .into_iter()
        .filter(|a| a.gpu_type != GpuType::Cpu)
        .min_by_key(|a| rank(a.gpu_type))
}
