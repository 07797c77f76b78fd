//! Setup Commands
//!
//! Release listing, GPU detection and binary install/wipe.

use crate::catalog::{recommend, HostProfile, Recommendation, Release, ReleaseAsset};
use crate::config::InstalledBinaryRecord;
use crate::error::{CommandResult, ControlError};
use crate::hardware::{detect_gpu, GpuInfo};
use crate::setup::InstallKind;
use crate::state::AppState;

/// Latest release and its assets
pub async fn fetch_releases(state: &AppState) -> CommandResult<Release> {
    tracing::info!("[Command] fetch_releases");
    Ok(state.catalog.fetch_latest_release().await?)
}

/// Detect GPU hardware
pub async fn detect_gpu_cmd() -> CommandResult<GpuInfo> {
    tracing::info!("[Command] detect_gpu");
    tokio::task::spawn_blocking(detect_gpu)
        .await
        .map_err(|e| ControlError::Filesystem(format!("GPU detection task failed: {}", e)).into())
}

/// Best primary asset (and matching runtime) for this machine
pub async fn recommend_assets(state: &AppState) -> CommandResult<Recommendation> {
    tracing::info!("[Command] recommend_assets");
    let release = state.catalog.fetch_latest_release().await?;
    let gpu = detect_gpu_cmd().await?;
    Ok(recommend(&release, &HostProfile::current(gpu.gpu_type)))
}

/// Install an asset; primary installs return the new record
pub async fn install_binary(
    state: &AppState,
    asset: ReleaseAsset,
    is_auxiliary: bool,
) -> CommandResult<Option<InstalledBinaryRecord>> {
    tracing::info!("[Command] install_binary: {} (auxiliary={})", asset.name, is_auxiliary);
    Ok(state
        .installer
        .install(&asset, InstallKind::from_flag(is_auxiliary))
        .await?)
}

/// Look `name` up in a freshly fetched catalog and install it
pub async fn install_binary_by_name(
    state: &AppState,
    name: &str,
    is_auxiliary: bool,
) -> CommandResult<Option<InstalledBinaryRecord>> {
    let release = state.catalog.fetch_latest_release().await?;
    let asset = release
        .find_asset(name)
        .cloned()
        .ok_or_else(|| ControlError::InvalidAsset(format!("{} is not in release {}", name, release.version_tag)))?;
    install_binary(state, asset, is_auxiliary).await
}

pub async fn get_installed_binary(state: &AppState) -> CommandResult<Option<InstalledBinaryRecord>> {
    tracing::info!("[Command] get_installed_binary");
    Ok(state.config.load().await?.installed_binary)
}

pub async fn wipe_binaries(state: &AppState) -> CommandResult<()> {
    tracing::info!("[Command] wipe_binaries");
    Ok(state.installer.wipe().await?)
}
