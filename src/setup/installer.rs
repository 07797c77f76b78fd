//! Archive Installer
//!
//! Download, verify, extract and record a release asset.
//!
//! # Flow
//! 1. Lease the binaries directory (fail fast if busy)
//! 2. Stream the archive into `downloads/`, outside the binaries directory
//! 3. Reject truncated or implausibly small archives
//! 4. Primary installs wipe the binaries directory first; auxiliary ones merge
//! 5. Extract, check something landed, delete the temporary archive
//! 6. Primary installs persist an [`InstalledBinaryRecord`]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;

use crate::catalog::ReleaseAsset;
use crate::config::{AppConfig, ConfigStore, InstalledBinaryRecord};
use crate::error::{ControlError, ControlResult};
use crate::events::{DownloadStatus, EventBus};
use crate::logs::LogBuffer;
use crate::setup::downloader::{self, remove_partial};
use crate::setup::extractor::{self, ArchiveFormat};
use crate::setup::lease::{BinariesLease, LeaseHolder};
use crate::setup::paths::{dir_has_entries, HomeLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    /// Main server package; replaces whatever is installed
    Primary,
    /// Supplementary runtime merged beside the primary
    Auxiliary,
}

impl InstallKind {
    pub fn from_flag(is_auxiliary: bool) -> Self {
        if is_auxiliary {
            InstallKind::Auxiliary
        } else {
            InstallKind::Primary
        }
    }
}

#[derive(Clone)]
pub struct Installer {
    client: Client,
    layout: HomeLayout,
    config: Arc<ConfigStore>,
    events: EventBus,
    logs: LogBuffer,
    lease: BinariesLease,
}

impl Installer {
    pub fn new(
        client: Client,
        layout: HomeLayout,
        config: Arc<ConfigStore>,
        events: EventBus,
        logs: LogBuffer,
        lease: BinariesLease,
    ) -> Self {
        Self {
            client,
            layout,
            config,
            events,
            logs,
            lease,
        }
    }

    /// Install `asset`, returning the new record for primary installs.
    ///
    /// Progress goes out as `download-progress` events; the terminal event
    /// is `completed` at 100 or `failed`.
    pub async fn install(&self, asset: &ReleaseAsset, kind: InstallKind) -> ControlResult<Option<InstalledBinaryRecord>> {
        tracing::info!("[Installer] Installing {} ({:?})", asset.name, kind);
        self.logs.info(format!("Downloading {}...", asset.name));

        let mut last_progress = 0u8;
        let result = self.run(asset, kind, &mut last_progress).await;

        match &result {
            Ok(_) => {
                self.events
                    .download_progress(&asset.name, 100, DownloadStatus::Completed);
                self.logs.success(format!("Installed {}", asset.name));
            }
            Err(e) => {
                self.events
                    .download_progress(&asset.name, last_progress, DownloadStatus::Failed);
                self.logs.error(format!("Install of {} failed: {}", asset.name, e));
            }
        }
        result
    }

    async fn run(
        &self,
        asset: &ReleaseAsset,
        kind: InstallKind,
        last_progress: &mut u8,
    ) -> ControlResult<Option<InstalledBinaryRecord>> {
        let _lease = self.lease.try_acquire(LeaseHolder::Install)?;
        let format = ArchiveFormat::from_name(&asset.name)?;
        let config = self.config.load().await?;
        let temp_path = self.temp_path(&asset.name)?;

        let result = self
            .download_and_extract(asset, kind, format, &config, &temp_path, last_progress)
            .await;
        remove_partial(&temp_path).await;
        result?;

        if kind == InstallKind::Auxiliary {
            return Ok(None);
        }

        let record = InstalledBinaryRecord {
            name: asset.name.clone(),
            version_tag: asset.version_tag(),
            installed_at: Utc::now(),
        };
        let stored = record.clone();
        self.config
            .update(move |c| c.installed_binary = Some(stored))
            .await?;

        tracing::info!("[Installer] Recorded {} (version {})", record.name, record.version_tag);
        Ok(Some(record))
    }

    async fn download_and_extract(
        &self,
        asset: &ReleaseAsset,
        kind: InstallKind,
        format: ArchiveFormat,
        config: &AppConfig,
        temp_path: &Path,
        last_progress: &mut u8,
    ) -> ControlResult<()> {
        let events = self.events.clone();
        let name = asset.name.clone();
        downloader::download_file(&self.client, &asset.download_url, temp_path, asset.size_bytes, |p| {
            *last_progress = p;
            events.download_progress(&name, p, DownloadStatus::Downloading);
        })
        .await?;

        extractor::ensure_plausible_size(temp_path)?;

        let binaries_dir = config.binaries_path.clone();
        if kind == InstallKind::Primary && config.installed_binary.is_some() {
            tracing::info!("[Installer] Replacing previous install in {:?}", binaries_dir);
            self.logs.info("Removing previous binaries...");
            clear_dir(&binaries_dir).await?;
        }
        tokio::fs::create_dir_all(&binaries_dir).await?;

        self.logs.info(format!("Extracting {}...", asset.name));
        let archive = temp_path.to_path_buf();
        let dest = binaries_dir.clone();
        let files = tokio::task::spawn_blocking(move || extractor::extract_archive(&archive, format, &dest))
            .await
            .map_err(|e| ControlError::Filesystem(format!("extraction task failed: {}", e)))??;

        if files == 0 || !dir_has_entries(&binaries_dir) {
            return Err(ControlError::EmptyExtraction(binaries_dir.display().to_string()));
        }
        Ok(())
    }

    /// Delete every installed binary and forget the installed record
    pub async fn wipe(&self) -> ControlResult<()> {
        let _lease = self.lease.try_acquire(LeaseHolder::Wipe)?;
        let config = self.config.load().await?;

        tracing::info!("[Installer] Wiping {:?}", config.binaries_path);
        clear_dir(&config.binaries_path).await?;
        tokio::fs::create_dir_all(&config.binaries_path).await?;
        self.config.update(|c| c.installed_binary = None).await?;

        self.logs.info("Binaries wiped");
        Ok(())
    }

    /// Temporary download location; asset names must be plain file names
    fn temp_path(&self, asset_name: &str) -> ControlResult<PathBuf> {
        let file_name = Path::new(asset_name)
            .file_name()
            .filter(|f| f.to_str() == Some(asset_name))
            .ok_or_else(|| ControlError::InvalidAsset(format!("{:?} is not a plain file name", asset_name)))?;
        Ok(self.layout.downloads_dir().join(file_name))
    }
}

async fn clear_dir(dir: &Path) -> ControlResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ControlError::Filesystem(format!("failed to clear {:?}: {}", dir, e))),
    }
}
