//! Persistent configuration store
//!
//! A single JSON record in the home directory. Every update rewrites the
//! whole record; updates inside this process are serialized by a mutex.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{ControlError, ControlResult};
use crate::setup::paths::HomeLayout;

/// Identity of the installed primary binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledBinaryRecord {
    pub name: String,
    #[serde(alias = "version")]
    pub version_tag: String,
    #[serde(alias = "date")]
    pub installed_at: DateTime<Utc>,
}

/// Launch defaults used for any parameter a start request leaves out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultParams {
    pub ctx_size: u32,
    pub gpu_layers: u32,
    pub port: u16,
    pub host: String,
    pub threads: u32,
    pub batch_size: u32,
}

impl Default for DefaultParams {
    fn default() -> Self {
        Self {
            ctx_size: 4096,
            gpu_layers: 0,
            port: 8080,
            host: "127.0.0.1".to_string(),
            threads: host_threads(),
            batch_size: 512,
        }
    }
}

/// Logical cores of this machine, at least one
pub fn host_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub models_path: PathBuf,
    pub binaries_path: PathBuf,
    #[serde(default)]
    pub default_params: DefaultParams,
    #[serde(default)]
    pub installed_binary: Option<InstalledBinaryRecord>,
}

impl AppConfig {
    pub fn defaults_for(layout: &HomeLayout) -> Self {
        Self {
            models_path: layout.default_models_dir(),
            binaries_path: layout.default_binaries_dir(),
            default_params: DefaultParams::default(),
            installed_binary: None,
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    layout: HomeLayout,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(layout: HomeLayout) -> Self {
        Self {
            path: layout.config_file(),
            layout,
            write_lock: Mutex::new(()),
        }
    }

    /// Read the record, creating it with defaults when missing.
    ///
    /// A record that cannot be parsed is moved aside to `config.json.bak`
    /// and replaced with defaults.
    pub async fn load(&self) -> ControlResult<AppConfig> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => match self.parse(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    let backup = self.path.with_extension("json.bak");
                    tracing::warn!(
                        "[Config] {:?} is malformed ({}), moving it to {:?}",
                        self.path,
                        e,
                        backup
                    );
                    tokio::fs::rename(&self.path, &backup)
                        .await
                        .map_err(|e| ControlError::ConfigIo(e.to_string()))?;
                    self.write_defaults().await
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("[Config] No config at {:?}, writing defaults", self.path);
                self.write_defaults().await
            }
            Err(e) => Err(ControlError::ConfigIo(format!(
                "failed to read {:?}: {}",
                self.path, e
            ))),
        }
    }

    pub async fn save(&self, config: &AppConfig) -> ControlResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ControlError::ConfigIo(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| ControlError::ConfigIo(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| ControlError::ConfigIo(format!("failed to write {:?}: {}", self.path, e)))
    }

    /// Read-modify-write the whole record
    pub async fn update<F>(&self, mutate: F) -> ControlResult<AppConfig>
    where
        F: FnOnce(&mut AppConfig),
    {
        let _guard = self.write_lock.lock().await;
        let mut config = self.load().await?;
        mutate(&mut config);
        self.save(&config).await?;
        Ok(config)
    }

    /// Shallow-merge a JSON object of fields into the record
    pub async fn merge(&self, patch: serde_json::Value) -> ControlResult<AppConfig> {
        let serde_json::Value::Object(fields) = patch else {
            return Err(ControlError::ConfigIo("config patch must be a JSON object".into()));
        };

        let _guard = self.write_lock.lock().await;
        let current = self.load().await?;
        let mut value =
            serde_json::to_value(&current).map_err(|e| ControlError::ConfigIo(e.to_string()))?;
        if let serde_json::Value::Object(map) = &mut value {
            map.extend(fields);
        }
        let merged: AppConfig = serde_json::from_value(value)
            .map_err(|e| ControlError::ConfigIo(format!("invalid config patch: {}", e)))?;
        self.save(&merged).await?;
        Ok(merged)
    }

    /// Delete the record and start over from defaults
    pub async fn reset(&self) -> ControlResult<AppConfig> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ControlError::ConfigIo(e.to_string())),
        }
        self.write_defaults().await
    }

    /// Stored fields laid over the defaults for this layout
    fn parse(&self, content: &str) -> Result<AppConfig, serde_json::Error> {
        let stored: serde_json::Value = serde_json::from_str(content)?;
        let serde_json::Value::Object(fields) = stored else {
            return serde_json::from_value(stored);
        };
        let mut value = serde_json::to_value(AppConfig::defaults_for(&self.layout))?;
        if let serde_json::Value::Object(map) = &mut value {
            map.extend(fields);
        }
        serde_json::from_value(value)
    }

    async fn write_defaults(&self) -> ControlResult<AppConfig> {
        let config = AppConfig::defaults_for(&self.layout);
        self.save(&config).await?;
        Ok(config)
    }
}
