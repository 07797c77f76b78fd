use std::sync::Arc;

use crate::catalog::{CatalogConfig, ReleaseCatalog};
use crate::config::ConfigStore;
use crate::error::ControlResult;
use crate::events::EventBus;
use crate::logs::LogBuffer;
use crate::server::{ProcessSupervisor, SupervisorConfig};
use crate::setup::downloader::build_client;
use crate::setup::paths::{default_home, HomeLayout};
use crate::setup::{BinariesLease, Installer};

/// Tunables for the long-lived services
#[derive(Debug, Clone, Default)]
pub struct StateOptions {
    pub catalog: CatalogConfig,
    pub supervisor: SupervisorConfig,
}

/// Global application state handed to every command
pub struct AppState {
    pub layout: HomeLayout,
    pub config: Arc<ConfigStore>,
    pub events: EventBus,
    /// Ring buffer restored from the previous session's log file
    pub logs: LogBuffer,
    /// Shared by the installer and the supervisor
    pub lease: BinariesLease,
    pub catalog: ReleaseCatalog,
    pub installer: Installer,
    pub supervisor: ProcessSupervisor,
}

impl AppState {
    pub fn new(layout: HomeLayout, options: StateOptions) -> ControlResult<Self> {
        layout.ensure()?;

        let events = EventBus::new();
        let logs = LogBuffer::restore(&layout.log_file(), events.clone());
        let config = Arc::new(ConfigStore::new(layout.clone()));
        let lease = BinariesLease::new();

        let catalog = ReleaseCatalog::new(options.catalog)?;
        let installer = Installer::new(
            build_client()?,
            layout.clone(),
            config.clone(),
            events.clone(),
            logs.clone(),
            lease.clone(),
        );
        let supervisor = ProcessSupervisor::new(
            options.supervisor,
            config.clone(),
            events.clone(),
            logs.clone(),
            lease.clone(),
        );

        tracing::info!("[State] Home directory {:?}", layout.home);

        Ok(Self {
            layout,
            config,
            events,
            logs,
            lease,
            catalog,
            installer,
            supervisor,
        })
    }

    /// State rooted at `$LLAMA_CONTROL_HOME` or the platform data directory
    pub fn open_default() -> ControlResult<Self> {
        Self::new(HomeLayout::new(default_home()), StateOptions::default())
    }

    /// Stop the server and persist the log buffer
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
        if let Err(e) = self.logs.flush() {
            tracing::warn!("[State] Failed to flush logs: {}", e);
        }
    }
}
