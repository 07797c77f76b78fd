//! Server Commands
//!
//! Model listing, server start/stop/status, the log buffer and the event
//! stream.

use tokio::sync::broadcast;

use crate::error::CommandResult;
use crate::events::{CoreEvent, ServerStatus};
use crate::logs::LogEntry;
use crate::models::{list_models as scan_models, ModelFile};
use crate::server::RunParameters;
use crate::state::AppState;

/// `.gguf` files in the configured models directory
pub async fn list_models(state: &AppState) -> CommandResult<Vec<ModelFile>> {
    tracing::info!("[Command] list_models");
    let config = state.config.load().await?;
    Ok(scan_models(&config.models_path).await?)
}

/// Start serving `model_name`, replacing any running server.
///
/// Returns once the process is spawned; `server-status` reports when it
/// is considered up.
pub async fn start_server(state: &AppState, model_name: &str, params: RunParameters) -> CommandResult<()> {
    tracing::info!("[Command] start_server: {}", model_name);
    Ok(state.supervisor.start(model_name, &params).await?)
}

pub async fn stop_server(state: &AppState) -> CommandResult<()> {
    tracing::info!("[Command] stop_server");
    Ok(state.supervisor.stop().await?)
}

pub fn get_server_status(state: &AppState) -> ServerStatus {
    state.supervisor.status()
}

/// Current ring buffer, oldest first
pub fn get_logs(state: &AppState) -> Vec<LogEntry> {
    state.logs.snapshot()
}

/// Stream of `server-status`, `server-log` and `download-progress` events
pub fn subscribe(state: &AppState) -> broadcast::Receiver<CoreEvent> {
    state.events.subscribe()
}
