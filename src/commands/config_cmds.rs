//! Config Commands

use crate::config::AppConfig;
use crate::error::CommandResult;
use crate::state::AppState;

pub async fn get_config(state: &AppState) -> CommandResult<AppConfig> {
    tracing::info!("[Command] get_config");
    Ok(state.config.load().await?)
}

/// Shallow-merge `patch` (a JSON object of top-level fields) into the config
pub async fn update_config(state: &AppState, patch: serde_json::Value) -> CommandResult<AppConfig> {
    tracing::info!("[Command] update_config");
    Ok(state.config.merge(patch).await?)
}

pub async fn reset_config(state: &AppState) -> CommandResult<AppConfig> {
    tracing::info!("[Command] reset_config");
    Ok(state.config.reset().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::setup::paths::HomeLayout;
    use crate::state::StateOptions;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_update_and_reset() {
        let home = tempdir().unwrap();
        let state = AppState::new(HomeLayout::new(home.path()), StateOptions::default()).unwrap();

        let updated = update_config(
            &state,
            serde_json::json!({ "defaultParams": { "port": 9090, "gpuLayers": 33 } }),
        )
        .await
        .unwrap();
        assert_eq!(updated.default_params.port, 9090);
        assert_eq!(updated.default_params.gpu_layers, 33);
        assert_eq!(updated.default_params.ctx_size, 4096);
        assert_eq!(get_config(&state).await.unwrap(), updated);

        let err = update_config(&state, serde_json::json!(["not", "an", "object"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigIoError);

        let reset = reset_config(&state).await.unwrap();
        assert_eq!(reset.default_params.port, 8080);
    }
}
