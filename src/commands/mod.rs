//! Command Boundary
//!
//! Request/response entry points for the presentation layer. Every command
//! takes the shared [`AppState`](crate::state::AppState) and fails with a
//! structured [`CommandError`](crate::error::CommandError).

pub mod config_cmds;
pub mod server_cmds;
pub mod setup_cmds;

pub use config_cmds::{get_config, reset_config, update_config};
pub use server_cmds::{get_logs, get_server_status, list_models, start_server, stop_server, subscribe};
pub use setup_cmds::{
    detect_gpu_cmd, fetch_releases, get_installed_binary, install_binary, install_binary_by_name, recommend_assets,
    wipe_binaries,
};
