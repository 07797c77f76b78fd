//! CLI argument definitions for the control center.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "llama-control",
    version,
    about = "Llama Control Center - install llama.cpp builds and run llama-server"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Debug-level diagnostics (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the assets of the latest llama.cpp release.
    Releases,

    /// Suggest the build (and CUDA runtime) for this machine.
    Recommend,

    /// Download and install a release asset by file name.
    Install {
        #[arg(value_name = "ASSET")]
        asset: String,

        /// Merge into the binaries directory without replacing the install.
        #[arg(long)]
        auxiliary: bool,
    },

    /// Show the installed primary binary.
    Installed,

    /// Delete every installed binary.
    Wipe,

    /// List the models in the models directory.
    Models,

    /// Run llama-server with a model until Ctrl-C.
    Serve(ServeArgs),

    /// Print the saved server log.
    Logs,

    /// Show or reset the configuration.
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Detect the GPU.
    Gpu,
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigAction {
    /// Print the current configuration (default).
    Show,
    /// Restore the default configuration.
    Reset,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Model file name inside the models directory.
    #[arg(value_name = "MODEL")]
    pub model: String,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub host: Option<String>,

    /// Context size.
    #[arg(short = 'c', long = "ctx-size")]
    pub ctx_size: Option<u32>,

    /// Layers offloaded to the GPU.
    #[arg(long = "gpu-layers")]
    pub gpu_layers: Option<u32>,

    #[arg(short = 't', long)]
    pub threads: Option<u32>,

    #[arg(short = 'b', long = "batch-size")]
    pub batch_size: Option<u32>,

    #[arg(long = "flash-attn")]
    pub flash_attn: bool,

    #[arg(long)]
    pub mlock: bool,

    #[arg(long = "no-mmap")]
    pub no_mmap: bool,

    #[arg(long = "api-key")]
    pub api_key: Option<String>,
}
