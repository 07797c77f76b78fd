//! Llama Control Center CLI.

use clap::Parser;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use llama_control_lib::commands;
use llama_control_lib::events::{CoreEvent, DownloadStatus};
use llama_control_lib::server::RunParameters;
use llama_control_lib::{AppState, CommandError};

mod cli;

use crate::cli::{Cli, Command, ConfigAction, ServeArgs};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let state = match AppState::open_default() {
        Ok(state) => state,
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(1);
        }
    };

    let exit_code = match run(&state, cli.command).await {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {}", error.message);
            if error.retryable {
                eprintln!("hint: this failure is usually temporary, try again");
            }
            1
        }
    };

    state.shutdown().await;
    std::process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(state: &AppState, command: Command) -> Result<(), CommandError> {
    match command {
        Command::Releases => {
            let release = commands::fetch_releases(state).await?;
            println!("Release {}", release.version_tag);
            for asset in &release.assets {
                println!(
                    "  {:<8} {:>8.1} MB  {}",
                    asset.variant().label(),
                    asset.size_bytes as f64 / 1_048_576.0,
                    asset.name
                );
            }
        }
        Command::Recommend => {
            let rec = commands::recommend_assets(state).await?;
            match &rec.primary {
                Some(primary) => println!("primary:   {}", primary.name),
                None => println!("primary:   no build matches this machine"),
            }
            if let Some(aux) = &rec.auxiliary {
                println!("auxiliary: {}", aux.name);
            }
        }
        Command::Install { asset, auxiliary } => {
            let mut events = commands::subscribe(state);
            let printer = tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(CoreEvent::DownloadProgress(p)) if p.status == DownloadStatus::Downloading => {
                            eprint!("\r{} {:>3}%", p.name, p.progress);
                        }
                        Ok(CoreEvent::DownloadProgress(_)) => {
                            eprintln!();
                            break;
                        }
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let result = commands::install_binary_by_name(state, &asset, auxiliary).await;
            printer.abort();
            match result? {
                Some(record) => println!("installed {} (version {})", record.name, record.version_tag),
                None => println!("installed auxiliary {}", asset),
            }
        }
        Command::Installed => match commands::get_installed_binary(state).await? {
            Some(record) => print_json(&record),
            None => println!("no binary installed"),
        },
        Command::Wipe => {
            commands::wipe_binaries(state).await?;
            println!("binaries wiped");
        }
        Command::Models => {
            for model in commands::list_models(state).await? {
                println!("{:>10.1} MB  {}", model.size_bytes as f64 / 1_048_576.0, model.name);
            }
        }
        Command::Serve(args) => serve(state, args).await?,
        Command::Logs => {
            for entry in commands::get_logs(state) {
                println!("[{:?}] {}", entry.kind, entry.message);
            }
        }
        Command::Config { action } => {
            let config = match action.unwrap_or(ConfigAction::Show) {
                ConfigAction::Show => commands::get_config(state).await?,
                ConfigAction::Reset => commands::reset_config(state).await?,
            };
            print_json(&config);
        }
        Command::Gpu => print_json(&commands::detect_gpu_cmd().await?),
    }
    Ok(())
}

/// Start the server and stream its events until Ctrl-C or exit
async fn serve(state: &AppState, args: ServeArgs) -> Result<(), CommandError> {
    let params = RunParameters {
        port: args.port,
        host: args.host,
        ctx_size: args.ctx_size,
        gpu_layers: args.gpu_layers,
        threads: args.threads,
        batch_size: args.batch_size,
        flash_attn: Some(args.flash_attn),
        mlock: Some(args.mlock),
        no_mmap: Some(args.no_mmap),
        api_key: args.api_key,
    };

    let mut events = commands::subscribe(state);
    commands::start_server(state, &args.model, params).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("stopping...");
                break;
            }
            event = events.recv() => match event {
                Ok(CoreEvent::ServerLog(entry)) => println!("{}", entry.message),
                Ok(CoreEvent::ServerStatus(status)) if !status.running => break,
                Ok(CoreEvent::ServerStatus(status)) => {
                    eprintln!("server running with {}", status.model.unwrap_or_default());
                }
                Ok(CoreEvent::DownloadProgress(_)) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    }

    commands::stop_server(state).await?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(error) => eprintln!("error: {error}"),
    }
}
