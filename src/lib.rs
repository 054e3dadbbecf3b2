mod commands;
pub mod core;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub use crate::core::downloader::{DownloadProgress, Downloader};
pub use crate::core::error::{InstallerError, InstallerResult};
pub use crate::core::runtime::{
    InstallState, InstallationManager, InstallationRecord, PlatformProfile, VersionStore,
};
pub use crate::core::state::RuntimeSettings;

pub fn run() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,electron_bootstrap=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = commands::Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("Failed to start async runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
