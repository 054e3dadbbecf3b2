use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::core::downloader::DownloadProgress;
use crate::core::error::InstallerResult;
use crate::core::runtime::{InstallationManager, InstallationRecord};
use crate::core::state::RuntimeSettings;

#[derive(Parser, Debug)]
#[command(name = "electron-bootstrap", version)]
#[command(about = "Install a pinned Electron runtime on demand and launch it", long_about = None)]
pub struct Cli {
    /// JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Declared runtime version, e.g. 11.1.0.
    #[arg(long)]
    runtime_version: Option<String>,
    /// Install directory. Relative paths resolve against the per-user data directory.
    #[arg(long)]
    install_path: Option<PathBuf>,
    /// Platform key override (darwin, mas, linux, freebsd, openbsd, win32).
    #[arg(long)]
    platform: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Download and unpack the runtime if it is missing or outdated.
    Install,
    /// Start the installed runtime detached.
    Launch,
    /// Install if needed, then launch (default).
    Run,
    /// Print the installation record as JSON.
    Status,
}

pub async fn execute(cli: Cli) -> InstallerResult<()> {
    let settings = resolve_settings(&cli).await?;
    let command = cli.command.unwrap_or(Commands::Run);

    match command {
        Commands::Install => {
            let (manager, bar) = manager_with_progress(settings)?;
            let record = manager.ensure_installed().await;
            bar.finish_and_clear();
            print_installed(&record?);
        }
        Commands::Launch => {
            let manager = InstallationManager::new(settings)?;
            launch(&manager).await?;
        }
        Commands::Run => {
            let (manager, bar) = manager_with_progress(settings)?;
            let record = manager.ensure_installed().await;
            bar.finish_and_clear();
            print_installed(&record?);
            launch(&manager).await?;
        }
        Commands::Status => {
            let manager = InstallationManager::new(settings)?;
            let record = manager.inspect().await?;
            let report = serde_json::json!({
                "ready": record.is_ready(),
                "record": record,
                "install_dir": manager.install_dir(),
                "platform": manager.profile().os().key(),
                "download_url": manager.download_url(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn resolve_settings(cli: &Cli) -> InstallerResult<RuntimeSettings> {
    let mut settings = match &cli.config {
        Some(path) => RuntimeSettings::load(path).await?,
        None => RuntimeSettings::default(),
    };

    if let Some(version) = &cli.runtime_version {
        settings.version = version.clone();
    }
    if let Some(install_path) = &cli.install_path {
        settings.install_path = install_path.clone();
    }
    if let Some(platform) = &cli.platform {
        settings.platform = Some(platform.clone());
    }

    settings.validate()?;
    Ok(settings)
}

fn manager_with_progress(
    settings: RuntimeSettings,
) -> InstallerResult<(InstallationManager, ProgressBar)> {
    let bar = download_bar();
    let sink = bar.clone();
    let manager = InstallationManager::new(settings)?.with_progress(Arc::new(
        move |progress: DownloadProgress| {
            if let Some(total) = progress.total_bytes {
                sink.set_length(total);
            }
            sink.set_position(progress.received_bytes);
        },
    ));
    Ok((manager, bar))
}

fn download_bar() -> ProgressBar {
    let bar = ProgressBar::no_length();
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.cyan.bold} {msg:<12} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} {elapsed_precise}",
    ) {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_message("downloading");
    bar
}

fn print_installed(record: &InstallationRecord) {
    match &record.executable_path {
        Some(path) => println!("{} ready at {}", record.declared_version, path.display()),
        None => println!("{} ready", record.declared_version),
    }
}

async fn launch(manager: &InstallationManager) -> InstallerResult<()> {
    let pid = manager.launch().await?;
    match pid {
        Some(pid) => {
            info!("Runtime started with pid {}", pid);
            println!("launched pid {pid}");
        }
        None => println!("launched"),
    }
    Ok(())
}
