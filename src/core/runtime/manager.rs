use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::core::downloader::{DownloadProgress, Downloader};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::launch;
use crate::core::state::RuntimeSettings;

use super::extract::Extractor;
use super::lock::InstallLock;
use super::markers::VersionStore;
use super::platform::PlatformProfile;

const PROGRESS_LOG_STEP: u64 = 4 * 1024 * 1024;

pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Where one `ensure_installed` attempt currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    Uninitialized,
    Validating,
    Ready,
    Downloading,
    Extracting,
    Finalizing,
    Failed(String),
}

/// What the install directory says about the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationRecord {
    pub declared_version: String,
    pub installed_version: Option<String>,
    pub executable_path: Option<PathBuf>,
}

impl InstallationRecord {
    /// Installed version matches and the recorded executable can be started.
    pub fn is_ready(&self) -> bool {
        self.installed_version.as_deref() == Some(self.declared_version.as_str())
            && self
                .executable_path
                .as_deref()
                .is_some_and(is_executable_file)
    }
}

/// Installs the declared runtime on demand and launches it.
pub struct InstallationManager {
    settings: RuntimeSettings,
    install_dir: PathBuf,
    profile: PlatformProfile,
    store: VersionStore,
    downloader: Downloader,
    extractor: Extractor,
    progress: Option<ProgressCallback>,
    state: watch::Sender<InstallState>,
}

impl InstallationManager {
    pub fn new(settings: RuntimeSettings) -> InstallerResult<Self> {
        settings.validate()?;
        let profile = PlatformProfile::from_settings(&settings)?;
        let install_dir = settings.install_dir();
        let downloader = Downloader::new(settings.connect_timeout())?;
        let extractor = Extractor::for_family(profile.family());
        let (state, _) = watch::channel(InstallState::Uninitialized);

        Ok(Self {
            store: VersionStore::new(&install_dir),
            settings,
            install_dir,
            profile,
            downloader,
            extractor,
            progress: None,
            state,
        })
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    pub fn download_url(&self) -> String {
        self.profile.download_url(
            &self.settings.download_host,
            &self.settings.organization,
            &self.settings.version,
        )
    }

    pub fn state(&self) -> InstallState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<InstallState> {
        self.state.subscribe()
    }

    /// Read the markers without touching anything.
    pub async fn inspect(&self) -> InstallerResult<InstallationRecord> {
        if !tokio::fs::try_exists(&self.install_dir)
            .await
            .map_err(|source| InstallerError::io(&self.install_dir, source))?
        {
            return Ok(InstallationRecord {
                declared_version: self.settings.version.clone(),
                installed_version: None,
                executable_path: None,
            });
        }

        Ok(InstallationRecord {
            declared_version: self.settings.version.clone(),
            installed_version: self.store.read_installed_version().await?,
            executable_path: self.store.read_executable_path().await?,
        })
    }

    /// Make sure the declared version is installed, downloading it if needed.
    ///
    /// A no-op without network access when the installation is already ready.
    #[instrument(skip(self), fields(version = %self.settings.version))]
    pub async fn ensure_installed(&self) -> InstallerResult<InstallationRecord> {
        match self.run_install().await {
            Ok(record) => {
                self.transition(InstallState::Ready);
                Ok(record)
            }
            Err(err) => {
                self.transition(InstallState::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    async fn run_install(&self) -> InstallerResult<InstallationRecord> {
        self.transition(InstallState::Validating);
        let record = self.inspect().await?;
        if record.is_ready() {
            debug!("Runtime {} already installed", self.settings.version);
            return Ok(record);
        }

        tokio::fs::create_dir_all(&self.install_dir)
            .await
            .map_err(|source| InstallerError::io(&self.install_dir, source))?;

        let _lock = InstallLock::acquire(&self.install_dir).await?;

        // Another process may have finished while we waited for the lock.
        let record = self.inspect().await?;
        if record.is_ready() {
            info!("Runtime {} installed by another process", self.settings.version);
            return Ok(record);
        }

        self.transition(InstallState::Downloading);
        let archive_path = self
            .install_dir
            .join(self.profile.archive_name(&self.settings.version));
        let url = self.download_url();
        info!("Downloading runtime {} from {}", self.settings.version, url);
        let download_start = Instant::now();
        let mut last_logged = 0_u64;
        let received = self
            .downloader
            .fetch(&url, &archive_path, |progress| {
                if progress.received_bytes >= last_logged + PROGRESS_LOG_STEP {
                    last_logged = progress.received_bytes;
                    debug!(
                        "Downloaded {} of {:?} bytes",
                        progress.received_bytes, progress.total_bytes
                    );
                }
                if let Some(callback) = &self.progress {
                    callback(progress);
                }
            })
            .await?;
        info!(
            "Runtime download finished: {} bytes in {:?}",
            received,
            download_start.elapsed()
        );

        self.transition(InstallState::Extracting);
        let extract_start = Instant::now();
        self.extractor
            .extract(&archive_path, &self.install_dir)
            .await?;
        info!(
            "Runtime extraction finished in {:?}",
            extract_start.elapsed()
        );

        self.transition(InstallState::Finalizing);
        let executable = self
            .install_dir
            .join(self.profile.executable_relative_path());
        self.store.write_executable_path(&executable).await?;
        self.store
            .write_installed_version(&self.settings.version)
            .await?;

        let record = self.inspect().await?;
        if !record.is_ready() {
            return Err(InstallerError::InstallationIncomplete {
                version: self.settings.version.clone(),
                executable: record.executable_path,
            });
        }

        info!(
            "Runtime {} installed at {:?}",
            self.settings.version, executable
        );
        Ok(record)
    }

    /// Start the installed runtime detached and return its pid.
    ///
    /// Never installs: call `ensure_installed` first.
    #[instrument(skip(self))]
    pub async fn launch(&self) -> InstallerResult<Option<u32>> {
        let executable = if tokio::fs::try_exists(&self.install_dir)
            .await
            .map_err(|source| InstallerError::io(&self.install_dir, source))?
        {
            self.store.read_executable_path().await?
        } else {
            None
        };
        let Some(executable) = executable else {
            return Err(InstallerError::NotInstalled {
                install_dir: self.install_dir.clone(),
            });
        };

        let env = launch::launch_environment(&self.settings.strip_env);
        launch::spawn_detached(&executable, &self.settings.launch_args, env)
    }

    fn transition(&self, next: InstallState) {
        debug!("Install state -> {:?}", next);
        self.state.send_replace(next);
    }
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    metadata.is_file() && has_execute_bit(&metadata)
}

#[cfg(unix)]
fn has_execute_bit(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_execute_bit(_metadata: &std::fs::Metadata) -> bool {
    true
}
