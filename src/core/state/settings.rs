use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{InstallerError, InstallerResult};

const APP_DIR_NAME: &str = "electron-bootstrap";

pub const DEFAULT_RUNTIME_VERSION: &str = "11.1.0";

/// Everything the installer needs to know, passed explicitly to the manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Declared runtime version, e.g. `11.1.0`.
    pub version: String,
    /// Install directory. Relative paths are joined onto `anchor`.
    pub install_path: PathBuf,
    /// Stable base for relative install paths. Never the working directory.
    pub anchor: Option<PathBuf>,
    /// Overrides the host platform key (`darwin`, `mas`, `linux`, `win32`, ...).
    pub platform: Option<String>,
    pub download_host: String,
    pub organization: String,
    pub runtime_name: String,
    /// Bundle name used for the macOS app path.
    pub app_name: String,
    pub launch_args: Vec<String>,
    /// Environment keys removed before spawn, on top of the built-in embedder keys.
    pub strip_env: Vec<String>,
    pub connect_timeout_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            version: DEFAULT_RUNTIME_VERSION.to_string(),
            install_path: PathBuf::from("bin"),
            anchor: None,
            platform: None,
            download_host: "https://github.com".to_string(),
            organization: "electron".to_string(),
            runtime_name: "electron".to_string(),
            app_name: "Electron".to_string(),
            launch_args: Vec::new(),
            strip_env: Vec::new(),
            connect_timeout_secs: 30,
        }
    }
}

impl RuntimeSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub async fn load(path: &Path) -> InstallerResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| InstallerError::io(path, source))?;
        let settings: RuntimeSettings = serde_json::from_str(&raw)?;
        debug!("Loaded settings from {:?}", path);
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> InstallerResult<()> {
        let version = self.version.trim();
        if version.is_empty() {
            return Err(InstallerError::InvalidSettings(
                "runtime version must not be empty".into(),
            ));
        }
        if version != self.version
            || self
                .version
                .chars()
                .any(|ch| ch.is_whitespace() || matches!(ch, '/' | '\\'))
        {
            return Err(InstallerError::InvalidSettings(format!(
                "runtime version {:?} contains whitespace or path separators",
                self.version
            )));
        }
        if self.runtime_name.trim().is_empty() {
            return Err(InstallerError::InvalidSettings(
                "runtime_name must not be empty".into(),
            ));
        }
        if self.app_name.trim().is_empty() {
            return Err(InstallerError::InvalidSettings(
                "app_name must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Absolute install directory: `install_path` as-is when absolute, otherwise joined
    /// onto the anchor.
    pub fn install_dir(&self) -> PathBuf {
        if self.install_path.is_absolute() {
            return self.install_path.clone();
        }
        let anchor = self.anchor.clone().unwrap_or_else(default_anchor_dir);
        anchor.join(&self.install_path)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

/// Per-user data directory used when no anchor is configured.
pub fn default_anchor_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
