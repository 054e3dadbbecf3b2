use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the installer core.
/// Every module returns `Result<T, InstallerError>`.
#[derive(Debug, Error)]
pub enum InstallerError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Platform ────────────────────────────────────────
    #[error("Runtime builds are not available on platform: {0}")]
    UnsupportedPlatform(String),

    // ── Network ─────────────────────────────────────────
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Download destination already exists (stale partial download?): {path:?}")]
    DestinationExists { path: PathBuf },

    // ── Archive ─────────────────────────────────────────
    #[error("Failed to extract {archive:?}: {reason}")]
    Extraction { archive: PathBuf, reason: String },

    // ── Installation ────────────────────────────────────
    #[error("Installation of {version} incomplete: executable {executable:?} is not usable")]
    InstallationIncomplete {
        version: String,
        executable: Option<PathBuf>,
    },

    #[error("Runtime is not installed in {install_dir:?}")]
    NotInstalled { install_dir: PathBuf },

    // ── Launch ──────────────────────────────────────────
    #[error("Failed to start {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    // ── Settings ────────────────────────────────────────
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type InstallerResult<T> = Result<T, InstallerError>;

impl InstallerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InstallerError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn extraction(archive: impl Into<PathBuf>, reason: impl ToString) -> Self {
        InstallerError::Extraction {
            archive: archive.into(),
            reason: reason.to_string(),
        }
    }
}
