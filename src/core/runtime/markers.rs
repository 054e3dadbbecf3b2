// ─── Install Markers ───
// Single-line text files recording what is installed in the install directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{InstallerError, InstallerResult};

pub const VERSION_MARKER: &str = "version";
pub const PATH_MARKER: &str = "path.txt";

/// Sole reader and writer of the marker files.
#[derive(Debug, Clone)]
pub struct VersionStore {
    root: PathBuf,
}

impl VersionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn read_installed_version(&self) -> InstallerResult<Option<String>> {
        read_marker(&self.root.join(VERSION_MARKER)).await
    }

    pub async fn write_installed_version(&self, version: &str) -> InstallerResult<()> {
        write_marker(&self.root.join(VERSION_MARKER), version).await
    }

    /// Recorded executable. Relative content resolves against the install root.
    pub async fn read_executable_path(&self) -> InstallerResult<Option<PathBuf>> {
        let Some(raw) = read_marker(&self.root.join(PATH_MARKER)).await? else {
            return Ok(None);
        };
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            Ok(Some(path))
        } else {
            Ok(Some(self.root.join(path)))
        }
    }

    pub async fn write_executable_path(&self, executable: &Path) -> InstallerResult<()> {
        let value = executable.to_str().ok_or_else(|| {
            InstallerError::InvalidSettings(format!(
                "executable path {:?} is not valid UTF-8",
                executable
            ))
        })?;
        write_marker(&self.root.join(PATH_MARKER), value).await
    }
}

/// First line of the marker, or `None` when the file is missing, empty or unreadable
/// as text. A crash mid-write leaves an empty file, which must read as absent.
async fn read_marker(path: &Path) -> InstallerResult<Option<String>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::InvalidData) => {
            return Ok(None);
        }
        Err(source) => return Err(InstallerError::io(path, source)),
    };

    let line = raw.lines().next().unwrap_or_default();
    if line.trim().is_empty() {
        debug!("Marker {:?} is empty, treating as absent", path);
        return Ok(None);
    }
    Ok(Some(line.to_string()))
}

async fn write_marker(path: &Path, value: &str) -> InstallerResult<()> {
    if value.contains(['\n', '\r']) {
        return Err(InstallerError::InvalidSettings(format!(
            "marker value for {:?} must be a single line",
            path
        )));
    }
    // Reads return the line verbatim, so padding would survive as part of the value.
    if value.trim() != value {
        return Err(InstallerError::InvalidSettings(format!(
            "marker value {:?} for {:?} has surrounding whitespace",
            value, path
        )));
    }

    tokio::fs::write(path, format!("{value}\n"))
        .await
        .map_err(|source| InstallerError::io(path, source))
}
