use std::path::PathBuf;

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::state::RuntimeSettings;

/// Only x64 builds are published under the naming scheme we consume.
const ARCHIVE_ARCH: &str = "x64";

/// Operating systems with published runtime builds, keyed the way release
/// archives name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Darwin,
    Mas,
    Linux,
    FreeBsd,
    OpenBsd,
    Win32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFamily {
    MacOs,
    Posix,
    Windows,
}

impl HostOs {
    pub fn parse(key: &str) -> InstallerResult<Self> {
        match key {
            "darwin" => Ok(Self::Darwin),
            "mas" => Ok(Self::Mas),
            "linux" => Ok(Self::Linux),
            "freebsd" => Ok(Self::FreeBsd),
            "openbsd" => Ok(Self::OpenBsd),
            "win32" => Ok(Self::Win32),
            other => Err(InstallerError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Platform of the running process.
    pub fn current() -> InstallerResult<Self> {
        Self::parse(platform_key(std::env::consts::OS))
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Darwin => "darwin",
            Self::Mas => "mas",
            Self::Linux => "linux",
            Self::FreeBsd => "freebsd",
            Self::OpenBsd => "openbsd",
            Self::Win32 => "win32",
        }
    }

    pub fn family(self) -> PlatformFamily {
        match self {
            Self::Darwin | Self::Mas => PlatformFamily::MacOs,
            Self::Linux | Self::FreeBsd | Self::OpenBsd => PlatformFamily::Posix,
            Self::Win32 => PlatformFamily::Windows,
        }
    }
}

/// Translate Rust's `std::env::consts::OS` into the release naming scheme.
fn platform_key(rust_os: &str) -> &str {
    match rust_os {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// Naming rules for one platform. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    os: HostOs,
    runtime_name: String,
    app_name: String,
}

impl PlatformProfile {
    pub fn new(os: HostOs, runtime_name: &str, app_name: &str) -> Self {
        Self {
            os,
            runtime_name: runtime_name.to_string(),
            app_name: app_name.to_string(),
        }
    }

    /// Resolve from settings, honouring the platform override.
    pub fn from_settings(settings: &RuntimeSettings) -> InstallerResult<Self> {
        let os = match settings.platform.as_deref() {
            Some(key) => HostOs::parse(key)?,
            None => HostOs::current()?,
        };
        Ok(Self::new(os, &settings.runtime_name, &settings.app_name))
    }

    pub fn os(&self) -> HostOs {
        self.os
    }

    pub fn family(&self) -> PlatformFamily {
        self.os.family()
    }

    /// `<runtime>-v<version>-<os>-x64.zip`, with the exact OS key preserved.
    pub fn archive_name(&self, version: &str) -> String {
        format!(
            "{}-v{}-{}-{}.zip",
            self.runtime_name,
            version,
            self.os.key(),
            ARCHIVE_ARCH
        )
    }

    pub fn executable_relative_path(&self) -> PathBuf {
        match self.family() {
            PlatformFamily::MacOs => PathBuf::from(format!("{}.app", self.app_name))
                .join("Contents")
                .join("MacOS")
                .join(&self.app_name),
            PlatformFamily::Posix => PathBuf::from(self.runtime_name.to_lowercase()),
            PlatformFamily::Windows => PathBuf::from(format!("{}.exe", self.runtime_name)),
        }
    }

    pub fn download_url(&self, host: &str, organization: &str, version: &str) -> String {
        format!(
            "{}/{}/{}/releases/download/v{}/{}",
            host.trim_end_matches('/'),
            organization,
            self.runtime_name,
            version,
            self.archive_name(version)
        )
    }
}
