use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::core::error::{InstallerError, InstallerResult};

pub const LOCK_FILE: &str = ".install.lock";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// An owner writes its record right after creating the file; an unreadable lock
/// older than this belongs to a process that died in between.
const LOCK_WRITE_GRACE: Duration = Duration::from_secs(2);
/// Process start times are whole seconds and may be rounded.
const START_TIME_SLACK_SECS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LockOwner {
    pid: u32,
    timestamp: i64,
    #[serde(default)]
    nonce: u32,
}

impl LockOwner {
    fn current() -> Self {
        let now = Utc::now();
        Self {
            pid: std::process::id(),
            timestamp: now.timestamp(),
            nonce: now.timestamp_subsec_nanos(),
        }
    }
}

/// Exclusive hold on an install directory. Released on drop.
#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
    payload: Vec<u8>,
}

impl InstallLock {
    /// Wait until the lock file in `install_dir` can be created. A lock whose owner
    /// process is gone is cleared; a live owner is waited for however long it takes.
    pub async fn acquire(install_dir: &Path) -> InstallerResult<Self> {
        let lock_path = install_dir.join(LOCK_FILE);
        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            match tokio::fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&lock_path)
                .await
            {
                Ok(mut file) => {
                    let payload = serde_json::to_vec(&LockOwner::current())?;
                    if let Err(source) = file.write_all(&payload).await {
                        drop(file);
                        let _ = tokio::fs::remove_file(&lock_path).await;
                        return Err(InstallerError::io(&lock_path, source));
                    }
                    return Ok(Self {
                        path: lock_path,
                        payload,
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    clear_stale_lock(&lock_path).await;
                    if attempts % 20 == 0 {
                        info!("Waiting for install lock at {:?}", lock_path);
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(source) => return Err(InstallerError::io(&lock_path, source)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        // Only remove the file while it still carries our record.
        match std::fs::read(&self.path) {
            Ok(content) if content == self.payload => {
                if let Err(source) = std::fs::remove_file(&self.path) {
                    warn!("Failed to remove lock {:?}: {}", self.path, source);
                }
            }
            Ok(_) => warn!("Lock {:?} was taken over, leaving it in place", self.path),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => warn!("Failed to read lock {:?}: {}", self.path, source),
        }
    }
}

async fn clear_stale_lock(lock_path: &Path) {
    let Ok(content) = tokio::fs::read(lock_path).await else {
        return;
    };

    let owner = match serde_json::from_slice::<LockOwner>(&content) {
        Ok(owner) => owner,
        Err(_) => {
            let age = tokio::fs::metadata(lock_path)
                .await
                .ok()
                .and_then(|meta| meta.modified().ok())
                .and_then(|modified| modified.elapsed().ok());
            if age.is_some_and(|age| age > LOCK_WRITE_GRACE) {
                warn!("Removing unreadable install lock {:?}", lock_path);
                let _ = tokio::fs::remove_file(lock_path).await;
            }
            return;
        }
    };

    if owner_is_stale(&owner, owner_start_time(owner.pid)) {
        warn!(
            "Removing stale install lock {:?} left by pid {}",
            lock_path, owner.pid
        );
        let _ = tokio::fs::remove_file(lock_path).await;
    }
}

/// The owner is gone, or its pid now belongs to a process started after the lock.
fn owner_is_stale(owner: &LockOwner, owner_start: Option<u64>) -> bool {
    match owner_start {
        None => true,
        Some(started) => {
            let locked_at = u64::try_from(owner.timestamp).unwrap_or(0);
            started > locked_at + START_TIME_SLACK_SECS
        }
    }
}

/// Start time of a running `pid`, in seconds since the epoch.
fn owner_start_time(pid: u32) -> Option<u64> {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), ProcessRefreshKind::new());
    system
        .process(pid)
        .filter(|process| process.status() != ProcessStatus::Zombie)
        .map(|process| process.start_time())
}
