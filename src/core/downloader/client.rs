use std::io::ErrorKind;
use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::http::build_http_client;

/// Progress of a single download, reported after every received chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    /// From `Content-Length`; `None` when the server did not send one.
    pub total_bytes: Option<u64>,
    pub received_bytes: u64,
}

impl DownloadProgress {
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) | None => None,
            Some(total) => Some(self.received_bytes as f64 / total as f64),
        }
    }
}

/// Streaming archive downloader.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(connect_timeout: std::time::Duration) -> InstallerResult<Self> {
        Ok(Self {
            client: build_http_client(connect_timeout)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Stream `url` into a new file at `dest`, returning the number of bytes written.
    ///
    /// `dest` must not exist: a leftover file from a crashed attempt surfaces as
    /// `DestinationExists` instead of being overwritten. The status is checked before
    /// the file is created, so an HTTP error never leaves a file behind.
    pub async fn fetch<F>(&self, url: &str, dest: &Path, mut on_progress: F) -> InstallerResult<u64>
    where
        F: FnMut(DownloadProgress),
    {
        if tokio::fs::try_exists(dest)
            .await
            .map_err(|source| InstallerError::io(dest, source))?
        {
            return Err(InstallerError::DestinationExists {
                path: dest.to_path_buf(),
            });
        }

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallerError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .await
            .map_err(|source| {
                if source.kind() == ErrorKind::AlreadyExists {
                    InstallerError::DestinationExists {
                        path: dest.to_path_buf(),
                    }
                } else {
                    InstallerError::io(dest, source)
                }
            })?;

        let mut received_bytes = 0_u64;
        let mut failure = None;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    failure = Some(InstallerError::Network(err));
                    break;
                }
            };
            if let Err(source) = file.write_all(&chunk).await {
                failure = Some(InstallerError::io(dest, source));
                break;
            }

            received_bytes = received_bytes.saturating_add(chunk.len() as u64);
            on_progress(DownloadProgress {
                total_bytes,
                received_bytes,
            });
        }

        // Settle pending writes so the handle is closed before any error surfaces.
        let flushed = file.flush().await;
        if let Some(err) = failure {
            drop(file);
            warn!(
                "Download of {} stopped after {} bytes, partial file kept at {:?}",
                url, received_bytes, dest
            );
            return Err(err);
        }
        flushed.map_err(|source| InstallerError::io(dest, source))?;
        file.sync_all()
            .await
            .map_err(|source| InstallerError::io(dest, source))?;
        drop(file);

        debug!("Downloaded {} bytes: {} -> {:?}", received_bytes, url, dest);
        Ok(received_bytes)
    }
}
