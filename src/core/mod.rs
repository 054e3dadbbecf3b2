// ─── electron-bootstrap core ───
// Keeps one pinned runtime version installed and launches it.
//
// Architecture:
//   core/
//     state/     : Settings + install-path anchoring
//     runtime/   : Platform naming, markers, extraction, install lock, manager
//     downloader/: Streaming archive download with progress
//     launch/    : Environment sanitizing + detached spawn
//     http.rs    : Shared HTTP client setup
//     error.rs   : Crate-wide error type

pub mod downloader;
pub mod error;
pub mod http;
pub mod launch;
pub mod runtime;
pub mod state;
