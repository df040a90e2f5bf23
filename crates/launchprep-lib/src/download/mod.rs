mod coordinator;
#[allow(clippy::module_inception)]
mod download;
pub mod naming;
mod types;
pub mod user_agent;

pub use coordinator::DownloadCoordinator;
pub use types::{UNKNOWN_TOTAL, WRITE_BUFFER_SIZE};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Installers directory unavailable at {path}: {source}")]
    InstallersDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Download coordinator requires a running Tokio runtime")]
    NoRuntime,

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("HTTP {status}")]
    Status { status: reqwest::StatusCode },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Transfer interrupted")]
    Interrupted,
}
