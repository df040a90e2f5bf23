//! Typed notifications pushed by the pipeline.
//!
//! Every state change of a download, extraction or preparation run is
//! reported through an [`EventSink`]; nothing in the pipeline offers a
//! polling API.

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Started,
    Paused,
    Resumed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum Event {
    #[serde(rename = "msixvc_download_status")]
    DownloadStatus(DownloadStatus),

    #[serde(rename = "msixvc_download_progress")]
    DownloadProgress {
        downloaded: i64,
        /// `-1` while the size is unknown.
        total: i64,
        dest: PathBuf,
    },

    #[serde(rename = "msixvc_download_done")]
    DownloadDone { dest: PathBuf },

    #[serde(rename = "msixvc_download_error")]
    DownloadError { message: String },

    ExtractProgress {
        dir: PathBuf,
        files: u64,
        bytes: u64,
        /// Unix milliseconds.
        ts: i64,
    },

    ExtractDone { dir: PathBuf },

    ExtractError { message: String },

    PreparationStarted { step: String },

    PreparationDone { step: String, success: bool },

    #[serde(rename = "appx_install_loading")]
    PackageSwapLoading(bool),
}

impl Event {
    /// True for the events that end a download attempt.
    pub fn is_download_terminal(&self) -> bool {
        matches!(
            self,
            Event::DownloadDone { .. }
                | Event::DownloadError { .. }
                | Event::DownloadStatus(DownloadStatus::Paused | DownloadStatus::Cancelled)
        )
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Forwards events into an unbounded channel. Events emitted after the
/// receiver is dropped are discarded.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<Event>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

/// Writes events to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        match &event {
            Event::DownloadProgress { .. } | Event::ExtractProgress { .. } => {
                tracing::debug!(?event, "Progress");
            }
            Event::DownloadError { message } | Event::ExtractError { message } => {
                tracing::error!("{message}");
            }
            Event::PreparationDone { step, success: false } => {
                tracing::warn!(step = %step, "Preparation step failed");
            }
            _ => tracing::info!(?event, "Event"),
        }
    }
}
