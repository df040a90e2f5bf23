use super::DownloadError;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Total size reported while the server has not announced one.
pub const UNKNOWN_TOTAL: i64 = -1;

/// Chunks are written through a buffer of this size.
pub const WRITE_BUFFER_SIZE: usize = 128 * 1024;

/// The single in-flight or paused transfer.
#[derive(Debug)]
pub(crate) struct DownloadSession {
    pub id: u64,
    /// Request URL with the local naming parameter removed.
    pub url: String,
    pub dest: PathBuf,
    pub total: i64,
    pub downloaded: i64,
    pub paused: bool,
    pub cancelled: bool,
    pub running: bool,
    /// Incremented each time an attempt is launched for this session.
    pub attempt: u64,
    /// Token of the current attempt; replaced on every launch.
    pub cancel: CancellationToken,
    /// File of a cancelled session this one replaced while its attempt was
    /// still writing. Removed by the next attempt once it holds the writer gate.
    pub pending_discard: Option<PathBuf>,
}

impl DownloadSession {
    pub fn new(id: u64, url: String, dest: PathBuf) -> Self {
        Self {
            id,
            url,
            dest,
            total: UNKNOWN_TOTAL,
            downloaded: 0,
            paused: false,
            cancelled: false,
            running: false,
            attempt: 0,
            cancel: CancellationToken::new(),
            pending_discard: None,
        }
    }
}

/// Identifies one attempt and carries what it needs outside the lock.
#[derive(Clone, Debug)]
pub(crate) struct AttemptTicket {
    pub session_id: u64,
    pub attempt: u64,
    pub url: String,
    pub dest: PathBuf,
    pub token: CancellationToken,
    pub discard_first: Option<PathBuf>,
}

/// What the streaming loop must do next, read from the session flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Control {
    Proceed,
    Pause,
    Cancel,
    /// The session was replaced or a newer attempt was launched.
    Superseded,
}

#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    Completed { downloaded: i64, total: i64 },
    Paused,
    Cancelled,
    Superseded,
    Failed(DownloadError),
}

impl AttemptOutcome {
    /// Outcome for a control signal that stops the loop.
    pub fn stopped_by(control: Control) -> Option<Self> {
        match control {
            Control::Proceed => None,
            Control::Pause => Some(AttemptOutcome::Paused),
            Control::Cancel => Some(AttemptOutcome::Cancelled),
            Control::Superseded => Some(AttemptOutcome::Superseded),
        }
    }
}
