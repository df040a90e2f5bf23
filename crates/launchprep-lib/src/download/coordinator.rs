use super::DownloadError;
use super::download::run_attempt;
use super::naming::{derive_filename, strip_filename_param};
use super::types::{AttemptOutcome, AttemptTicket, Control, DownloadSession, UNKNOWN_TOTAL};
use crate::config::DownloadConfig;
use crate::events::{DownloadStatus, Event, EventSink};
use crate::storage::StorageLayout;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Owns the single download session and is the only way to mutate it.
///
/// Every flag change, session swap and event emission happens under one
/// mutex, so the events of a session are observed in the order the state
/// changed. Bytes are streamed by a spawned task outside the lock; attempts
/// additionally serialize on a writer gate so a destination never has two
/// writers.
#[derive(Clone)]
pub struct DownloadCoordinator {
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) client: reqwest::Client,
    pub(super) progress_interval: Duration,
    pub(super) writer_gate: tokio::sync::Mutex<()>,
    layout: StorageLayout,
    events: Arc<dyn EventSink>,
    runtime: Handle,
    session: Mutex<Option<DownloadSession>>,
    next_session_id: AtomicU64,
}

impl DownloadCoordinator {
    /// Must be called from within a Tokio runtime; attempts are spawned on it.
    pub fn new(
        config: &DownloadConfig,
        layout: StorageLayout,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, DownloadError> {
        let runtime = Handle::try_current().map_err(|_| DownloadError::NoRuntime)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(DownloadError::Client)?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                progress_interval: config.progress_interval(),
                writer_gate: tokio::sync::Mutex::new(()),
                layout,
                events,
                runtime,
                session: Mutex::new(None),
                next_session_id: AtomicU64::new(1),
            }),
        })
    }

    /// Starts downloading `url` into the installers directory and returns the
    /// destination immediately. A running attempt of a previous session is
    /// interrupted; its partial file stays on disk unless that session was
    /// already cancelled, in which case `Cancelled` is emitted before the new
    /// `Started` and the file is removed before the new attempt opens its own.
    pub fn start(&self, url: &str) -> Result<PathBuf, DownloadError> {
        let installers = self.inner.layout.installers_dir().map_err(|source| {
            let err = DownloadError::InstallersDir {
                path: self.inner.layout.base_root().join("installers"),
                source,
            };
            self.inner.events.emit(Event::DownloadError {
                message: err.to_string(),
            });
            err
        })?;
        let dest = installers.join(derive_filename(url));
        let request_url = strip_filename_param(url);

        let mut guard = self.inner.lock_session();
        let mut pending_discard = None;
        if let Some(previous) = guard.take() {
            if previous.running {
                tracing::info!(dest = %previous.dest.display(), "Interrupting previous download");
                previous.cancel.cancel();
            }
            if previous.cancelled {
                // Its attempt still owns the file and now ends as superseded.
                pending_discard = Some(previous.dest);
                self.inner
                    .events
                    .emit(Event::DownloadStatus(DownloadStatus::Cancelled));
            }
        }

        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = guard.insert(DownloadSession::new(id, request_url, dest.clone()));
        session.pending_discard = pending_discard;
        tracing::info!(url = %session.url, dest = %dest.display(), "Starting download");
        self.inner
            .events
            .emit(Event::DownloadStatus(DownloadStatus::Started));
        launch(&self.inner, session);

        Ok(dest)
    }

    /// Interrupts the current attempt, keeping the partial file. Returns
    /// false when there is nothing to pause.
    pub fn pause(&self) -> bool {
        let mut guard = self.inner.lock_session();
        let Some(session) = guard.as_mut() else {
            return false;
        };
        if session.paused || session.cancelled {
            return false;
        }

        session.paused = true;
        session.cancel.cancel();
        tracing::info!(
            dest = %session.dest.display(),
            downloaded = session.downloaded,
            "Download paused"
        );
        self.inner
            .events
            .emit(Event::DownloadStatus(DownloadStatus::Paused));
        true
    }

    /// Continues a paused session from the current size of its file.
    pub fn resume(&self) -> bool {
        let mut guard = self.inner.lock_session();
        let Some(session) = guard.as_mut() else {
            return false;
        };
        if !session.paused || session.cancelled {
            return false;
        }

        session.paused = false;
        tracing::info!(dest = %session.dest.display(), "Download resumed");
        self.inner
            .events
            .emit(Event::DownloadStatus(DownloadStatus::Resumed));
        launch(&self.inner, session);
        true
    }

    /// Stops the session and discards its partial file.
    pub fn cancel(&self) -> bool {
        let mut guard = self.inner.lock_session();
        let Some(session) = guard.as_mut() else {
            return false;
        };
        if session.cancelled {
            return false;
        }

        session.cancelled = true;
        session.cancel.cancel();
        if session.running {
            // The attempt removes the file once it has released it.
            return true;
        }

        let dest = session.dest.clone();
        *guard = None;
        self.inner.discard(&dest);
        true
    }
}

fn launch(inner: &Arc<Inner>, session: &mut DownloadSession) {
    session.attempt += 1;
    session.cancel = CancellationToken::new();
    session.running = true;

    let ticket = AttemptTicket {
        session_id: session.id,
        attempt: session.attempt,
        url: session.url.clone(),
        dest: session.dest.clone(),
        token: session.cancel.clone(),
        discard_first: session.pending_discard.take(),
    };
    tracing::debug!(attempt = ticket.attempt, dest = %ticket.dest.display(), "Launching download attempt");
    inner.runtime.spawn(run_attempt(Arc::clone(inner), ticket));
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Option<DownloadSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current<'a>(
        guard: &'a mut MutexGuard<'_, Option<DownloadSession>>,
        ticket: &AttemptTicket,
    ) -> Option<&'a mut DownloadSession> {
        guard
            .as_mut()
            .filter(|session| session.id == ticket.session_id && session.attempt == ticket.attempt)
    }

    pub(super) fn control(&self, ticket: &AttemptTicket) -> Control {
        let mut guard = self.lock_session();
        match Self::current(&mut guard, ticket) {
            None => Control::Superseded,
            Some(session) if session.cancelled => Control::Cancel,
            Some(session) if session.paused => Control::Pause,
            Some(_) => Control::Proceed,
        }
    }

    /// Maps an error raised by an attempt whose token may have been
    /// triggered. Interruptions caused by pause, cancel or a newer session
    /// take their respective paths; anything else is a real failure.
    pub(super) fn interrupted(&self, ticket: &AttemptTicket, error: DownloadError) -> AttemptOutcome {
        if !ticket.token.is_cancelled() {
            return AttemptOutcome::Failed(error);
        }
        AttemptOutcome::stopped_by(self.control(ticket)).unwrap_or(AttemptOutcome::Failed(error))
    }

    pub(super) fn report_total(&self, ticket: &AttemptTicket, offset: i64, total: i64) {
        let mut guard = self.lock_session();
        if let Some(session) = Self::current(&mut guard, ticket) {
            session.downloaded = offset;
            session.total = total;
        }
    }

    pub(super) fn report_progress(&self, ticket: &AttemptTicket, downloaded: i64) {
        let mut guard = self.lock_session();
        let Some(session) = Self::current(&mut guard, ticket) else {
            return;
        };
        if session.paused || session.cancelled {
            return;
        }
        session.downloaded = downloaded;
        self.events.emit(Event::DownloadProgress {
            downloaded,
            total: session.total,
            dest: session.dest.clone(),
        });
    }

    pub(super) fn finish(&self, ticket: &AttemptTicket, outcome: AttemptOutcome) {
        let mut guard = self.lock_session();
        let Some(session) = Self::current(&mut guard, ticket) else {
            tracing::debug!(attempt = ticket.attempt, ?outcome, "Superseded download attempt ended");
            return;
        };
        session.running = false;

        // A pause or cancel accepted before this point wins over the result,
        // including a stream that had already ended.
        let outcome = match outcome {
            AttemptOutcome::Failed(_) | AttemptOutcome::Completed { .. }
                if session.cancelled || session.paused =>
            {
                tracing::debug!(?outcome, "Interrupted attempt ended");
                if session.cancelled {
                    AttemptOutcome::Cancelled
                } else {
                    AttemptOutcome::Paused
                }
            }
            outcome => outcome,
        };

        match outcome {
            AttemptOutcome::Completed { downloaded, total } => {
                let total = if total == UNKNOWN_TOTAL { downloaded } else { total };
                let dest = session.dest.clone();
                *guard = None;
                tracing::info!(dest = %dest.display(), bytes = downloaded, "Download complete");
                self.events.emit(Event::DownloadProgress {
                    downloaded,
                    total,
                    dest: dest.clone(),
                });
                self.events.emit(Event::DownloadDone { dest });
            }
            AttemptOutcome::Paused => {
                tracing::debug!(dest = %session.dest.display(), "Paused attempt released destination");
            }
            AttemptOutcome::Cancelled => {
                let dest = session.dest.clone();
                *guard = None;
                self.discard(&dest);
            }
            AttemptOutcome::Superseded => {}
            AttemptOutcome::Failed(err) => {
                tracing::warn!(dest = %session.dest.display(), "Download failed: {err}");
                *guard = None;
                self.events.emit(Event::DownloadError {
                    message: err.to_string(),
                });
            }
        }
    }

    pub(super) fn remove_partial(&self, dest: &Path) {
        match std::fs::remove_file(dest) {
            Ok(()) => tracing::info!(dest = %dest.display(), "Download cancelled, partial file removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(dest = %dest.display(), "Failed to remove partial file: {err}"),
        }
    }

    fn discard(&self, dest: &Path) {
        self.remove_partial(dest);
        self.events
            .emit(Event::DownloadStatus(DownloadStatus::Cancelled));
    }
}
