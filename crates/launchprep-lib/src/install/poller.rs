use crate::events::{Event, EventSink};
use crate::utils::unix_millis;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use walkdir::WalkDir;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectorySize {
    pub files: u64,
    pub bytes: u64,
}

/// Counts regular files below `dir` and sums their sizes. Entries that vanish
/// or cannot be read mid-walk are skipped.
pub fn measure_directory(dir: &Path) -> DirectorySize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .fold(DirectorySize::default(), |size, metadata| DirectorySize {
            files: size.files + 1,
            bytes: size.bytes + metadata.len(),
        })
}

/// Background task reporting how far an extraction has filled its output
/// directory.
pub struct ExtractionPoller {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ExtractionPoller {
    pub fn start(dir: PathBuf, interval: Duration, events: Arc<dyn EventSink>) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let walk_dir = dir.clone();
                        let Ok(size) = tokio::task::spawn_blocking(move || measure_directory(&walk_dir)).await else {
                            continue;
                        };
                        events.emit(Event::ExtractProgress {
                            dir: dir.clone(),
                            files: size.files,
                            bytes: size.bytes,
                            ts: unix_millis(SystemTime::now()),
                        });
                    }
                }
            }
            tracing::trace!(dir = %dir.display(), "Extraction poller stopped");
        });

        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Signals the task and waits for it, so no progress is emitted after
    /// this returns.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(err) = (&mut self.handle).await {
            tracing::debug!("Extraction poller ended abnormally: {err}");
        }
    }
}
