use crate::cli::DownloadParams;
use crate::download::DownloadCoordinator;
use crate::error::LaunchPrepError;
use crate::events::{ChannelSink, DownloadStatus, Event};
use crate::storage::StorageLayout;
use eyre::eyre;
use std::sync::Arc;

/// Progress is logged each time another tenth of the file has arrived.
const PROGRESS_LOG_STEP: i64 = 10;

pub async fn run_download(params: DownloadParams) -> Result<(), LaunchPrepError> {
    let DownloadParams {
        app_config,
        url,
        discard_partial,
    } = params;

    let layout = StorageLayout::from_config(&app_config.storage);
    let (sink, mut events) = ChannelSink::channel();
    let coordinator = DownloadCoordinator::new(&app_config.download, layout, Arc::new(sink))?;

    let dest = coordinator.start(&url)?;
    tracing::info!("Downloading {} to {}", url, dest.display());

    let mut interrupted = false;
    let mut last_logged = -1;
    loop {
        let event = tokio::select! {
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal?;
                interrupted = true;
                if discard_partial {
                    tracing::info!("Interrupted, cancelling the download");
                    coordinator.cancel();
                } else {
                    tracing::info!("Interrupted, pausing the download. Run the same command again to resume.");
                    coordinator.pause();
                }
                continue;
            }
            event = events.recv() => event,
        };

        let Some(event) = event else {
            return Err(eyre!("Download event stream closed unexpectedly").into());
        };

        match event {
            Event::DownloadProgress {
                downloaded, total, ..
            } => {
                if total > 0 {
                    let step = downloaded.saturating_mul(PROGRESS_LOG_STEP) / total;
                    if step > last_logged {
                        last_logged = step;
                        tracing::info!(
                            "{}% ({} of {} bytes)",
                            step * (100 / PROGRESS_LOG_STEP),
                            downloaded,
                            total
                        );
                    }
                } else {
                    tracing::debug!("{} bytes downloaded", downloaded);
                }
            }
            Event::DownloadDone { dest } => {
                tracing::info!("Download completed: {}", dest.display());
                return Ok(());
            }
            Event::DownloadError { message } => {
                return Err(eyre!("Download failed: {message}").into());
            }
            Event::DownloadStatus(DownloadStatus::Paused) => {
                tracing::info!("Download paused, partial file kept at {}", dest.display());
                return Ok(());
            }
            Event::DownloadStatus(DownloadStatus::Cancelled) => {
                tracing::info!("Download cancelled");
                return Ok(());
            }
            Event::DownloadStatus(status) => tracing::debug!(?status, "Download status"),
            other => tracing::trace!(?other, "Ignoring event"),
        }
    }
}
