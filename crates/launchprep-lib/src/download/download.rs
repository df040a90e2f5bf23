use super::DownloadError;
use super::coordinator::Inner;
use super::naming::parse_content_range_total;
use super::types::{AttemptOutcome, AttemptTicket, UNKNOWN_TOTAL, WRITE_BUFFER_SIZE};
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, RANGE, USER_AGENT};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::time::Instant;

/// Runs one attempt of a session to its end and reports the outcome.
pub(super) async fn run_attempt(inner: Arc<Inner>, ticket: AttemptTicket) {
    // Held for the whole attempt: the previous attempt on this coordinator
    // must have released its file before this one opens it.
    let _writer = inner.writer_gate.lock().await;
    if let Some(stale) = &ticket.discard_first {
        inner.remove_partial(stale);
    }
    let outcome = stream_to_disk(&inner, &ticket).await;
    inner.finish(&ticket, outcome);
}

async fn stream_to_disk(inner: &Inner, ticket: &AttemptTicket) -> AttemptOutcome {
    if let Some(stopped) = AttemptOutcome::stopped_by(inner.control(ticket)) {
        return stopped;
    }

    let offset = match tokio::fs::metadata(&ticket.dest).await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => 0,
    };

    let mut request = inner
        .client
        .get(&ticket.url)
        .header(USER_AGENT, super::user_agent::random_user_agent());
    if offset > 0 {
        request = request.header(RANGE, format!("bytes={offset}-"));
    }
    tracing::debug!(url = %ticket.url, offset, "Requesting archive");

    let response = tokio::select! {
        biased;
        _ = ticket.token.cancelled() => {
            return inner.interrupted(ticket, DownloadError::Interrupted);
        }
        response = request.send() => response,
    };
    let response = match response {
        Ok(response) => response,
        Err(err) => return inner.interrupted(ticket, err.into()),
    };

    let status = response.status();
    if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total);
        if total == Some(offset as i64) {
            tracing::info!(dest = %ticket.dest.display(), bytes = offset, "Destination already holds the whole archive");
            return AttemptOutcome::Completed {
                downloaded: offset as i64,
                total: offset as i64,
            };
        }
    }
    if !status.is_success() {
        return AttemptOutcome::Failed(DownloadError::Status { status });
    }

    let (start, total) = if status == StatusCode::PARTIAL_CONTENT {
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .or_else(|| {
                response
                    .content_length()
                    .map(|length| (offset + length) as i64)
            })
            .unwrap_or(UNKNOWN_TOTAL);
        (offset, total)
    } else {
        if offset > 0 {
            tracing::warn!(
                dest = %ticket.dest.display(),
                offset,
                "Server ignored the range request, restarting from the beginning"
            );
        }
        let total = response
            .content_length()
            .map(|length| length as i64)
            .unwrap_or(UNKNOWN_TOTAL);
        (0, total)
    };
    inner.report_total(ticket, start as i64, total);

    let write_error = |source: std::io::Error| DownloadError::Write {
        path: ticket.dest.clone(),
        source,
    };

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(start == 0)
        .open(&ticket.dest)
        .await;
    let mut file = match file {
        Ok(file) => file,
        Err(source) => return AttemptOutcome::Failed(write_error(source)),
    };
    if start > 0 {
        if let Err(source) = file.seek(SeekFrom::Start(start)).await {
            return AttemptOutcome::Failed(write_error(source));
        }
    }
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    let mut body = response.bytes_stream();

    let mut downloaded = start as i64;
    let mut last_emit = Instant::now();
    loop {
        if let Some(stopped) = AttemptOutcome::stopped_by(inner.control(ticket)) {
            release(writer, ticket).await;
            return stopped;
        }

        let chunk = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => Some(Err(DownloadError::Interrupted)),
            chunk = body.next() => chunk.map(|chunk| chunk.map_err(DownloadError::from)),
        };

        match chunk {
            Some(Ok(bytes)) => {
                if let Err(source) = writer.write_all(&bytes).await {
                    release(writer, ticket).await;
                    return inner.interrupted(ticket, write_error(source));
                }
                downloaded += bytes.len() as i64;
                if last_emit.elapsed() >= inner.progress_interval {
                    inner.report_progress(ticket, downloaded);
                    last_emit = Instant::now();
                }
            }
            None => {
                if let Err(source) = writer.shutdown().await {
                    return AttemptOutcome::Failed(write_error(source));
                }
                return AttemptOutcome::Completed { downloaded, total };
            }
            Some(Err(err)) => {
                release(writer, ticket).await;
                return inner.interrupted(ticket, err);
            }
        }
    }
}

/// Flushes what was received so the next attempt resumes from it, then
/// closes the file.
async fn release(mut writer: BufWriter<tokio::fs::File>, ticket: &AttemptTicket) {
    if let Err(err) = writer.shutdown().await {
        tracing::debug!(dest = %ticket.dest.display(), "Failed to flush partial download: {err}");
    }
}
