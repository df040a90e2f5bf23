use launchprep_e2e_tests::{
    MIB, ServerOptions, TestServer, collect_until, collect_until_download_terminal,
    create_test_config, drain_events, init_tracing, next_event, progress_values, seed_file,
};
use launchprep_lib::download::DownloadCoordinator;
use launchprep_lib::events::{ChannelSink, DownloadStatus, Event};
use launchprep_lib::storage::StorageLayout;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn coordinator(base_root: &Path) -> (DownloadCoordinator, UnboundedReceiver<Event>) {
    let config = create_test_config(base_root);
    let (sink, events) = ChannelSink::channel();
    let coordinator = DownloadCoordinator::new(
        &config.download,
        StorageLayout::from_config(&config.storage),
        Arc::new(sink),
    )
    .expect("Failed to create download coordinator");
    (coordinator, events)
}

fn assert_monotonic(progress: &[(i64, i64)]) {
    for pair in progress.windows(2) {
        assert!(
            pair[0].0 <= pair[1].0,
            "Progress went backwards: {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn test_full_download() {
    init_tracing();
    let server = TestServer::start(ServerOptions {
        size: 2 * MIB,
        ..ServerOptions::default()
    })
    .await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    let dest = coordinator.start(&server.url("full.msixvc")).unwrap();
    assert_eq!(dest, temp_dir.path().join("installers").join("full.msixvc"));

    let collected = collect_until_download_terminal(&mut events).await;

    assert_eq!(
        collected.first(),
        Some(&Event::DownloadStatus(DownloadStatus::Started))
    );
    assert_eq!(
        collected.last(),
        Some(&Event::DownloadDone { dest: dest.clone() })
    );
    let progress = progress_values(&collected);
    assert_monotonic(&progress);
    let expected = (2 * MIB) as i64;
    assert_eq!(progress.last(), Some(&(expected, expected)));
    assert_eq!(std::fs::read(&dest).unwrap(), server.content());
    assert_eq!(server.range_requests(), vec![None]);

    // The session is gone once done.
    assert!(!coordinator.pause());
}

#[tokio::test]
async fn test_pause_and_resume_produce_identical_file() {
    init_tracing();
    let server = TestServer::start(ServerOptions::default()).await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    let dest = coordinator.start(&server.url("resumable.msixvc")).unwrap();

    let mut all = collect_until(&mut events, |event| {
        matches!(event, Event::DownloadProgress { downloaded, .. } if *downloaded >= (4 * MIB) as i64)
    })
    .await;
    assert!(coordinator.pause());
    all.extend(collect_until(&mut events, |event| {
        *event == Event::DownloadStatus(DownloadStatus::Paused)
    })
    .await);

    // Nothing follows the pause, and the partial file stays.
    all.extend(drain_events(&mut events, Duration::from_millis(200)).await);
    assert_eq!(
        all.last(),
        Some(&Event::DownloadStatus(DownloadStatus::Paused))
    );
    let partial_len = std::fs::metadata(&dest).unwrap().len() as usize;
    assert!(partial_len >= 4 * MIB);
    assert!(partial_len < 10 * MIB);

    assert!(coordinator.resume());
    let rest = collect_until_download_terminal(&mut events).await;
    assert_eq!(
        rest.first(),
        Some(&Event::DownloadStatus(DownloadStatus::Resumed))
    );
    all.extend(rest);

    let done: Vec<_> = all
        .iter()
        .filter(|event| matches!(event, Event::DownloadDone { .. }))
        .collect();
    assert_eq!(done.len(), 1);
    assert!(all.last().unwrap().is_download_terminal());

    let progress = progress_values(&all);
    assert_monotonic(&progress);
    let total = (10 * MIB) as i64;
    assert_eq!(progress.last(), Some(&(total, total)));
    assert!(progress.iter().all(|(_, t)| *t == total));

    assert_eq!(std::fs::read(&dest).unwrap(), server.content());
    let ranges = server.range_requests();
    assert_eq!(ranges.len(), 2);
    assert_eq!(ranges[0], None);
    assert_eq!(ranges[1], Some(format!("bytes={partial_len}-")));
}

#[tokio::test]
async fn test_cancel_removes_partial_file() {
    init_tracing();
    let server = TestServer::start(ServerOptions::default()).await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    let dest = coordinator.start(&server.url("cancelled.msixvc")).unwrap();
    collect_until(&mut events, |event| {
        matches!(event, Event::DownloadProgress { downloaded, .. } if *downloaded > 0)
    })
    .await;

    assert!(coordinator.cancel());
    let rest = collect_until_download_terminal(&mut events).await;
    assert_eq!(
        rest.last(),
        Some(&Event::DownloadStatus(DownloadStatus::Cancelled))
    );
    assert!(!dest.exists());
    assert!(drain_events(&mut events, Duration::from_millis(200)).await.is_empty());
    assert!(!coordinator.resume());
}

#[tokio::test]
async fn test_cancel_while_paused_removes_partial_file() {
    init_tracing();
    let server = TestServer::start(ServerOptions::default()).await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    let dest = coordinator.start(&server.url("paused.msixvc")).unwrap();
    collect_until(&mut events, |event| {
        matches!(event, Event::DownloadProgress { downloaded, .. } if *downloaded >= MIB as i64)
    })
    .await;
    assert!(coordinator.pause());
    collect_until_download_terminal(&mut events).await;
    // Let the attempt release the file before cancelling.
    drain_events(&mut events, Duration::from_millis(200)).await;
    assert!(dest.exists());

    assert!(coordinator.cancel());
    assert_eq!(
        next_event(&mut events).await,
        Event::DownloadStatus(DownloadStatus::Cancelled)
    );
    assert!(!dest.exists());
    assert!(!coordinator.cancel());
}

#[tokio::test]
async fn test_start_right_after_cancel_discards_partial_file() {
    init_tracing();
    let server = TestServer::start(ServerOptions::default()).await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    let url = server.url("restarted.msixvc");
    let dest = coordinator.start(&url).unwrap();
    collect_until(&mut events, |event| {
        matches!(event, Event::DownloadProgress { downloaded, .. } if *downloaded >= (2 * MIB) as i64)
    })
    .await;

    assert!(coordinator.cancel());
    assert_eq!(coordinator.start(&url).unwrap(), dest);

    let cancelled = collect_until_download_terminal(&mut events).await;
    assert_eq!(
        cancelled.last(),
        Some(&Event::DownloadStatus(DownloadStatus::Cancelled))
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::DownloadStatus(DownloadStatus::Started)
    );

    let rest = collect_until_download_terminal(&mut events).await;
    assert_eq!(rest.last(), Some(&Event::DownloadDone { dest: dest.clone() }));
    assert_monotonic(&progress_values(&rest));
    assert_eq!(std::fs::read(&dest).unwrap(), server.content());
    // The second request starts from scratch instead of the cancelled bytes.
    assert_eq!(server.range_requests(), vec![None, None]);
}

#[tokio::test]
async fn test_complete_file_finishes_without_transfer() {
    init_tracing();
    let server = TestServer::start(ServerOptions {
        size: MIB,
        ..ServerOptions::default()
    })
    .await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    let dest = seed_file(temp_dir.path(), "installers", "complete.msixvc", server.content()).unwrap();

    coordinator.start(&server.url("complete.msixvc")).unwrap();
    let collected = collect_until_download_terminal(&mut events).await;

    assert_eq!(collected.last(), Some(&Event::DownloadDone { dest: dest.clone() }));
    let total = MIB as i64;
    assert_eq!(progress_values(&collected), vec![(total, total)]);
    assert_eq!(server.range_requests(), vec![Some(format!("bytes={MIB}-"))]);
    assert_eq!(std::fs::read(&dest).unwrap(), server.content());
}

#[tokio::test]
async fn test_new_download_supersedes_running_one() {
    init_tracing();
    let server = TestServer::start(ServerOptions {
        size: 4 * MIB,
        ..ServerOptions::default()
    })
    .await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    let first = coordinator.start(&server.url("first.msixvc")).unwrap();
    collect_until(&mut events, |event| {
        matches!(event, Event::DownloadProgress { downloaded, .. } if *downloaded > 0)
    })
    .await;

    let second = coordinator.start(&server.url("second.msixvc")).unwrap();
    let after = collect_until(&mut events, |event| {
        *event == Event::DownloadStatus(DownloadStatus::Started)
    })
    .await;
    assert!(after.iter().all(|event| !event.is_download_terminal()));

    let rest = collect_until_download_terminal(&mut events).await;
    assert_eq!(rest.last(), Some(&Event::DownloadDone { dest: second.clone() }));
    for event in &rest {
        if let Event::DownloadProgress { dest, .. } = event {
            assert_eq!(dest, &second);
        }
    }
    assert!(drain_events(&mut events, Duration::from_millis(200)).await.is_empty());

    assert_eq!(std::fs::read(&second).unwrap(), server.content());
    // The interrupted download keeps its partial file.
    assert!(first.exists());
}

#[tokio::test]
async fn test_http_error_keeps_partial_file() {
    init_tracing();
    let server = TestServer::start(ServerOptions::default()).await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    let partial = seed_file(temp_dir.path(), "installers", "gone.msixvc", b"half of an archive").unwrap();

    coordinator.start(&server.missing_url("gone.msixvc")).unwrap();
    let collected = collect_until_download_terminal(&mut events).await;

    match collected.last() {
        Some(Event::DownloadError { message }) => {
            assert!(message.contains("404"), "unexpected message: {message}");
        }
        other => panic!("expected a download error, got {other:?}"),
    }
    assert!(progress_values(&collected).is_empty());
    assert_eq!(std::fs::read(&partial).unwrap(), b"half of an archive");
}

#[tokio::test]
async fn test_filename_parameter_names_destination() {
    init_tracing();
    let server = TestServer::start(ServerOptions {
        size: 256 * 1024,
        ..ServerOptions::default()
    })
    .await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    let url = format!("{}?filename=Release%201.21.50", server.url("blob"));
    let dest = coordinator.start(&url).unwrap();
    assert_eq!(
        dest,
        temp_dir.path().join("installers").join("Release 1.21.50.msixvc")
    );

    let collected = collect_until_download_terminal(&mut events).await;
    assert_eq!(collected.last(), Some(&Event::DownloadDone { dest: dest.clone() }));
    assert_eq!(std::fs::read(&dest).unwrap(), server.content());
}

#[tokio::test]
async fn test_progress_is_throttled() {
    init_tracing();
    let server = TestServer::start(ServerOptions {
        size: 4 * MIB,
        chunk_size: 16 * 1024,
        chunk_delay: Duration::from_millis(1),
        ..ServerOptions::default()
    })
    .await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    coordinator.start(&server.url("throttled.msixvc")).unwrap();
    let collected = collect_until_download_terminal(&mut events).await;

    let progress = progress_values(&collected);
    let chunks = (4 * MIB) / (16 * 1024);
    assert!(!progress.is_empty());
    assert!(
        progress.len() < chunks,
        "expected fewer progress events than chunks, got {}",
        progress.len()
    );
    assert_monotonic(&progress);
}

#[tokio::test]
async fn test_full_reply_to_range_request_restarts_file() {
    init_tracing();
    let server = TestServer::start(ServerOptions {
        size: MIB,
        honor_ranges: false,
        ..ServerOptions::default()
    })
    .await;
    let temp_dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) = coordinator(temp_dir.path());

    let dest = seed_file(temp_dir.path(), "installers", "stale.msixvc", &[0xAAu8; 1000]).unwrap();

    coordinator.start(&server.url("stale.msixvc")).unwrap();
    let collected = collect_until_download_terminal(&mut events).await;

    assert_eq!(collected.last(), Some(&Event::DownloadDone { dest: dest.clone() }));
    assert_eq!(server.range_requests(), vec![Some("bytes=1000-".to_string())]);
    assert_eq!(std::fs::read(&dest).unwrap(), server.content());
}
