use launchprep_e2e_tests::{
    FakeExtractor, FakeRegistry, RecordingStep, RegistryCall, drain_events, init_tracing,
    seed_file,
};
use launchprep_lib::error::ErrorCode;
use launchprep_lib::events::{ChannelSink, Event};
use launchprep_lib::install::{InstallError, Installer};
use launchprep_lib::preparation::PreparationStep;
use launchprep_lib::registry::Variant;
use launchprep_lib::storage::StorageLayout;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

struct Fixture {
    temp_dir: TempDir,
    extractor: Arc<FakeExtractor>,
    registry: Arc<FakeRegistry>,
    installer: Installer,
    events: UnboundedReceiver<Event>,
}

impl Fixture {
    fn new(extractor: FakeExtractor, registry: FakeRegistry) -> Self {
        Self::with_steps(extractor, registry, Vec::new())
    }

    fn with_steps(
        extractor: FakeExtractor,
        registry: FakeRegistry,
        steps: Vec<Arc<dyn PreparationStep>>,
    ) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(extractor);
        let registry = Arc::new(registry);
        let (sink, events) = ChannelSink::channel();
        let installer = Installer::new(
            StorageLayout::new(temp_dir.path()),
            extractor.clone(),
            registry.clone(),
            Arc::new(sink),
        )
        .with_preparation_steps(steps)
        .with_poll_interval(Duration::from_millis(10));

        Self {
            temp_dir,
            extractor,
            registry,
            installer,
            events,
        }
    }

    fn installers(&self) -> PathBuf {
        self.temp_dir.path().join("installers")
    }

    fn versions(&self) -> PathBuf {
        self.temp_dir.path().join("versions")
    }

    fn add_archive(&self, file_name: &str) -> PathBuf {
        std::fs::create_dir_all(self.installers()).unwrap();
        let path = self.installers().join(file_name);
        std::fs::write(&path, b"archive").unwrap();
        path
    }

    async fn events(&mut self) -> Vec<Event> {
        drain_events(&mut self.events, Duration::from_millis(100)).await
    }
}

fn ends_with_extract_done(events: &[Event], dir: &Path) -> bool {
    events.last() == Some(&Event::ExtractDone { dir: dir.to_path_buf() })
}

#[tokio::test]
async fn test_missing_archive_creates_nothing() {
    init_tracing();
    let mut fixture = Fixture::new(FakeExtractor::succeeding(), FakeRegistry::default());

    let code = fixture
        .installer
        .install_extract("1.21.50", "My Version", Variant::Release)
        .await;

    assert_eq!(code, "ARCHIVE_NOT_FOUND");
    assert!(!fixture.versions().join("My Version").exists());
    assert!(fixture.extractor.calls().is_empty());
    assert!(fixture.events().await.is_empty());
}

#[tokio::test]
async fn test_empty_archive_reference() {
    init_tracing();
    let fixture = Fixture::new(FakeExtractor::succeeding(), FakeRegistry::default());

    let code = fixture
        .installer
        .install_extract("   ", "My Version", Variant::Release)
        .await;

    assert_eq!(code, "ARCHIVE_NOT_SPECIFIED");
}

#[tokio::test]
async fn test_extraction_failure_rolls_back_output() {
    init_tracing();
    let mut fixture = Fixture::new(FakeExtractor::failing(5, ""), FakeRegistry::default());
    fixture.add_archive("1.21.50.msixvc");

    let result = fixture
        .installer
        .try_install_extract("1.21.50", "Broken", Variant::Release)
        .await;

    match &result {
        Err(err @ InstallError::ExtractionFailed { code: 5, .. }) => {
            assert_eq!(err.to_code_string(), "INSTALL_FAILED");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!fixture.versions().join("Broken").exists());

    let events = fixture.events().await;
    let errors: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, Event::ExtractError { .. }))
        .collect();
    assert_eq!(
        errors,
        vec![&Event::ExtractError {
            message: "INSTALL_FAILED".to_string()
        }]
    );
    assert!(!events.iter().any(|event| matches!(event, Event::ExtractDone { .. })));
}

#[tokio::test]
async fn test_existing_version_is_left_untouched() {
    init_tracing();
    let mut fixture = Fixture::new(FakeExtractor::failing(5, ""), FakeRegistry::default());
    fixture.add_archive("1.21.50.msixvc");
    let kept = seed_file(fixture.temp_dir.path(), "versions/Installed", "launcher.exe", b"previous").unwrap();

    let result = fixture
        .installer
        .try_install_extract("1.21.50", "Installed", Variant::Release)
        .await;

    match &result {
        Err(err @ InstallError::TargetNotEmpty { path }) => {
            assert_eq!(path, &fixture.versions().join("Installed"));
            assert_eq!(err.to_code_string(), "CANNOT_CREATE_TARGET_DIR");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(std::fs::read(&kept).unwrap(), b"previous");
    assert!(fixture.extractor.calls().is_empty());
    assert!(fixture.events().await.is_empty());
}

#[tokio::test]
async fn test_empty_existing_version_folder_is_reused() {
    init_tracing();
    let mut fixture = Fixture::new(FakeExtractor::succeeding(), FakeRegistry::default());
    fixture.add_archive("1.21.50.msixvc");
    let output = fixture.versions().join("Reused");
    std::fs::create_dir_all(&output).unwrap();

    let dir = fixture
        .installer
        .try_install_extract("1.21.50", "Reused", Variant::Release)
        .await
        .unwrap();

    assert_eq!(dir, output);
    assert!(ends_with_extract_done(&fixture.events().await, &output));
}

#[tokio::test]
async fn test_extraction_failure_reports_native_message() {
    init_tracing();
    let fixture = Fixture::new(
        FakeExtractor::failing(7, "not enough space"),
        FakeRegistry::default(),
    );
    fixture.add_archive("1.21.50.msixvc");

    let code = fixture
        .installer
        .install_extract("1.21.50", "Broken", Variant::Release)
        .await;

    assert_eq!(code, "not enough space");
}

#[tokio::test]
async fn test_successful_install_reports_progress() {
    init_tracing();
    let extractor = FakeExtractor::succeeding()
        .with_files(&[("a.bin", 100), ("b/c.bin", 200), ("b/d.bin", 300)])
        .with_file_delay(Duration::from_millis(40));
    let mut fixture = Fixture::new(extractor, FakeRegistry::default());
    let archive = fixture.add_archive("Release 1.21.50.msixvc");

    let output = fixture
        .installer
        .try_install_extract("Release 1.21.50", "1.21.50", Variant::Release)
        .await
        .unwrap();

    assert_eq!(output, fixture.versions().join("1.21.50"));
    assert_eq!(fixture.extractor.calls(), vec![(archive, output.clone())]);

    let events = fixture.events().await;
    assert!(ends_with_extract_done(&events, &output));
    let progress: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::ExtractProgress {
                dir, files, bytes, ts,
            } => Some((dir.clone(), *files, *bytes, *ts)),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    for (dir, files, bytes, ts) in &progress {
        assert_eq!(dir, &output);
        assert!(*files <= 3);
        assert!(*bytes <= 600);
        assert!(*ts > 0);
    }
}

#[tokio::test]
async fn test_failing_preparation_step_does_not_fail_install() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let steps: Vec<Arc<dyn PreparationStep>> = vec![
        Arc::new(RecordingStep::new("first", log.clone())),
        Arc::new(RecordingStep::failing("second", log.clone())),
        Arc::new(RecordingStep::new("third", log.clone())),
    ];
    let mut fixture = Fixture::with_steps(
        FakeExtractor::succeeding(),
        FakeRegistry::default(),
        steps,
    );
    fixture.add_archive("1.21.50.msixvc");

    let code = fixture
        .installer
        .install_extract("1.21.50", "Prepared", Variant::Release)
        .await;

    assert_eq!(code, "");
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);

    let events = fixture.events().await;
    let outcomes: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::PreparationDone { step, success } => Some((step.as_str(), *success)),
            _ => None,
        })
        .collect();
    assert_eq!(
        outcomes,
        vec![("first", true), ("second", false), ("third", true)]
    );
    assert!(ends_with_extract_done(
        &events,
        &fixture.versions().join("Prepared")
    ));
}

#[tokio::test]
async fn test_absolute_archive_path() {
    init_tracing();
    let fixture = Fixture::new(FakeExtractor::succeeding(), FakeRegistry::default());
    let elsewhere = fixture.temp_dir.path().join("elsewhere.msixvc");
    std::fs::write(&elsewhere, b"archive").unwrap();

    let code = fixture
        .installer
        .install_extract(elsewhere.to_str().unwrap(), "Elsewhere", Variant::Preview)
        .await;

    assert_eq!(code, "");
    assert_eq!(fixture.extractor.calls()[0].0, elsewhere);
}

#[tokio::test]
async fn test_invalid_folder_names() {
    init_tracing();
    let fixture = Fixture::new(FakeExtractor::succeeding(), FakeRegistry::default());
    fixture.add_archive("1.21.50.msixvc");

    let long_name = "x".repeat(65);
    let cases = [
        ("", ErrorCode::NameRequired),
        (long_name.as_str(), ErrorCode::NameTooLong),
        ("trailing.", ErrorCode::NameTrailingDotSpace),
        ("a:b", ErrorCode::NameInvalidChar),
        ("tab\there", ErrorCode::NameControlChar),
    ];
    for (name, expected) in cases {
        let code = fixture
            .installer
            .install_extract("1.21.50", name, Variant::Release)
            .await;
        assert_eq!(code, expected.as_str(), "folder name {name:?}");
    }
    assert!(fixture.extractor.calls().is_empty());
}

#[tokio::test]
async fn test_resolve_delete_and_status() {
    init_tracing();
    let fixture = Fixture::new(FakeExtractor::succeeding(), FakeRegistry::default());
    let archive = fixture.add_archive("Preview 1.21.60.msixvc");
    let installer = &fixture.installer;

    assert_eq!(
        installer.resolve_archive("preview 1.21.60", Variant::Preview),
        "Preview 1.21.60"
    );
    assert_eq!(
        installer.resolve_archive("1.21.60", Variant::Preview),
        "Preview 1.21.60"
    );
    assert_eq!(installer.resolve_archive("1.21.70", Variant::Preview), "");

    let status = installer.version_status("1.21.60", Variant::Preview);
    assert!(status.is_downloaded);
    assert_eq!(
        serde_json::to_value(&status).unwrap(),
        serde_json::json!({"version": "1.21.60", "type": "preview", "isDownloaded": true})
    );

    assert_eq!(installer.delete_archive("1.21.60", Variant::Preview), "");
    assert!(!archive.exists());
    assert_eq!(
        installer.delete_archive("1.21.60", Variant::Preview),
        "ARCHIVE_NOT_FOUND"
    );
    assert!(!installer.version_status("1.21.60", Variant::Preview).is_downloaded);
}

#[tokio::test]
async fn test_swap_replaces_installed_package() {
    init_tracing();
    let mut fixture = Fixture::new(
        FakeExtractor::succeeding(),
        FakeRegistry::with_installed("Microsoft.MinecraftUWP_1.0.0.0_x64__8wekyb3d8bbwe"),
    );
    let archive = fixture.add_archive("1.21.50.msixvc");

    let plan = fixture
        .installer
        .try_swap_package("1.21.50", Variant::Release)
        .await
        .unwrap();

    assert!(!plan.is_fresh_install());
    assert_eq!(
        fixture.registry.calls(),
        vec![
            RegistryCall::Resolve(Variant::Release),
            RegistryCall::Uninstall(
                "Microsoft.MinecraftUWP_1.0.0.0_x64__8wekyb3d8bbwe".to_string()
            ),
            RegistryCall::Install(archive),
        ]
    );
    assert_eq!(
        fixture.events().await,
        vec![
            Event::PackageSwapLoading(true),
            Event::PackageSwapLoading(false)
        ]
    );
}

#[tokio::test]
async fn test_swap_installs_fresh_when_query_fails() {
    init_tracing();
    let registry = FakeRegistry::default().failing_resolve();
    let fixture = Fixture::new(FakeExtractor::succeeding(), registry);
    let archive = fixture.add_archive("1.21.50.msixvc");

    let code = fixture
        .installer
        .swap_package("1.21.50", Variant::Preview)
        .await;

    assert_eq!(code, "");
    assert_eq!(
        fixture.registry.calls(),
        vec![
            RegistryCall::Resolve(Variant::Preview),
            RegistryCall::Install(archive)
        ]
    );
}

#[tokio::test]
async fn test_swap_stops_when_uninstall_fails() {
    init_tracing();
    let registry = FakeRegistry::with_installed("Microsoft.MinecraftUWP").failing_uninstall();
    let mut fixture = Fixture::new(FakeExtractor::succeeding(), registry);
    fixture.add_archive("1.21.50.msixvc");

    let code = fixture
        .installer
        .swap_package("1.21.50", Variant::Release)
        .await;

    assert_eq!(code, "PACKAGE_UNINSTALL_FAILED");
    assert!(
        !fixture
            .registry
            .calls()
            .iter()
            .any(|call| matches!(call, RegistryCall::Install(_)))
    );
    assert_eq!(
        fixture.events().await.last(),
        Some(&Event::PackageSwapLoading(false))
    );
}

#[tokio::test]
async fn test_swap_reports_install_failure() {
    init_tracing();
    let registry = FakeRegistry::default().failing_install();
    let fixture = Fixture::new(FakeExtractor::succeeding(), registry);
    fixture.add_archive("1.21.50.msixvc");

    let code = fixture
        .installer
        .swap_package("1.21.50", Variant::Release)
        .await;

    assert_eq!(code, "PACKAGE_INSTALL_FAILED");
}

#[tokio::test]
async fn test_swap_missing_archive() {
    init_tracing();
    let mut fixture = Fixture::new(FakeExtractor::succeeding(), FakeRegistry::default());

    let code = fixture
        .installer
        .swap_package("1.21.50", Variant::Release)
        .await;

    assert_eq!(code, "ARCHIVE_NOT_FOUND");
    assert!(fixture.registry.calls().is_empty());
    assert!(fixture.events().await.is_empty());
}
