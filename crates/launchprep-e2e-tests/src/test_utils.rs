use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{self, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use eyre::{Result, WrapErr};
use launchprep_lib::config::Config;
use launchprep_lib::events::Event;
use launchprep_lib::extractor::{Extract, ExtractionOutcome};
use launchprep_lib::preparation::{PreparationError, PreparationStep, StepOutcome};
use launchprep_lib::registry::{InstalledPackage, PackageRegistry, RegistryError, Variant};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

pub const MIB: usize = 1024 * 1024;

const EVENT_TIMEOUT: Duration = Duration::from_secs(20);

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("launchprep_lib=debug,launchprep_e2e_tests=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// Configuration rooted at `base_root` with intervals short enough for tests.
pub fn create_test_config(base_root: &Path) -> Config {
    let mut config = Config::default();
    config.storage.base_root = Some(base_root.to_path_buf());
    config.download.connect_timeout_secs = 5;
    config.download.progress_interval_ms = 10;
    config.extraction.poll_interval_ms = 10;
    config
}

/// Places `contents` at `<base_root>/<dir>/<name>`, as an earlier run would
/// have left it.
pub fn seed_file(base_root: &Path, dir: &str, name: &str, contents: &[u8]) -> Result<PathBuf> {
    let parent = base_root.join(dir);
    std::fs::create_dir_all(&parent)
        .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
    let path = parent.join(name);
    std::fs::write(&path, contents).wrap_err_with(|| format!("Failed to seed {}", path.display()))?;
    Ok(path)
}

/// Deterministic file content whose bytes depend on their offset.
pub fn pattern_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}

#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub size: usize,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
    /// When false, `Range` headers are ignored and every reply is a full 200.
    pub honor_ranges: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            size: 10 * MIB,
            chunk_size: 64 * 1024,
            chunk_delay: Duration::from_millis(2),
            honor_ranges: true,
        }
    }
}

struct ServerState {
    content: Arc<Vec<u8>>,
    options: ServerOptions,
    requests: Mutex<Vec<Option<String>>>,
}

/// HTTP server streaming one generated file under `/files/<name>`, with
/// single open-ended range support. Any other path answers 404.
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(options: ServerOptions) -> Self {
        let state = Arc::new(ServerState {
            content: Arc::new(pattern_content(options.size)),
            options,
            requests: Mutex::new(Vec::new()),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Test server has no address");
        let router = Router::new()
            .route("/files/:name", get(serve_file))
            .with_state(Arc::clone(&state));
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::error!("Test server stopped: {err}");
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self, name: &str) -> String {
        format!("http://{}/files/{}", self.addr, name)
    }

    pub fn missing_url(&self, name: &str) -> String {
        format!("http://{}/missing/{}", self.addr, name)
    }

    pub fn content(&self) -> &[u8] {
        &self.state.content
    }

    /// The `Range` header of every file request received, in order.
    pub fn range_requests(&self) -> Vec<Option<String>> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn parse_range_start(header: &str) -> Option<usize> {
    let range = header.strip_prefix("bytes=")?;
    let (start, end) = range.split_once('-')?;
    if !end.is_empty() {
        return None;
    }
    start.parse().ok()
}

async fn serve_file(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let range = headers
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.requests.lock().unwrap().push(range.clone());

    let len = state.content.len();
    let start = range
        .as_deref()
        .filter(|_| state.options.honor_ranges)
        .and_then(parse_range_start);

    if let Some(start) = start {
        if start >= len {
            return http::Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(CONTENT_RANGE, format!("bytes */{len}"))
                .body(Body::empty())
                .unwrap();
        }
    }

    let offset = start.unwrap_or(0);
    let content = Arc::clone(&state.content);
    let chunk_size = state.options.chunk_size;
    let delay = state.options.chunk_delay;
    let chunks = futures::stream::unfold(offset, move |position| {
        let content = Arc::clone(&content);
        async move {
            if position >= content.len() {
                return None;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let end = (position + chunk_size).min(content.len());
            Some((Ok::<_, std::io::Error>(content[position..end].to_vec()), end))
        }
    });

    let mut builder = http::Response::builder()
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_LENGTH, len - offset);
    builder = match start {
        Some(start) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(CONTENT_RANGE, format!("bytes {}-{}/{}", start, len - 1, len)),
        None => builder.status(StatusCode::OK),
    };
    builder.body(Body::from_stream(chunks)).unwrap()
}

pub async fn next_event(events: &mut UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("Timed out waiting for an event")
        .expect("Event channel closed")
}

/// Collects events up to and including the first one matching `stop`.
pub async fn collect_until(
    events: &mut UnboundedReceiver<Event>,
    stop: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let mut collected = Vec::new();
    loop {
        let event = next_event(events).await;
        let done = stop(&event);
        collected.push(event);
        if done {
            return collected;
        }
    }
}

pub async fn collect_until_download_terminal(events: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    collect_until(events, Event::is_download_terminal).await
}

/// Everything already queued or arriving within `quiet_for`.
pub async fn drain_events(events: &mut UnboundedReceiver<Event>, quiet_for: Duration) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(quiet_for, events.recv()).await {
        collected.push(event);
    }
    collected
}

/// `(downloaded, total)` of every progress event in `events`.
pub fn progress_values(events: &[Event]) -> Vec<(i64, i64)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::DownloadProgress {
                downloaded, total, ..
            } => Some((*downloaded, *total)),
            _ => None,
        })
        .collect()
}

/// Extractor standing in for the native library: writes a fixed set of
/// files into the output directory, then reports the configured outcome.
pub struct FakeExtractor {
    outcome: ExtractionOutcome,
    files: Vec<(String, usize)>,
    file_delay: Duration,
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl FakeExtractor {
    pub fn succeeding() -> Self {
        Self::with_outcome(ExtractionOutcome::success())
    }

    pub fn failing(code: i32, message: &str) -> Self {
        Self::with_outcome(ExtractionOutcome::failure(code, message))
    }

    fn with_outcome(outcome: ExtractionOutcome) -> Self {
        Self {
            outcome,
            files: vec![
                ("Minecraft.Windows.exe".to_string(), 4096),
                ("data/resource_packs/pack.bin".to_string(), 8192),
            ],
            file_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_files(mut self, files: &[(&str, usize)]) -> Self {
        self.files = files
            .iter()
            .map(|(name, size)| (name.to_string(), *size))
            .collect();
        self
    }

    /// Pause between written files, so progress polling has time to observe
    /// the directory filling up.
    pub fn with_file_delay(mut self, delay: Duration) -> Self {
        self.file_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Extract for FakeExtractor {
    fn extract(&self, archive: &Path, output_dir: &Path) -> ExtractionOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((archive.to_path_buf(), output_dir.to_path_buf()));

        for (name, size) in &self.files {
            let path = output_dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, vec![0u8; *size]).unwrap();
            if !self.file_delay.is_zero() {
                std::thread::sleep(self.file_delay);
            }
        }
        self.outcome.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryCall {
    Resolve(Variant),
    Uninstall(String),
    Install(PathBuf),
}

/// In-memory package registry recording every call it receives.
#[derive(Default)]
pub struct FakeRegistry {
    installed: Mutex<Option<InstalledPackage>>,
    fail_resolve: bool,
    fail_uninstall: bool,
    fail_install: bool,
    calls: Mutex<Vec<RegistryCall>>,
}

impl FakeRegistry {
    pub fn with_installed(package_id: &str) -> Self {
        let registry = Self::default();
        *registry.installed.lock().unwrap() = Some(InstalledPackage {
            package_id: package_id.to_string(),
            install_location: PathBuf::from("C:/Program Files/WindowsApps").join(package_id),
            version: "1.0.0.0".to_string(),
        });
        registry
    }

    pub fn failing_resolve(mut self) -> Self {
        self.fail_resolve = true;
        self
    }

    pub fn failing_uninstall(mut self) -> Self {
        self.fail_uninstall = true;
        self
    }

    pub fn failing_install(mut self) -> Self {
        self.fail_install = true;
        self
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }

    fn failure(operation: &'static str) -> RegistryError {
        RegistryError::CommandFailed {
            operation,
            status: "exit status: 1".to_string(),
            output: "simulated failure".to_string(),
        }
    }
}

impl PackageRegistry for FakeRegistry {
    fn resolve_current(&self, variant: Variant) -> Result<Option<InstalledPackage>, RegistryError> {
        self.calls.lock().unwrap().push(RegistryCall::Resolve(variant));
        if self.fail_resolve {
            return Err(Self::failure("Get-AppxPackage"));
        }
        Ok(self.installed.lock().unwrap().clone())
    }

    fn uninstall(&self, package: &InstalledPackage) -> Result<(), RegistryError> {
        self.calls
            .lock()
            .unwrap()
            .push(RegistryCall::Uninstall(package.package_id.clone()));
        if self.fail_uninstall {
            return Err(Self::failure("Remove-AppxPackage"));
        }
        *self.installed.lock().unwrap() = None;
        Ok(())
    }

    fn install(&self, archive: &Path) -> Result<(), RegistryError> {
        self.calls
            .lock()
            .unwrap()
            .push(RegistryCall::Install(archive.to_path_buf()));
        if self.fail_install {
            return Err(Self::failure("Add-AppxPackage"));
        }
        Ok(())
    }
}

/// Preparation step appending its name to a shared log, optionally failing.
pub struct RecordingStep {
    name: &'static str,
    fail: bool,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingStep {
    pub fn new(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Self {
        Self {
            name,
            fail: false,
            log,
        }
    }

    pub fn failing(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Self {
        Self {
            name,
            fail: true,
            log,
        }
    }
}

impl PreparationStep for RecordingStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, version_dir: &Path) -> Result<StepOutcome, PreparationError> {
        self.log.lock().unwrap().push(self.name);
        if self.fail {
            return Err(PreparationError::MissingTarget {
                path: version_dir.join("missing.bin"),
            });
        }
        Ok(StepOutcome::Applied)
    }
}
