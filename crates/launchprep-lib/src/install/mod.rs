//! Turns a downloaded archive into a launchable version directory and swaps
//! the platform-registered package.
//!
//! Every public operation returns an error code string (empty on success)
//! for callers that only localize codes; the `try_` forms return the typed
//! error instead.

pub mod archive;
pub mod poller;

pub use archive::{ArchiveEntry, archive_path, find_archive, normalize_version_label, validate_folder_name};
pub use poller::{DirectorySize, ExtractionPoller, measure_directory};

use crate::config::ExtractionConfig;
use crate::error::ErrorCode;
use crate::events::{Event, EventSink};
use crate::extractor::{Extract, ExtractionOutcome};
use crate::preparation::PreparationStep;
use crate::registry::{PackageRegistry, PackageSwapPlan, RegistryError, Variant};
use crate::storage::StorageLayout;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("No archive specified")]
    ArchiveNotSpecified,

    #[error("Archive not found: {reference}")]
    ArchiveNotFound { reference: String },

    #[error("Installers directory unavailable: {0}")]
    InstallersDir(#[source] std::io::Error),

    #[error("Versions directory unavailable: {0}")]
    VersionsDir(#[source] std::io::Error),

    #[error("Failed to create {path}: {source}")]
    CreateTargetDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Version directory {path} already holds files")]
    TargetNotEmpty { path: PathBuf },

    #[error("Failed to remove {path}: {source}")]
    WriteTarget {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid version folder name: {0}")]
    InvalidName(ErrorCode),

    #[error("Extraction failed with code {code}")]
    ExtractionFailed { code: i32, message: String },

    #[error("Failed to remove the installed package: {0}")]
    Uninstall(#[source] RegistryError),

    #[error("Failed to install the package: {0}")]
    PackageInstall(#[source] RegistryError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl InstallError {
    pub fn code(&self) -> ErrorCode {
        match self {
            InstallError::ArchiveNotSpecified => ErrorCode::ArchiveNotSpecified,
            InstallError::ArchiveNotFound { .. } => ErrorCode::ArchiveNotFound,
            InstallError::InstallersDir(_) => ErrorCode::CannotAccessInstallersDir,
            InstallError::VersionsDir(_) => ErrorCode::CannotAccessVersionsDir,
            InstallError::CreateTargetDir { .. } | InstallError::TargetNotEmpty { .. } => {
                ErrorCode::CannotCreateTargetDir
            }
            InstallError::WriteTarget { .. } => ErrorCode::CannotWriteTarget,
            InstallError::InvalidName(code) => *code,
            InstallError::ExtractionFailed { .. } | InstallError::Task(_) => ErrorCode::InstallFailed,
            InstallError::Uninstall(_) => ErrorCode::PackageUninstallFailed,
            InstallError::PackageInstall(_) => ErrorCode::PackageInstallFailed,
        }
    }

    /// The string handed back across the public surface: the native message
    /// for a failed extraction that produced one, the error code otherwise.
    pub fn to_code_string(&self) -> String {
        match self {
            InstallError::ExtractionFailed { message, .. } if !message.trim().is_empty() => {
                message.clone()
            }
            other => other.code().as_str().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionStatus {
    pub version: String,
    #[serde(rename = "type")]
    pub variant: Variant,
    pub is_downloaded: bool,
}

pub struct Installer {
    layout: StorageLayout,
    extractor: Arc<dyn Extract>,
    steps: Vec<Arc<dyn PreparationStep>>,
    registry: Arc<dyn PackageRegistry>,
    events: Arc<dyn EventSink>,
    poll_interval: Duration,
}

impl Installer {
    pub fn new(
        layout: StorageLayout,
        extractor: Arc<dyn Extract>,
        registry: Arc<dyn PackageRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            layout,
            extractor,
            steps: Vec::new(),
            registry,
            events,
            poll_interval: ExtractionConfig::default().poll_interval(),
        }
    }

    /// Steps run after every successful extraction, in the given order.
    pub fn with_preparation_steps(mut self, steps: Vec<Arc<dyn PreparationStep>>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Unpacks `archive_ref` into `versions/<folder_name>` and prepares it.
    /// Returns an empty string on success.
    ///
    /// A failed extraction removes `versions/<folder_name>` entirely, so a
    /// folder that already holds files is refused with
    /// `CANNOT_CREATE_TARGET_DIR` before anything is extracted into it.
    pub async fn install_extract(&self, archive_ref: &str, folder_name: &str, variant: Variant) -> String {
        match self.try_install_extract(archive_ref, folder_name, variant).await {
            Ok(_) => String::new(),
            Err(err) => {
                tracing::warn!("Installation failed: {err}");
                err.to_code_string()
            }
        }
    }

    pub async fn try_install_extract(
        &self,
        archive_ref: &str,
        folder_name: &str,
        variant: Variant,
    ) -> Result<PathBuf, InstallError> {
        let archive = self.resolve_archive_path(archive_ref)?;
        let folder_name = validate_folder_name(folder_name).map_err(InstallError::InvalidName)?;
        let versions_dir = self.layout.versions_dir().map_err(InstallError::VersionsDir)?;
        let output_dir = versions_dir.join(folder_name);
        if has_entries(&output_dir) {
            return Err(InstallError::TargetNotEmpty { path: output_dir });
        }
        std::fs::create_dir_all(&output_dir).map_err(|source| InstallError::CreateTargetDir {
            path: output_dir.clone(),
            source,
        })?;

        tracing::info!(
            archive = %archive.display(),
            output = %output_dir.display(),
            %variant,
            "Extracting archive"
        );
        let outcome = self.extract_with_progress(&archive, &output_dir).await;

        if !outcome.is_success() {
            let message = if outcome.message.trim().is_empty() {
                ErrorCode::InstallFailed.as_str().to_string()
            } else {
                outcome.message.clone()
            };
            self.events.emit(Event::ExtractError {
                message: message.clone(),
            });
            if let Err(err) = std::fs::remove_dir_all(&output_dir) {
                tracing::error!(output = %output_dir.display(), "Failed to roll back output directory: {err}");
            }
            return Err(InstallError::ExtractionFailed {
                code: outcome.code,
                message: outcome.message,
            });
        }

        self.run_preparation(&output_dir).await;

        tracing::info!(output = %output_dir.display(), "Installation complete");
        self.events.emit(Event::ExtractDone {
            dir: output_dir.clone(),
        });
        Ok(output_dir)
    }

    async fn extract_with_progress(&self, archive: &Path, output_dir: &Path) -> ExtractionOutcome {
        let poller = ExtractionPoller::start(
            output_dir.to_path_buf(),
            self.poll_interval,
            Arc::clone(&self.events),
        );

        let extractor = Arc::clone(&self.extractor);
        let (archive, target) = (archive.to_path_buf(), output_dir.to_path_buf());
        let outcome = tokio::task::spawn_blocking(move || extractor.extract(&archive, &target))
            .await
            .unwrap_or_else(|err| {
                ExtractionOutcome::failure(
                    crate::extractor::BIND_FAILURE_CODE,
                    format!("Extraction task failed: {err}"),
                )
            });

        poller.stop().await;
        outcome
    }

    /// Failures are reported and logged but never fail the installation: an
    /// unprepared version is still launchable.
    async fn run_preparation(&self, version_dir: &Path) {
        for step in &self.steps {
            let name = step.name();
            self.events.emit(Event::PreparationStarted {
                step: name.to_string(),
            });

            let task_step = Arc::clone(step);
            let dir = version_dir.to_path_buf();
            let success = match tokio::task::spawn_blocking(move || task_step.apply(&dir)).await {
                Ok(Ok(outcome)) => {
                    tracing::info!(step = name, ?outcome, "Preparation step finished");
                    true
                }
                Ok(Err(err)) => {
                    tracing::warn!(step = name, "Preparation step failed: {err}");
                    false
                }
                Err(err) => {
                    tracing::warn!(step = name, "Preparation step panicked: {err}");
                    false
                }
            };

            self.events.emit(Event::PreparationDone {
                step: name.to_string(),
                success,
            });
        }
    }

    fn resolve_archive_path(&self, archive_ref: &str) -> Result<PathBuf, InstallError> {
        let reference = archive_ref.trim();
        if reference.is_empty() {
            return Err(InstallError::ArchiveNotSpecified);
        }
        let path = if Path::new(reference).is_absolute() {
            PathBuf::from(reference)
        } else {
            let installers = self.layout.installers_dir().map_err(InstallError::InstallersDir)?;
            archive_path(&installers, reference)
        };
        if !crate::utils::is_regular_file(&path) {
            return Err(InstallError::ArchiveNotFound {
                reference: reference.to_string(),
            });
        }
        Ok(path)
    }

    /// Base name of the downloaded archive for `version`, or an empty string.
    pub fn resolve_archive(&self, version: &str, variant: Variant) -> String {
        match self.try_resolve_archive(version, variant) {
            Ok(Some(entry)) => entry.base_name,
            Ok(None) => String::new(),
            Err(err) => {
                tracing::debug!("Archive lookup failed: {err}");
                String::new()
            }
        }
    }

    pub fn try_resolve_archive(&self, version: &str, variant: Variant) -> Result<Option<ArchiveEntry>, InstallError> {
        let installers = self.layout.installers_dir().map_err(InstallError::InstallersDir)?;
        let entry = find_archive(&installers, version).map_err(InstallError::InstallersDir)?;
        tracing::debug!(version, %variant, found = entry.is_some(), "Resolved downloaded archive");
        Ok(entry)
    }

    /// Removes the downloaded archive for `version`. Returns an empty string
    /// on success.
    pub fn delete_archive(&self, version: &str, variant: Variant) -> String {
        match self.try_delete_archive(version, variant) {
            Ok(_) => String::new(),
            Err(err) => {
                tracing::warn!("Failed to delete archive: {err}");
                err.to_code_string()
            }
        }
    }

    pub fn try_delete_archive(&self, version: &str, variant: Variant) -> Result<PathBuf, InstallError> {
        let entry = self
            .try_resolve_archive(version, variant)?
            .ok_or_else(|| InstallError::ArchiveNotFound {
                reference: version.trim().to_string(),
            })?;
        std::fs::remove_file(&entry.path).map_err(|source| InstallError::WriteTarget {
            path: entry.path.clone(),
            source,
        })?;
        tracing::info!(path = %entry.path.display(), "Deleted archive");
        Ok(entry.path)
    }

    pub fn version_status(&self, version: &str, variant: Variant) -> VersionStatus {
        VersionStatus {
            version: version.to_string(),
            variant,
            is_downloaded: !self.resolve_archive(version, variant).is_empty(),
        }
    }

    /// Replaces the registered package of `variant` with `archive_ref`.
    /// Returns an empty string on success.
    pub async fn swap_package(&self, archive_ref: &str, variant: Variant) -> String {
        match self.try_swap_package(archive_ref, variant).await {
            Ok(_) => String::new(),
            Err(err) => {
                tracing::warn!("Package swap failed: {err}");
                err.to_code_string()
            }
        }
    }

    pub async fn try_swap_package(&self, archive_ref: &str, variant: Variant) -> Result<PackageSwapPlan, InstallError> {
        let archive = self.resolve_archive_path(archive_ref)?;

        self.events.emit(Event::PackageSwapLoading(true));
        let registry = Arc::clone(&self.registry);
        let result = tokio::task::spawn_blocking(move || swap(registry.as_ref(), archive, variant))
            .await
            .map_err(InstallError::from)
            .and_then(|result| result);
        self.events.emit(Event::PackageSwapLoading(false));

        result
    }
}

fn swap(registry: &dyn PackageRegistry, archive: PathBuf, variant: Variant) -> Result<PackageSwapPlan, InstallError> {
    let previous = match registry.resolve_current(variant) {
        Ok(previous) => previous,
        Err(err) => {
            tracing::warn!(%variant, "Could not query the installed package, installing fresh: {err}");
            None
        }
    };
    let plan = PackageSwapPlan { previous, archive };

    if let Some(previous) = &plan.previous {
        tracing::info!(package = %previous.package_id, "Removing installed package");
        registry.uninstall(previous).map_err(InstallError::Uninstall)?;
    }
    tracing::info!(archive = %plan.archive.display(), "Registering package");
    registry.install(&plan.archive).map_err(InstallError::PackageInstall)?;

    Ok(plan)
}

fn has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
