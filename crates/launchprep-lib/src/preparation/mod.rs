//! Post-extraction adjustments applied to an unpacked version directory.
//!
//! Steps run in a fixed order and each one decides on its own, through a
//! marker file or a content hash, whether there is anything left to do.

mod patcher;
mod preloader;
mod runtime;

pub use patcher::{BACKUP_MARKER, BinaryPatcher, PATCH_TOOL_NAME, TARGET_EXECUTABLE};
pub use preloader::{PRELOADER_CONFIG_NAME, PRELOADER_LIBRARY_NAME, PreloaderConfig, PreloaderInjector};
pub use runtime::{RUNTIME_LIBRARY_NAMES, RuntimeRedistributable};

use crate::provision::{NativeToolRecord, ProvisionError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreparationError {
    #[error("No payload embedded for step {step}")]
    NothingEmbedded { step: &'static str },

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("Expected file is missing: {path}")]
    MissingTarget { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: PathBuf,
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}")]
    ToolFailed { tool: PathBuf, status: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// The version directory already carried the step's result.
    AlreadyApplied,
}

/// One idempotent adjustment of a version directory. Blocking.
pub trait PreparationStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, version_dir: &Path) -> Result<StepOutcome, PreparationError>;
}

/// Native payloads compiled into the binary for the preparation steps. Empty
/// payloads mark a component that was not bundled in this build.
#[derive(Clone, Debug)]
pub struct PreparationPayloads {
    pub runtime_libraries: Vec<NativeToolRecord>,
    pub preloader: NativeToolRecord,
    pub patch_tool: NativeToolRecord,
}

impl Default for PreparationPayloads {
    fn default() -> Self {
        Self {
            runtime_libraries: RUNTIME_LIBRARY_NAMES
                .iter()
                .map(|&name| NativeToolRecord::library(name, &[]))
                .collect(),
            preloader: NativeToolRecord::library(PRELOADER_LIBRARY_NAME, &[]),
            patch_tool: NativeToolRecord::executable(PATCH_TOOL_NAME, &[]),
        }
    }
}

/// The steps in the order they must run: runtime redistributable, preloader,
/// binary patch.
pub fn default_steps(payloads: &PreparationPayloads) -> Vec<Arc<dyn PreparationStep>> {
    vec![
        Arc::new(RuntimeRedistributable::new(payloads.runtime_libraries.clone())),
        Arc::new(PreloaderInjector::new(payloads.preloader)),
        Arc::new(BinaryPatcher::new(payloads.patch_tool)),
    ]
}
