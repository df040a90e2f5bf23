//! Platform package registration: which build of the game is currently
//! registered, and swapping it for a new archive.

mod powershell;

pub use powershell::{PowerShellRegistry, parse_appx_info};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Which of the two platform package identities an operation targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Release,
    Preview,
}

impl Variant {
    pub fn from_preview(is_preview: bool) -> Self {
        if is_preview {
            Variant::Preview
        } else {
            Variant::Release
        }
    }

    /// Platform package name registered for this variant.
    pub fn package_name(self) -> &'static str {
        match self {
            Variant::Release => "Microsoft.MinecraftUWP",
            Variant::Preview => "Microsoft.MinecraftWindowsBeta",
        }
    }

    /// Prefix a version label of this variant may carry, e.g. `preview 1.21.50`.
    pub fn label_prefix(self) -> &'static str {
        match self {
            Variant::Release => "release ",
            Variant::Preview => "preview ",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Release => f.write_str("release"),
            Variant::Preview => f.write_str("preview"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    pub package_id: String,
    pub install_location: PathBuf,
    pub version: String,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: &'static str,
        source: std::io::Error,
    },

    #[error("{operation} failed ({status}): {output}")]
    CommandFailed {
        operation: &'static str,
        status: String,
        output: String,
    },

    #[error("Unexpected package query output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Blocking interface to the platform package manager.
pub trait PackageRegistry: Send + Sync {
    /// The package currently registered for `variant`, if any.
    fn resolve_current(&self, variant: Variant) -> Result<Option<InstalledPackage>, RegistryError>;

    /// Unregisters `package`, preserving its roaming application data.
    fn uninstall(&self, package: &InstalledPackage) -> Result<(), RegistryError>;

    fn install(&self, archive: &Path) -> Result<(), RegistryError>;
}

/// What a package swap will do: remove `previous` when present, then
/// register `archive`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageSwapPlan {
    pub previous: Option<InstalledPackage>,
    pub archive: PathBuf,
}

impl PackageSwapPlan {
    pub fn is_fresh_install(&self) -> bool {
        self.previous.is_none()
    }
}
