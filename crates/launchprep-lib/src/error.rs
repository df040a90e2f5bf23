use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchPrepError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] crate::download::DownloadError),

    #[error("Installation failed: {0}")]
    Install(#[from] crate::install::InstallError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] crate::provision::ProvisionError),

    #[error("Package registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("Invalid command line arguments: {details}")]
    CliArgumentValidation { details: String },

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(#[from] eyre::Report),
}

/// Short machine-readable failure codes returned across the public surface.
///
/// Callers look these up in their localization tables; they are never shown
/// verbatim as prose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum ErrorCode {
    ArchiveNotSpecified,
    ArchiveNotFound,
    CannotAccessInstallersDir,
    CannotAccessVersionsDir,
    CannotCreateTargetDir,
    CannotWriteTarget,
    InstallFailed,
    PackageUninstallFailed,
    PackageInstallFailed,
    NameRequired,
    NameTooLong,
    NameTrailingDotSpace,
    NameInvalidChar,
    NameControlChar,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ArchiveNotSpecified => "ARCHIVE_NOT_SPECIFIED",
            ErrorCode::ArchiveNotFound => "ARCHIVE_NOT_FOUND",
            ErrorCode::CannotAccessInstallersDir => "CANNOT_ACCESS_INSTALLERS_DIR",
            ErrorCode::CannotAccessVersionsDir => "CANNOT_ACCESS_VERSIONS_DIR",
            ErrorCode::CannotCreateTargetDir => "CANNOT_CREATE_TARGET_DIR",
            ErrorCode::CannotWriteTarget => "CANNOT_WRITE_TARGET",
            ErrorCode::InstallFailed => "INSTALL_FAILED",
            ErrorCode::PackageUninstallFailed => "PACKAGE_UNINSTALL_FAILED",
            ErrorCode::PackageInstallFailed => "PACKAGE_INSTALL_FAILED",
            ErrorCode::NameRequired => "NAME_REQUIRED",
            ErrorCode::NameTooLong => "NAME_TOO_LONG",
            ErrorCode::NameTrailingDotSpace => "NAME_TRAILING_DOT_SPACE",
            ErrorCode::NameInvalidChar => "NAME_INVALID_CHAR",
            ErrorCode::NameControlChar => "NAME_CONTROL_CHAR",
        }
    }
}

impl From<ErrorCode> for &'static str {
    fn from(code: ErrorCode) -> Self {
        code.as_str()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
