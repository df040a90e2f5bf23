use crate::cli::args::Command;
use crate::cli::params::{ArchiveQueryParams, DownloadParams, InstallParams, SwapParams};
use crate::config::load_config;
use crate::error::LaunchPrepError;
use crate::install::validate_folder_name;
use crate::registry::Variant;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub enum ResolvedCommand {
    Download(DownloadParams),
    Install(InstallParams),
    Swap(SwapParams),
    Resolve(ArchiveQueryParams),
    Delete(ArchiveQueryParams),
    Status(ArchiveQueryParams),
}

pub fn resolve_command(
    command: Command,
    config_path: Option<&Path>,
) -> Result<ResolvedCommand, LaunchPrepError> {
    let app_config = load_config(config_path)?;

    match command {
        Command::Download {
            url,
            discard_partial,
        } => {
            let parsed = url::Url::parse(url.trim()).map_err(|e| {
                LaunchPrepError::CliArgumentValidation {
                    details: format!("Invalid download URL {url}: {e}"),
                }
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(LaunchPrepError::CliArgumentValidation {
                    details: format!("Unsupported URL scheme '{}'. Use http or https.", parsed.scheme()),
                });
            }

            Ok(ResolvedCommand::Download(DownloadParams {
                app_config,
                url: url.trim().to_string(),
                discard_partial,
            }))
        }
        Command::Install {
            archive,
            folder_name,
            preview,
        } => {
            require_non_empty("ARCHIVE", &archive)?;
            validate_folder_name(&folder_name).map_err(|code| {
                LaunchPrepError::CliArgumentValidation {
                    details: format!("Invalid --name '{folder_name}': {code}"),
                }
            })?;

            Ok(ResolvedCommand::Install(InstallParams {
                app_config,
                archive,
                folder_name,
                variant: Variant::from_preview(preview),
            }))
        }
        Command::Swap { archive, preview } => {
            require_non_empty("ARCHIVE", &archive)?;

            Ok(ResolvedCommand::Swap(SwapParams {
                app_config,
                archive: PathBuf::from(archive.trim()),
                variant: Variant::from_preview(preview),
            }))
        }
        Command::Resolve { version, preview } => {
            require_non_empty("VERSION", &version)?;
            Ok(ResolvedCommand::Resolve(query(app_config, version, preview)))
        }
        Command::Delete { version, preview } => {
            require_non_empty("VERSION", &version)?;
            Ok(ResolvedCommand::Delete(query(app_config, version, preview)))
        }
        Command::Status { version, preview } => {
            require_non_empty("VERSION", &version)?;
            Ok(ResolvedCommand::Status(query(app_config, version, preview)))
        }
    }
}

fn query(app_config: crate::config::Config, version: String, preview: bool) -> ArchiveQueryParams {
    ArchiveQueryParams {
        app_config,
        version,
        variant: Variant::from_preview(preview),
    }
}

fn require_non_empty(name: &str, value: &str) -> Result<(), LaunchPrepError> {
    if value.trim().is_empty() {
        return Err(LaunchPrepError::CliArgumentValidation {
            details: format!("{name} must not be empty."),
        });
    }
    Ok(())
}
