use crate::cli::{ArchiveQueryParams, EmbeddedPayloads, InstallParams, SwapParams};
use crate::config::Config;
use crate::error::LaunchPrepError;
use crate::events::LogSink;
use crate::extractor::Extractor;
use crate::install::Installer;
use crate::preparation::default_steps;
use crate::registry::PowerShellRegistry;
use crate::storage::StorageLayout;
use std::sync::Arc;

fn build_installer(app_config: &Config, payloads: &EmbeddedPayloads) -> Installer {
    let layout = StorageLayout::from_config(&app_config.storage);
    let extractor = Extractor::new(&app_config.extraction, &layout, payloads.extraction_library);

    Installer::new(
        layout,
        Arc::new(extractor),
        Arc::new(PowerShellRegistry),
        Arc::new(LogSink),
    )
    .with_preparation_steps(default_steps(&payloads.preparation))
    .with_poll_interval(app_config.extraction.poll_interval())
}

pub async fn run_install(params: InstallParams, payloads: &EmbeddedPayloads) -> Result<(), LaunchPrepError> {
    let InstallParams {
        app_config,
        archive,
        folder_name,
        variant,
    } = params;

    let installer = build_installer(&app_config, payloads);
    let output_dir = installer
        .try_install_extract(&archive, &folder_name, variant)
        .await?;

    tracing::info!("Version ready at {}", output_dir.display());
    Ok(())
}

pub async fn run_swap(params: SwapParams, payloads: &EmbeddedPayloads) -> Result<(), LaunchPrepError> {
    let SwapParams {
        app_config,
        archive,
        variant,
    } = params;

    let installer = build_installer(&app_config, payloads);
    let plan = installer
        .try_swap_package(&archive.to_string_lossy(), variant)
        .await?;

    match &plan.previous {
        Some(previous) => tracing::info!(
            "Replaced {} with {}",
            previous.package_id,
            plan.archive.display()
        ),
        None => tracing::info!("Registered {}", plan.archive.display()),
    }
    Ok(())
}

pub fn run_resolve(params: ArchiveQueryParams, payloads: &EmbeddedPayloads) -> Result<(), LaunchPrepError> {
    let installer = build_installer(&params.app_config, payloads);
    match installer.try_resolve_archive(&params.version, params.variant)? {
        Some(entry) => println!("{}", entry.base_name),
        None => tracing::info!("No downloaded archive for {}", params.version),
    }
    Ok(())
}

pub fn run_delete(params: ArchiveQueryParams, payloads: &EmbeddedPayloads) -> Result<(), LaunchPrepError> {
    let installer = build_installer(&params.app_config, payloads);
    let path = installer.try_delete_archive(&params.version, params.variant)?;
    tracing::info!("Deleted {}", path.display());
    Ok(())
}

pub fn run_status(params: ArchiveQueryParams, payloads: &EmbeddedPayloads) -> Result<(), LaunchPrepError> {
    let installer = build_installer(&params.app_config, payloads);
    let status = installer.version_status(&params.version, params.variant);
    println!("{}", serde_json::to_string(&status)?);
    Ok(())
}
