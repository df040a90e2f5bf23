use super::{InstalledPackage, PackageRegistry, RegistryError, Variant};
use crate::utils::hide_console_window;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

const POWERSHELL: &str = "powershell";

/// Registry backed by the Appx cmdlets.
#[derive(Clone, Copy, Debug, Default)]
pub struct PowerShellRegistry;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AppxInfo {
    #[serde(default)]
    package_full_name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    install_location: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AppxQueryOutput {
    One(AppxInfo),
    Many(Vec<AppxInfo>),
}

/// Parses `Get-AppxPackage | ConvertTo-Json` output, which is a single object
/// for one match and an array for several. Empty output means not installed.
pub fn parse_appx_info(output: &str) -> Result<Option<InstalledPackage>, RegistryError> {
    let output = output.trim();
    if output.is_empty() {
        return Ok(None);
    }

    let info = match serde_json::from_str::<AppxQueryOutput>(output)? {
        AppxQueryOutput::One(info) => Some(info),
        AppxQueryOutput::Many(infos) => infos.into_iter().next(),
    };

    Ok(info.and_then(|info| {
        let package_id = info.package_full_name.filter(|id| !id.is_empty())?;
        let install_location = info.install_location.filter(|loc| !loc.is_empty())?;
        Some(InstalledPackage {
            package_id,
            install_location: PathBuf::from(install_location),
            version: info.version.unwrap_or_default(),
        })
    }))
}

/// Quotes `value` as a PowerShell single-quoted literal.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn run(operation: &'static str, script: &str) -> Result<String, RegistryError> {
    tracing::debug!(operation, script, "Running PowerShell");
    let mut command = Command::new(POWERSHELL);
    command.args([
        "-NoProfile",
        "-NonInteractive",
        "-ExecutionPolicy",
        "Bypass",
        "-Command",
        script,
    ]);
    hide_console_window(&mut command);

    let output = command.output().map_err(|source| RegistryError::Spawn {
        program: POWERSHELL,
        source,
    })?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RegistryError::CommandFailed {
            operation,
            status: output.status.to_string(),
            output: format!("{}{}", stdout.trim(), stderr.trim()),
        });
    }
    Ok(stdout)
}

impl PackageRegistry for PowerShellRegistry {
    fn resolve_current(&self, variant: Variant) -> Result<Option<InstalledPackage>, RegistryError> {
        let script = format!(
            "Get-AppxPackage -Name {} | Select-Object PackageFullName, PackageFamilyName, Version, InstallLocation | ConvertTo-Json",
            quote(variant.package_name())
        );
        parse_appx_info(&run("Get-AppxPackage", &script)?)
    }

    fn uninstall(&self, package: &InstalledPackage) -> Result<(), RegistryError> {
        let script = format!(
            "Remove-AppxPackage -Package {} -PreserveRoamableApplicationData",
            quote(&package.package_id)
        );
        run("Remove-AppxPackage", &script).map(|_| ())
    }

    fn install(&self, archive: &Path) -> Result<(), RegistryError> {
        let script = format!(
            "Add-AppxPackage -Path {}",
            quote(&archive.to_string_lossy())
        );
        run("Add-AppxPackage", &script).map(|_| ())
    }
}
