use super::{PreparationError, PreparationStep, StepOutcome};
use crate::provision::NativeToolRecord;
use crate::utils::{hide_console_window, is_regular_file};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const TARGET_EXECUTABLE: &str = "Minecraft.Windows.exe";
pub const PATCH_TOOL_NAME: &str = "PeEditor.exe";

/// Left next to the executable by the patch tool. Its presence means the
/// executable was already rewritten; patching twice corrupts it.
pub const BACKUP_MARKER: &str = "Minecraft.Windows.exe.bak";

/// Rewrites the game executable in place with the bundled patch tool.
pub struct BinaryPatcher {
    tool: NativeToolRecord,
    launcher: Option<(PathBuf, Vec<OsString>)>,
}

impl BinaryPatcher {
    pub fn new(tool: NativeToolRecord) -> Self {
        Self {
            tool,
            launcher: None,
        }
    }

    /// Runs `program` with `leading_args` instead of the deployed tool. The
    /// tool payload is still deployed into the version directory.
    pub fn with_launcher<I, S>(mut self, program: impl Into<PathBuf>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.launcher = Some((
            program.into(),
            leading_args.into_iter().map(Into::into).collect(),
        ));
        self
    }
}

impl PreparationStep for BinaryPatcher {
    fn name(&self) -> &'static str {
        "binary-patch"
    }

    fn apply(&self, version_dir: &Path) -> Result<StepOutcome, PreparationError> {
        if is_regular_file(&version_dir.join(BACKUP_MARKER)) {
            tracing::debug!(dir = %version_dir.display(), "Executable already patched");
            return Ok(StepOutcome::AlreadyApplied);
        }

        let executable = version_dir.join(TARGET_EXECUTABLE);
        if !is_regular_file(&executable) {
            return Err(PreparationError::MissingTarget { path: executable });
        }

        let deployed = self.tool.ensure_in(version_dir)?;
        let (program, leading_args) = self.launcher.clone().unwrap_or((deployed, Vec::new()));

        let mut command = Command::new(&program);
        command
            .args(leading_args)
            .args(["-m", "-b", "--inplace", "--exe"])
            .arg(format!("./{TARGET_EXECUTABLE}"))
            .current_dir(version_dir);
        hide_console_window(&mut command);

        tracing::info!(tool = %program.display(), dir = %version_dir.display(), "Patching executable");
        let status = command.status().map_err(|source| PreparationError::Spawn {
            tool: program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(PreparationError::ToolFailed {
                tool: program,
                status: status.to_string(),
            });
        }
        Ok(StepOutcome::Applied)
    }
}
