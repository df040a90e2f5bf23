use super::{PreparationError, PreparationStep, StepOutcome};
use crate::provision::{NativeToolRecord, ProvisionOutcome, ensure};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const PRELOADER_LIBRARY_NAME: &str = "PreLoader.dll";
pub const PRELOADER_CONFIG_NAME: &str = "preloader.json";

/// Contents of `preloader.json`. An existing file is user-owned and is never
/// rewritten.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloaderConfig {
    pub color_log: bool,
    pub log_level: i32,
    pub log_path: String,
    pub mods_path: String,
    pub version: i32,
}

impl Default for PreloaderConfig {
    fn default() -> Self {
        Self {
            color_log: true,
            log_level: 4,
            log_path: "./logs/PreLoader.log".to_string(),
            mods_path: "./mods".to_string(),
            version: 1,
        }
    }
}

/// Deploys the mod preloader library and its default configuration.
pub struct PreloaderInjector {
    library: NativeToolRecord,
    config: PreloaderConfig,
}

impl PreloaderInjector {
    pub fn new(library: NativeToolRecord) -> Self {
        Self {
            library,
            config: PreloaderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PreloaderConfig) -> Self {
        self.config = config;
        self
    }

    fn write_config(&self, version_dir: &Path) -> Result<bool, PreparationError> {
        let path = version_dir.join(PRELOADER_CONFIG_NAME);
        if path.exists() {
            return Ok(false);
        }
        let json = serde_json::to_vec_pretty(&self.config).map_err(|source| {
            PreparationError::Serialize {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&path, json).map_err(|source| PreparationError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Wrote default preloader configuration");
        Ok(true)
    }
}

impl PreparationStep for PreloaderInjector {
    fn name(&self) -> &'static str {
        "preloader"
    }

    fn apply(&self, version_dir: &Path) -> Result<StepOutcome, PreparationError> {
        if !self.library.is_embedded() {
            return Err(PreparationError::NothingEmbedded { step: self.name() });
        }

        let library = ensure(&self.library, &version_dir.join(self.library.name()))?;
        let config_written = self.write_config(version_dir)?;

        if library == ProvisionOutcome::Written || config_written {
            Ok(StepOutcome::Applied)
        } else {
            Ok(StepOutcome::AlreadyApplied)
        }
    }
}
