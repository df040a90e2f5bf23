use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub storage: StorageConfig,
    pub download: DownloadConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    /// Overrides the root under which `installers/`, `versions/` and `bin/` live.
    pub base_root: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct DownloadConfig {
    pub connect_timeout_secs: u64,
    pub progress_interval_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            progress_interval_ms: 250,
        }
    }
}

impl DownloadConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExtractionConfig {
    /// Explicit location of the native unpacking library. Takes precedence
    /// over the `LAUNCHER_CORE_DLL` environment variable.
    pub library_path: Option<PathBuf>,
    pub poll_interval_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            poll_interval_ms: 300,
        }
    }
}

impl ExtractionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
