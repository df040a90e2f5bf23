use crate::config::Config;
use crate::extractor::LIBRARY_FILE_NAME;
use crate::preparation::PreparationPayloads;
use crate::provision::NativeToolRecord;
use crate::registry::Variant;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DownloadParams {
    pub app_config: Config,
    pub url: String,
    pub discard_partial: bool,
}

#[derive(Debug, Clone)]
pub struct InstallParams {
    pub app_config: Config,
    pub archive: String,
    pub folder_name: String,
    pub variant: Variant,
}

#[derive(Debug, Clone)]
pub struct SwapParams {
    pub app_config: Config,
    pub archive: PathBuf,
    pub variant: Variant,
}

#[derive(Debug, Clone)]
pub struct ArchiveQueryParams {
    pub app_config: Config,
    pub version: String,
    pub variant: Variant,
}

/// Native payloads the binary was built with.
#[derive(Debug, Clone)]
pub struct EmbeddedPayloads {
    pub extraction_library: NativeToolRecord,
    pub preparation: PreparationPayloads,
}

impl Default for EmbeddedPayloads {
    fn default() -> Self {
        Self {
            extraction_library: NativeToolRecord::library(LIBRARY_FILE_NAME, &[]),
            preparation: PreparationPayloads::default(),
        }
    }
}
