use crate::config::StorageConfig;
use std::io;
use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "LaunchPrep";

/// File extension of package archives, without the leading dot.
pub const ARCHIVE_EXTENSION: &str = "msixvc";

const INSTALLERS_DIR: &str = "installers";
const VERSIONS_DIR: &str = "versions";
const TOOL_CACHE_DIR: &str = "bin";

/// The on-disk layout derived from the storage root.
///
/// ```text
/// <base_root>/
///   installers/   downloaded archives
///   versions/     one directory per unpacked version
///   bin/          provisioned native tools
/// ```
#[derive(Clone, Debug)]
pub struct StorageLayout {
    base_root: PathBuf,
}

impl StorageLayout {
    pub fn new(base_root: impl Into<PathBuf>) -> Self {
        Self {
            base_root: base_root.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        match &config.base_root {
            Some(root) => Self::new(root),
            None => Self::new(default_base_root()),
        }
    }

    pub fn base_root(&self) -> &Path {
        &self.base_root
    }

    /// Directory holding downloaded archives; created on demand.
    pub fn installers_dir(&self) -> io::Result<PathBuf> {
        ensure_dir(self.base_root.join(INSTALLERS_DIR))
    }

    /// Directory holding unpacked versions; created on demand.
    pub fn versions_dir(&self) -> io::Result<PathBuf> {
        ensure_dir(self.base_root.join(VERSIONS_DIR))
    }

    /// Shared per-user cache for native tools. Not created here; the
    /// provisioner creates it when it first writes a payload.
    pub fn tool_cache_dir(&self) -> PathBuf {
        self.base_root.join(TOOL_CACHE_DIR)
    }
}

fn ensure_dir(dir: PathBuf) -> io::Result<PathBuf> {
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Per-user local data directory, falling back to the cache directory and
/// finally to the directory of the running executable.
pub fn default_base_root() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(launcher_dir)
        .join(APP_DIR_NAME)
}

fn launcher_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directories_are_created_under_base_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("root"));

        let installers = layout.installers_dir().unwrap();
        let versions = layout.versions_dir().unwrap();

        assert_eq!(installers, dir.path().join("root").join("installers"));
        assert_eq!(versions, dir.path().join("root").join("versions"));
        assert!(installers.is_dir());
        assert!(versions.is_dir());
        assert!(!layout.tool_cache_dir().exists());
    }

    #[test]
    fn test_config_override_wins() {
        let config = StorageConfig {
            base_root: Some(PathBuf::from("/data/launchprep")),
        };
        let layout = StorageLayout::from_config(&config);
        assert_eq!(layout.base_root(), Path::new("/data/launchprep"));
    }

    #[test]
    fn test_default_root_ends_with_app_dir() {
        assert!(default_base_root().ends_with(APP_DIR_NAME));
    }
}
