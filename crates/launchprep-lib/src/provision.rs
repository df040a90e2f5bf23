//! Deploys embedded native payloads (libraries and executables) to disk.
//!
//! A payload is only ever linked under its real name once it has been fully
//! written to a sibling temporary file, so readers never observe a partially
//! written tool.

use crate::verification::{ContentDigest, ContentDigestVerifier};
use std::path::{Path, PathBuf};
use thiserror::Error;

const TEMP_SUFFIX: &str = ".tmp";

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("No payload embedded for {name}")]
    NothingEmbedded { name: &'static str },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write temporary file {path}: {source}")]
    WriteTemp {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to set permissions on {path}: {source}")]
    SetPermissions {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to move {from} into place at {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The deployed file already matched the payload; nothing was written.
    AlreadyCurrent,
    Written,
}

/// One embedded native payload and how it must be materialized.
#[derive(Clone, Copy, Debug)]
pub struct NativeToolRecord {
    name: &'static str,
    payload: &'static [u8],
    executable: bool,
}

impl NativeToolRecord {
    pub const fn library(name: &'static str, payload: &'static [u8]) -> Self {
        Self {
            name,
            payload,
            executable: false,
        }
    }

    pub const fn executable(name: &'static str, payload: &'static [u8]) -> Self {
        Self {
            name,
            payload,
            executable: true,
        }
    }

    /// File name the payload is deployed under.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn payload(&self) -> &'static [u8] {
        self.payload
    }

    pub fn is_executable(&self) -> bool {
        self.executable
    }

    pub fn is_embedded(&self) -> bool {
        !self.payload.is_empty()
    }

    pub fn payload_digest(&self) -> ContentDigest {
        ContentDigest::of_bytes(self.payload)
    }

    /// Deploys the payload as `<dir>/<name>` and returns the deployed path.
    pub fn ensure_in(&self, dir: &Path) -> Result<PathBuf, ProvisionError> {
        let target = dir.join(self.name);
        ensure(self, &target)?;
        Ok(target)
    }
}

/// Makes `target` hold exactly the record's payload.
///
/// A target that is absent, empty, unreadable or whose digest differs from the
/// payload is replaced through a temp-file-then-rename swap. A correct target
/// is left untouched.
pub fn ensure(record: &NativeToolRecord, target: &Path) -> Result<ProvisionOutcome, ProvisionError> {
    if !record.is_embedded() {
        return Err(ProvisionError::NothingEmbedded { name: record.name });
    }

    if is_current(record, target) {
        tracing::trace!(target = %target.display(), "Deployed payload is current");
        return Ok(ProvisionOutcome::AlreadyCurrent);
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ProvisionError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp = temp_path(target);
    if let Err(err) = write_temp(record, &temp) {
        let _ = std::fs::remove_file(&temp);
        return Err(err);
    }

    if let Err(source) = std::fs::rename(&temp, target) {
        let _ = std::fs::remove_file(&temp);
        return Err(ProvisionError::Rename {
            from: temp,
            to: target.to_path_buf(),
            source,
        });
    }

    tracing::info!(
        target = %target.display(),
        digest = %record.payload_digest(),
        "Deployed embedded payload"
    );
    Ok(ProvisionOutcome::Written)
}

/// Boolean form of [`ensure`] for callers that only need to know whether the
/// tool is usable.
pub fn ensure_ok(record: &NativeToolRecord, target: &Path) -> bool {
    match ensure(record, target) {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(target = %target.display(), "Failed to provision {}: {err}", record.name);
            false
        }
    }
}

fn is_current(record: &NativeToolRecord, target: &Path) -> bool {
    match std::fs::metadata(target) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => {}
        _ => return false,
    }
    match ContentDigestVerifier::new(record.payload_digest()).verify_file(target) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(target = %target.display(), "Deployed payload is stale: {err}");
            false
        }
    }
}

fn write_temp(record: &NativeToolRecord, temp: &Path) -> Result<(), ProvisionError> {
    std::fs::write(temp, record.payload).map_err(|source| ProvisionError::WriteTemp {
        path: temp.to_path_buf(),
        source,
    })?;
    set_mode(temp, record.executable).map_err(|source| ProvisionError::SetPermissions {
        path: temp.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn set_mode(path: &Path, executable: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = if executable { 0o755 } else { 0o644 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _executable: bool) -> std::io::Result<()> {
    Ok(())
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    static PAYLOAD: &[u8] = b"\x7fELF pretend native library payload";

    fn modified(path: &Path) -> SystemTime {
        std::fs::metadata(path).unwrap().modified().unwrap()
    }

    #[test]
    fn test_first_ensure_writes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("core.dll");
        let record = NativeToolRecord::library("core.dll", PAYLOAD);

        assert_eq!(ensure(&record, &target).unwrap(), ProvisionOutcome::Written);
        assert_eq!(std::fs::read(&target).unwrap(), PAYLOAD);
        assert!(!temp_path(&target).exists());
    }

    #[test]
    fn test_second_ensure_performs_no_write() {
        let dir = tempfile::tempdir().unwrap();
        let record = NativeToolRecord::library("core.dll", PAYLOAD);
        let target = record.ensure_in(dir.path()).unwrap();

        let before = modified(&target);
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(
            ensure(&record, &target).unwrap(),
            ProvisionOutcome::AlreadyCurrent
        );
        assert_eq!(modified(&target), before);
    }

    #[test]
    fn test_mismatched_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("core.dll");
        std::fs::write(&target, b"tampered").unwrap();
        let record = NativeToolRecord::library("core.dll", PAYLOAD);

        assert_eq!(ensure(&record, &target).unwrap(), ProvisionOutcome::Written);
        assert_eq!(std::fs::read(&target).unwrap(), PAYLOAD);
    }

    #[test]
    fn test_empty_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("core.dll");
        std::fs::write(&target, b"").unwrap();
        let record = NativeToolRecord::library("core.dll", PAYLOAD);

        assert_eq!(ensure(&record, &target).unwrap(), ProvisionOutcome::Written);
        assert_eq!(std::fs::read(&target).unwrap(), PAYLOAD);
    }

    #[test]
    fn test_empty_payload_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let record = NativeToolRecord::executable("PeEditor.exe", &[]);

        assert!(matches!(
            record.ensure_in(dir.path()),
            Err(ProvisionError::NothingEmbedded { name: "PeEditor.exe" })
        ));
        assert!(!dir.path().join("PeEditor.exe").exists());
        assert!(!ensure_ok(&record, &dir.path().join("PeEditor.exe")));
    }

    #[test]
    fn test_target_directory_in_place_of_file_fails_rename() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("core.dll");
        std::fs::create_dir_all(target.join("occupied")).unwrap();
        let record = NativeToolRecord::library("core.dll", PAYLOAD);

        assert!(matches!(
            ensure(&record, &target),
            Err(ProvisionError::Rename { .. })
        ));
        assert!(!temp_path(&target).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_is_set_for_tools() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = NativeToolRecord::executable("PeEditor.exe", PAYLOAD)
            .ensure_in(dir.path())
            .unwrap();
        let library = NativeToolRecord::library("core.dll", PAYLOAD)
            .ensure_in(dir.path())
            .unwrap();

        let tool_mode = std::fs::metadata(tool).unwrap().permissions().mode();
        let library_mode = std::fs::metadata(library).unwrap().permissions().mode();
        assert_ne!(tool_mode & 0o111, 0);
        assert_eq!(library_mode & 0o111, 0);
    }
}
