//! Archive lookup in the installers directory and version folder naming.

use crate::error::ErrorCode;
use crate::registry::Variant;
use crate::storage::ARCHIVE_EXTENSION;
use std::path::{Path, PathBuf};

pub const MAX_FOLDER_NAME_LEN: usize = 64;

const INVALID_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// A downloaded archive found in the installers directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// File name without the archive extension.
    pub base_name: String,
    pub path: PathBuf,
}

/// Turns a caller's archive reference into a path. Absolute references are
/// taken as-is; anything else names a file in `installers_dir`, with the
/// archive extension added when missing.
pub fn archive_path(installers_dir: &Path, reference: &str) -> PathBuf {
    let path = Path::new(reference);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match strip_archive_extension(reference) {
        Some(_) => installers_dir.join(reference),
        None => installers_dir.join(format!("{reference}.{ARCHIVE_EXTENSION}")),
    }
}

fn strip_archive_extension(file_name: &str) -> Option<&str> {
    let (base, extension) = file_name.rsplit_once('.')?;
    extension
        .eq_ignore_ascii_case(ARCHIVE_EXTENSION)
        .then_some(base)
}

/// Drops a leading `release ` or `preview ` label from a version name.
pub fn normalize_version_label(label: &str) -> &str {
    let trimmed = label.trim();
    for variant in [Variant::Release, Variant::Preview] {
        let prefix = variant.label_prefix();
        if trimmed.len() >= prefix.len()
            && trimmed.is_char_boundary(prefix.len())
            && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            return trimmed[prefix.len()..].trim();
        }
    }
    trimmed
}

/// Finds the archive whose base name matches `version`, ignoring case and
/// any variant label on either side.
pub fn find_archive(installers_dir: &Path, version: &str) -> std::io::Result<Option<ArchiveEntry>> {
    let wanted = normalize_version_label(version).to_lowercase();
    if wanted.is_empty() {
        return Ok(None);
    }

    let mut entries: Vec<_> = std::fs::read_dir(installers_dir)?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(base_name) = strip_archive_extension(file_name) else {
            continue;
        };
        if normalize_version_label(base_name).to_lowercase() == wanted {
            return Ok(Some(ArchiveEntry {
                base_name: base_name.to_string(),
                path: entry.path(),
            }));
        }
    }
    Ok(None)
}

/// Checks that `name` can be used as a version directory name on every
/// supported platform and returns it trimmed.
pub fn validate_folder_name(name: &str) -> Result<&str, ErrorCode> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ErrorCode::NameRequired);
    }
    if name.chars().count() > MAX_FOLDER_NAME_LEN {
        return Err(ErrorCode::NameTooLong);
    }
    if name.ends_with(['.', ' ']) {
        return Err(ErrorCode::NameTrailingDotSpace);
    }
    if name.contains(INVALID_NAME_CHARS) {
        return Err(ErrorCode::NameInvalidChar);
    }
    if name.chars().any(|c| (c as u32) < 32) {
        return Err(ErrorCode::NameControlChar);
    }
    Ok(name)
}
