//! Path encodings accepted by the two native entry points.

use std::ffi::{CString, OsStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodepageError {
    #[error("Path contains an interior NUL character: {0}")]
    InteriorNul(String),

    #[error("Path is not valid Unicode: {0}")]
    NotUnicode(String),

    #[error("Path cannot be represented in the active code page: {0}")]
    Unrepresentable(String),

    #[error("Code page conversion failed for {path}: {reason}")]
    Conversion { path: String, reason: String },
}

/// NUL-terminated UTF-16 buffer for the wide entry point.
pub fn to_wide_nul(text: &OsStr) -> Result<Vec<u16>, CodepageError> {
    let wide = encode_wide(text)?;
    if wide.contains(&0) {
        return Err(CodepageError::InteriorNul(text.to_string_lossy().into_owned()));
    }
    Ok(wide.into_iter().chain(std::iter::once(0)).collect())
}

#[cfg(windows)]
fn encode_wide(text: &OsStr) -> Result<Vec<u16>, CodepageError> {
    use std::os::windows::ffi::OsStrExt;

    Ok(text.encode_wide().collect())
}

#[cfg(not(windows))]
fn encode_wide(text: &OsStr) -> Result<Vec<u16>, CodepageError> {
    text.to_str()
        .map(|s| s.encode_utf16().collect())
        .ok_or_else(|| CodepageError::NotUnicode(text.to_string_lossy().into_owned()))
}

/// NUL-terminated bytes in the active system code page for the narrow entry
/// point. Raw UTF-8 must never be handed to it: non-ASCII characters would be
/// silently mangled.
#[cfg(windows)]
pub fn to_active_code_page(text: &OsStr) -> Result<CString, CodepageError> {
    use windows::Win32::Globalization::WideCharToMultiByte;
    use windows::core::{BOOL, PCSTR};

    const CP_ACP: u32 = 0;
    const WC_NO_BEST_FIT_CHARS: u32 = 0x0400;

    let wide = encode_wide(text)?;
    if wide.is_empty() {
        return Ok(CString::default());
    }
    let lossy = || text.to_string_lossy().into_owned();
    let conversion_failed = || CodepageError::Conversion {
        path: lossy(),
        reason: std::io::Error::last_os_error().to_string(),
    };

    let mut used_default = BOOL(0);
    // SAFETY: `wide` outlives the call and no output buffer is passed.
    let required = unsafe {
        WideCharToMultiByte(
            CP_ACP,
            WC_NO_BEST_FIT_CHARS,
            &wide,
            None,
            PCSTR::null(),
            Some(std::ptr::addr_of_mut!(used_default)),
        )
    };
    if required <= 0 {
        return Err(conversion_failed());
    }
    if used_default.as_bool() {
        return Err(CodepageError::Unrepresentable(lossy()));
    }

    let mut buffer = vec![0u8; required as usize];
    // SAFETY: `buffer` has exactly the length reported by the sizing call.
    let written = unsafe {
        WideCharToMultiByte(
            CP_ACP,
            WC_NO_BEST_FIT_CHARS,
            &wide,
            Some(&mut buffer),
            PCSTR::null(),
            None,
        )
    };
    if written <= 0 {
        return Err(conversion_failed());
    }
    buffer.truncate(written as usize);

    CString::new(buffer).map_err(|_| CodepageError::InteriorNul(lossy()))
}

/// Outside Windows the system code page is UTF-8.
#[cfg(not(windows))]
pub fn to_active_code_page(text: &OsStr) -> Result<CString, CodepageError> {
    use std::os::unix::ffi::OsStrExt;

    CString::new(text.as_bytes())
        .map_err(|_| CodepageError::InteriorNul(text.to_string_lossy().into_owned()))
}
