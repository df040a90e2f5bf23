//! Destination naming and response header parsing for archive downloads.

use crate::storage::ARCHIVE_EXTENSION;
use url::Url;

/// Query parameter a download link may use to name the saved archive.
pub const FILENAME_PARAM: &str = "filename";

pub const DEFAULT_FILENAME: &str = "download.msixvc";

/// File name the archive at `raw_url` is saved under.
///
/// The `filename` query parameter wins; otherwise the last non-empty path
/// segment is used as-is.
pub fn derive_filename(raw_url: &str) -> String {
    let Ok(url) = Url::parse(raw_url) else {
        return DEFAULT_FILENAME.to_string();
    };

    if let Some((_, value)) = url
        .query_pairs()
        .find(|(key, value)| key == FILENAME_PARAM && !value.is_empty())
    {
        return ensure_archive_filename(&value);
    }

    url.path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).next_back())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .filter(|name| !name.contains(['/', '\\']))
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// Sanitizes a caller-supplied name: separators become `_` and the archive
/// extension is appended unless already present (case-insensitively).
pub fn ensure_archive_filename(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return DEFAULT_FILENAME.to_string();
    }
    let name = name.replace(['/', '\\'], "_");
    let suffix = format!(".{ARCHIVE_EXTENSION}");
    if name.to_lowercase().ends_with(&suffix) {
        name
    } else {
        name + &suffix
    }
}

/// The URL actually requested: the `filename` parameter only names the local
/// file and is not sent to the server.
pub fn strip_filename_param(raw_url: &str) -> String {
    let Ok(mut url) = Url::parse(raw_url) else {
        return raw_url.to_string();
    };
    if url.query().is_none() {
        return url.into();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != FILENAME_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.into()
}

/// Complete length from a `Content-Range: bytes <start>-<end>/<total>`
/// header. `None` when the length is `*` or unparsable.
pub fn parse_content_range_total(header: &str) -> Option<i64> {
    let (_, total) = header.rsplit_once('/')?;
    let total = total.trim();
    if total == "*" {
        return None;
    }
    total.parse::<i64>().ok().filter(|total| *total >= 0)
}
