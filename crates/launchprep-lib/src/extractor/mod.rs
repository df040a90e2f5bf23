//! Binding to the native unpacking routine.
//!
//! The library is resolved and bound once per [`Extractor`]; the process keeps
//! a single extractor for its whole lifetime. The bound form is immutable and
//! records which of the two entry points the library exports.

pub mod codepage;

use crate::config::ExtractionConfig;
use crate::provision::NativeToolRecord;
use crate::storage::StorageLayout;
use libloading::Library;
use std::ffi::{OsString, c_char, c_int};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Environment variable naming an explicit unpacking library to load.
pub const LIBRARY_OVERRIDE_ENV: &str = "LAUNCHER_CORE_DLL";

/// Base name of the unpacking library; the platform prefix and suffix are
/// added by [`libloading::library_filename`].
pub const LIBRARY_STEM: &str = "launcher_core";

/// File name the embedded copy of the library is deployed under.
pub const LIBRARY_FILE_NAME: &str = "launcher_core.dll";

const WIDE_SYMBOL: &[u8] = b"miHoYoW\0";
const NARROW_SYMBOL: &[u8] = b"miHoYo\0";

/// Code reported when the library could not be bound or the arguments could
/// not be encoded.
pub const BIND_FAILURE_CODE: i32 = 1;

type WideEntry = unsafe extern "system" fn(*const u16, *const u16) -> c_int;
type NarrowEntry = unsafe extern "system" fn(*const c_char, *const c_char) -> c_int;

/// Result of one unpack call. `code == 0` is the only success signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub code: i32,
    pub message: String,
}

impl ExtractionOutcome {
    pub fn success() -> Self {
        Self {
            code: 0,
            message: String::new(),
        }
    }

    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Unpacks an archive into a directory. Blocking; there is no way to abort a
/// call once issued.
pub trait Extract: Send + Sync {
    fn extract(&self, archive: &Path, output_dir: &Path) -> ExtractionOutcome;
}

#[derive(Clone, Copy)]
enum EntryPoint {
    Wide(WideEntry),
    Narrow(NarrowEntry),
}

struct BoundExtractor {
    // Keeps the entry point's code mapped.
    _library: Library,
    entry: EntryPoint,
}

impl BoundExtractor {
    fn bind(path: &Path) -> Result<Self, String> {
        // SAFETY: loading runs the library's initializers; the unpacking
        // library is a trusted, hash-verified payload or an explicit override.
        let library = unsafe { Library::new(path) }
            .map_err(|err| format!("failed to load {}: {err}", path.display()))?;

        // SAFETY: the exported symbols have the declared signatures.
        let entry = unsafe {
            match library.get::<WideEntry>(WIDE_SYMBOL) {
                Ok(symbol) => EntryPoint::Wide(*symbol),
                Err(_) => match library.get::<NarrowEntry>(NARROW_SYMBOL) {
                    Ok(symbol) => EntryPoint::Narrow(*symbol),
                    Err(err) => {
                        return Err(format!(
                            "{} exports no unpacking entry point: {err}",
                            path.display()
                        ));
                    }
                },
            }
        };

        Ok(Self {
            _library: library,
            entry,
        })
    }

    fn call(&self, archive: &Path, output_dir: &Path) -> ExtractionOutcome {
        let code = match self.entry {
            EntryPoint::Wide(entry) => {
                let (archive, output_dir) = match (
                    codepage::to_wide_nul(archive.as_os_str()),
                    codepage::to_wide_nul(output_dir.as_os_str()),
                ) {
                    (Ok(archive), Ok(output_dir)) => (archive, output_dir),
                    (Err(err), _) | (_, Err(err)) => {
                        return ExtractionOutcome::failure(BIND_FAILURE_CODE, err.to_string());
                    }
                };
                // SAFETY: both buffers are NUL-terminated and live across the call.
                unsafe { entry(archive.as_ptr(), output_dir.as_ptr()) }
            }
            EntryPoint::Narrow(entry) => {
                let (archive, output_dir) = match (
                    codepage::to_active_code_page(archive.as_os_str()),
                    codepage::to_active_code_page(output_dir.as_os_str()),
                ) {
                    (Ok(archive), Ok(output_dir)) => (archive, output_dir),
                    (Err(err), _) | (_, Err(err)) => {
                        return ExtractionOutcome::failure(BIND_FAILURE_CODE, err.to_string());
                    }
                };
                // SAFETY: both strings are NUL-terminated and live across the call.
                unsafe { entry(archive.as_ptr(), output_dir.as_ptr()) }
            }
        };

        if code == 0 {
            ExtractionOutcome::success()
        } else {
            // The native layer gives no detail beyond the code.
            ExtractionOutcome::failure(code, String::new())
        }
    }
}

/// Where the unpacking library is loaded from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LibrarySource {
    Override(PathBuf),
    Provisioned(PathBuf),
    SearchPath(OsString),
}

impl LibrarySource {
    fn path(&self) -> &Path {
        match self {
            LibrarySource::Override(path) | LibrarySource::Provisioned(path) => path,
            LibrarySource::SearchPath(name) => Path::new(name),
        }
    }
}

pub struct Extractor {
    library_override: Option<PathBuf>,
    tool_cache_dir: PathBuf,
    embedded: NativeToolRecord,
    bound: OnceLock<Result<BoundExtractor, String>>,
}

impl Extractor {
    /// `embedded` is the library payload compiled into the binary; it may be
    /// empty, in which case the library is looked up on the search path.
    pub fn new(config: &ExtractionConfig, layout: &StorageLayout, embedded: NativeToolRecord) -> Self {
        let library_override = config.library_path.clone().or_else(|| {
            std::env::var_os(LIBRARY_OVERRIDE_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        });
        Self {
            library_override,
            tool_cache_dir: layout.tool_cache_dir(),
            embedded,
            bound: OnceLock::new(),
        }
    }

    /// Binds the library ahead of the first extraction.
    pub fn preload(&self) -> Result<(), String> {
        self.bound().as_ref().map(|_| ()).map_err(Clone::clone)
    }

    pub fn resolve_library(&self) -> LibrarySource {
        if let Some(path) = &self.library_override {
            return LibrarySource::Override(path.clone());
        }
        if self.embedded.is_embedded() {
            match self.embedded.ensure_in(&self.tool_cache_dir) {
                Ok(path) => return LibrarySource::Provisioned(path),
                Err(err) => {
                    tracing::warn!("Falling back to the library search path: {err}");
                }
            }
        }
        LibrarySource::SearchPath(libloading::library_filename(LIBRARY_STEM))
    }

    fn bound(&self) -> &Result<BoundExtractor, String> {
        self.bound.get_or_init(|| {
            let source = self.resolve_library();
            tracing::debug!(?source, "Binding unpacking library");
            let bound = BoundExtractor::bind(source.path());
            match &bound {
                Ok(bound) => tracing::info!(
                    library = %source.path().display(),
                    wide = matches!(bound.entry, EntryPoint::Wide(_)),
                    "Unpacking library bound"
                ),
                Err(err) => tracing::warn!("Unpacking library unavailable: {err}"),
            }
            bound
        })
    }
}

impl Extract for Extractor {
    fn extract(&self, archive: &Path, output_dir: &Path) -> ExtractionOutcome {
        match self.bound() {
            Ok(bound) => {
                tracing::info!(
                    archive = %archive.display(),
                    output = %output_dir.display(),
                    "Invoking native unpacker"
                );
                bound.call(archive, output_dir)
            }
            Err(err) => ExtractionOutcome::failure(BIND_FAILURE_CODE, err.clone()),
        }
    }
}
