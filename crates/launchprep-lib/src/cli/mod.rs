mod args;
mod download;
mod install;
mod params;
mod resolved_command;

pub use args::{Args, Command, parse_args};
pub use download::run_download;
pub use install::{run_delete, run_install, run_resolve, run_status, run_swap};
pub use params::{ArchiveQueryParams, DownloadParams, EmbeddedPayloads, InstallParams, SwapParams};
pub use resolved_command::{ResolvedCommand, resolve_command};
