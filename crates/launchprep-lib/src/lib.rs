pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod extractor;
pub mod install;
pub mod preparation;
pub mod provision;
pub mod registry;
pub mod storage;
pub mod utils;
pub mod verification;

pub use config::Config;
pub use error::LaunchPrepError;
