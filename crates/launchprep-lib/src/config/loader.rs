use super::Config;
use crate::error::LaunchPrepError;
use crate::storage::default_base_root;
use config::Config as ConfigBuilder;
use std::path::Path;

/// Prefix of environment variables that override file settings, e.g.
/// `LAUNCHPREP_STORAGE__BASE_ROOT`.
pub const ENV_PREFIX: &str = "LAUNCHPREP";

/// Loads the configuration from `config_path`, or from the optional
/// `config.{toml,yaml,json}` under the default storage root when no path is
/// given, layering environment overrides on top.
pub fn load_config(config_path: Option<&Path>) -> Result<Config, LaunchPrepError> {
    let mut builder = ConfigBuilder::builder();

    builder = match config_path {
        Some(path) => builder.add_source(config::File::from(path)),
        None => {
            let default_path = default_base_root().join("config");
            builder.add_source(
                config::File::with_name(&default_path.to_string_lossy()).required(false),
            )
        }
    };

    let config_builder = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    config_builder.try_deserialize().map_err(Into::into)
}
