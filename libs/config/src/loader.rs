//! Layered loading shared by every settings type in the workspace

use crate::error::ConfigResult;
use config_crate::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "MALTCP";

/// Build `T` from its serde defaults, an optional TOML file, then
/// environment variables carrying `env_prefix`.
///
/// Nested sections are addressed with a double underscore
/// (`MALTCP_TRANSPORT__PORT`).
pub fn load_layered<T: DeserializeOwned>(path: Option<&Path>, env_prefix: &str) -> ConfigResult<T> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        info!(path = %path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(path).required(true));
    } else {
        debug!("No configuration file given, using defaults");
    }

    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    Ok(config.try_deserialize()?)
}
