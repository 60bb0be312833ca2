//! # MAL/TCP Configuration
//!
//! Settings for a transport instance, loaded in layers:
//!
//! 1. serde defaults on every field
//! 2. an optional TOML file
//! 3. `MALTCP_*` environment variables (`MALTCP_MAX_FRAME_SIZE=65536`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use transport_config::TransportSettings;
//!
//! let settings = TransportSettings::load(Some("config/transport.toml".as_ref()))?;
//! settings.validate()?;
//! # Ok::<(), transport_config::ConfigError>(())
//! ```
//!
//! Property names from older deployments (`numconnections`, `autohost`) are
//! accepted as aliases.

pub mod error;
pub mod loader;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_layered, ENV_PREFIX};
pub use settings::TransportSettings;
