//! Configuration loading for labelrelay.
//!
//! A [`RelayConfig`] is assembled from, in order of precedence, an explicit
//! path, `$LABELRELAY_CONFIG_PATH`, `$LABELRELAY_CONFIG_JSON`, a default file
//! in the working directory, or the built-in defaults. Environment overrides
//! are applied on top and the result is validated before it is returned.

#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod sources;
pub mod util;

pub use loader::{ConfigLoad, ConfigLoader, error::ConfigLoadError};
pub use models::{ConfigSource, NotificationSettings, RelayConfig};
pub use sources::EnvConfig;
