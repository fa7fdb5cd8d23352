//! Infrastructure layer
//!
//! Settings loading, logging setup and artifact storage.

mod archive;
pub mod config;
mod logging;

pub use archive::archive_artifacts;
pub use config::{DEFAULT_SETTINGS_FILE, ReadinessSettings, Settings};
pub use logging::init_logging;
