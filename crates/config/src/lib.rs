//! Environment-driven configuration.
//!
//! Every tunable is a `BABELINK_*` environment variable with a sane default;
//! invalid values log a warning and fall back rather than aborting startup.

mod settings;

pub use settings::{Settings, SettingsError};
