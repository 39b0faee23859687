//! RuidaKit Settings Crate
//!
//! Loads and saves the controller, panel, readiness and job settings, and
//! turns them into the runtime configuration of each component.

pub mod config;
pub mod error;

pub use config::{
    Config, ConnectionSettings, JobSettings, MotionSettings, PanelSettings, ReadinessSettings,
};
pub use error::{ConfigError, SettingsError, SettingsResult};
