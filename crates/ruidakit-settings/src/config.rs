//! Configuration file handling for RuidaKit
//!
//! Supports JSON and TOML files. Configuration is organized into sections:
//! - Connection settings (controller address, ports, timeout, swizzle key)
//! - Panel port settings
//! - Readiness polling policy
//! - RD job defaults
//! - Motion preferences (Z handling, settle time)

use crate::error::{ConfigError, SettingsError, SettingsResult};
use ruidakit_communication::readiness::ReadinessPolicy;
use ruidakit_communication::transport::{DEFAULT_ACTION_PORT, DEFAULT_SOURCE_PORT};
use ruidakit_communication::panel::{DEFAULT_PANEL_PORT, DEFAULT_PANEL_SOURCE_PORT};
use ruidakit_communication::{LaserConfig, PanelConfig, TransportConfig};
use ruidakit_protocol::RuidaProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Controller connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Controller hostname or IP
    pub host: String,
    /// Action port
    pub port: u16,
    pub source_port: u16,
    /// ACK and reply timeout in milliseconds
    pub timeout_ms: u64,
    /// Swizzle key, used when no profile is named
    pub magic: u8,
    /// Controller model; its swizzle key replaces `magic`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Log packets instead of sending them
    pub offline: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            host: transport.host,
            port: DEFAULT_ACTION_PORT,
            source_port: DEFAULT_SOURCE_PORT,
            timeout_ms: transport.timeout.as_millis() as u64,
            magic: transport.magic,
            profile: None,
            offline: false,
        }
    }
}

impl ConnectionSettings {
    /// The named profile, if any
    pub fn resolve_profile(&self) -> SettingsResult<Option<RuidaProfile>> {
        match &self.profile {
            Some(name) => RuidaProfile::by_name(name)
                .map(Some)
                .map_err(|e| SettingsError::invalid("connection.profile", &e.to_string())),
            None => Ok(None),
        }
    }

    /// Swizzle key in effect
    ///
    /// An unknown profile falls back to `magic`; `Config::validate` rejects it.
    pub fn swizzle_magic(&self) -> u8 {
        match self.resolve_profile() {
            Ok(Some(profile)) => profile.swizzle_magic,
            _ => self.magic,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            host: self.host.clone(),
            port: self.port,
            source_port: self.source_port,
            timeout: Duration::from_millis(self.timeout_ms),
            magic: self.swizzle_magic(),
        }
    }
}

/// Panel port settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    pub port: u16,
    pub source_port: u16,
    pub timeout_ms: u64,
    /// Send a lone ACK byte on first connect
    pub handshake: bool,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PANEL_PORT,
            source_port: DEFAULT_PANEL_SOURCE_PORT,
            timeout_ms: 2000,
            handshake: true,
        }
    }
}

impl PanelSettings {
    /// Panel configuration for the given controller
    pub fn panel_config(&self, host: &str) -> PanelConfig {
        PanelConfig {
            host: host.to_string(),
            port: self.port,
            source_port: self.source_port,
            timeout: Duration::from_millis(self.timeout_ms),
            handshake: self.handshake,
        }
    }
}

/// Readiness polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    pub stable_polls: u32,
    pub max_attempts: u32,
    pub poll_delay_ms: u64,
    pub pos_tolerance_mm: f64,
    pub read_positions: bool,
    pub read_z: bool,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        let policy = ReadinessPolicy::default();
        Self {
            stable_polls: policy.stable_polls,
            max_attempts: policy.max_attempts,
            poll_delay_ms: policy.poll_delay.as_millis() as u64,
            pos_tolerance_mm: policy.pos_tolerance_mm,
            read_positions: policy.read_positions,
            read_z: policy.read_z,
        }
    }
}

impl ReadinessSettings {
    /// Policy for interactive commands
    pub fn policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            require_busy_transition: false,
            stable_polls: self.stable_polls,
            min_stable: Duration::ZERO,
            max_attempts: self.max_attempts,
            poll_delay: Duration::from_millis(self.poll_delay_ms),
            pos_tolerance_mm: self.pos_tolerance_mm,
            read_positions: self.read_positions,
            read_z: self.read_z,
        }
    }
}

/// RD job defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub air_assist: bool,
    /// Relative moves allowed between absolute ones
    pub force_absolute_every: usize,
    /// Keep a copy of every uploaded job here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_rd_dir: Option<PathBuf>,
    /// Run cuts as travel with the laser off
    pub movement_only: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        let laser = LaserConfig::default();
        Self {
            air_assist: laser.air_assist,
            force_absolute_every: laser.force_absolute_every,
            save_rd_dir: None,
            movement_only: false,
        }
    }
}

/// Motion preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    pub z_speed_mm_s: f64,
    /// Positive Z raises the bed towards the head
    pub z_positive_moves_bed_up: bool,
    /// Idle time required before a job counts as finished
    pub min_stable_ms: u64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            z_speed_mm_s: 5.0,
            z_positive_moves_bed_up: true,
            min_stable_ms: 0,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub panel: PanelSettings,
    pub readiness: ReadinessSettings,
    pub job: JobSettings,
    pub motion: MotionSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("none").to_string()).into()),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config location, `<config dir>/ruidakit/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("ruidakit").join("config.toml"))
            .ok_or_else(|| SettingsError::ConfigDirectory("no config directory on this platform".into()))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;
        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!("No config at {}; using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.host.trim().is_empty() {
            return Err(SettingsError::invalid("connection.host", "must not be empty"));
        }
        if self.connection.timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.timeout_ms", "must be > 0"));
        }
        if self.connection.port == 0 || self.connection.source_port == 0 {
            return Err(SettingsError::invalid("connection.port", "ports must be nonzero"));
        }
        if let Some(profile) = self.connection.resolve_profile()? {
            debug!("Using Ruida profile {}", profile.name);
        }
        if self.panel.timeout_ms == 0 {
            return Err(SettingsError::invalid("panel.timeout_ms", "must be > 0"));
        }
        if self.panel.port == 0 || self.panel.source_port == 0 {
            return Err(SettingsError::invalid("panel.port", "ports must be nonzero"));
        }
        if self.readiness.stable_polls == 0 {
            return Err(SettingsError::invalid("readiness.stable_polls", "must be at least 1"));
        }
        if self.readiness.max_attempts == 0 {
            return Err(SettingsError::invalid("readiness.max_attempts", "must be at least 1"));
        }
        if self.readiness.pos_tolerance_mm < 0.0 {
            return Err(ConfigError::ValueOutOfRange {
                key: "readiness.pos_tolerance_mm".to_string(),
                value: self.readiness.pos_tolerance_mm.to_string(),
            }
            .into());
        }
        if self.motion.z_speed_mm_s <= 0.0 {
            return Err(SettingsError::invalid("motion.z_speed_mm_s", "must be > 0"));
        }
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        self.connection.transport_config()
    }

    pub fn panel_config(&self) -> PanelConfig {
        self.panel.panel_config(&self.connection.host)
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        self.readiness.policy()
    }

    pub fn laser_config(&self) -> LaserConfig {
        LaserConfig {
            movement_only: self.job.movement_only,
            air_assist: self.job.air_assist,
            save_rd_dir: self.job.save_rd_dir.clone(),
            force_absolute_every: self.job.force_absolute_every,
            z_speed_mm_s: self.motion.z_speed_mm_s,
            z_positive_moves_bed_up: self.motion.z_positive_moves_bed_up,
            min_stable: Duration::from_millis(self.motion.min_stable_ms),
            readiness: self.readiness_policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_components() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transport_config(), TransportConfig::default());
        assert_eq!(config.panel_config(), PanelConfig::default());
        assert_eq!(config.readiness_policy(), ReadinessPolicy::default());
        assert_eq!(config.laser_config(), LaserConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.connection.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.readiness.stable_polls = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("readiness.stable_polls"));

        let mut config = Config::default();
        config.panel.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.readiness.pos_tolerance_mm = -1.0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::Config(ConfigError::ValueOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_profile_selects_swizzle_key() {
        let mut config = Config::default();
        config.connection.magic = 0x11;
        assert_eq!(config.transport_config().magic, 0x11);

        config.connection.profile = Some("RDC6442G".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.swizzle_magic(), 0x88);
        assert_eq!(config.transport_config().magic, 0x88);

        config.connection.profile = Some("rdc9999".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connection.profile"));
        assert!(err.to_string().contains("rdc9999"));
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let err = Config::default()
            .save_to_file(Path::new("config.yaml"))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Config(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("[connection]\nhost = \"10.0.0.7\"\n").unwrap();
        assert_eq!(config.connection.host, "10.0.0.7");
        assert_eq!(config.connection.port, 50200);
        assert_eq!(config.panel, PanelSettings::default());
    }
}
