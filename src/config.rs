//! Application configuration
//!
//! Stored as TOML under the user's config directory
//! (`<config_dir>/robomaster-control/config.toml`). Every section has
//! defaults, so a missing file or missing keys never block startup; a file
//! that exists but does not parse does.

use crate::actuator::mqtt_link::{MqttLinkConfig, MIN_KEEP_ALIVE_SECS};
use crate::actuator::ControlMode;
use crate::control_loop::SinkFailurePolicy;
use crate::controller::gamepad::GamepadSettings;
use crate::controller::input::ButtonType;
use crate::controller::sampler::{SamplerSettings, DEFAULT_GIMBAL_CLAMP};
use crate::throttle::{ChangeDetection, ThrottleSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const CONFIG_DIR_NAME: &str = "robomaster-control";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No user config directory available on this platform")]
    NoConfigDir,
}

/// Frame loop and throttling settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub frame_rate_hz: u32,
    pub keep_alive_ms: u64,
    pub mode: ControlMode,
    pub change_detection: ChangeDetection,
    pub sink_failure: SinkFailurePolicy,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60,
            keep_alive_ms: 900,
            mode: ControlMode::Fpv,
            change_detection: ChangeDetection::Exact,
            sink_failure: SinkFailurePolicy::Abort,
        }
    }
}

impl ControlConfig {
    pub fn throttle_settings(&self) -> ThrottleSettings {
        ThrottleSettings {
            keep_alive: Duration::from_millis(self.keep_alive_ms),
            change_detection: self.change_detection,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }
}

/// Input device and sampling settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub gimbal_clamp: f32,
    pub gimbal_axis_scale: f32,
    pub joystick_deadzone: f32,
    pub invert_y: bool,
    pub exit_button: ButtonType,
    pub start_stop_button: ButtonType,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            gimbal_clamp: DEFAULT_GIMBAL_CLAMP,
            gimbal_axis_scale: 100.0,
            joystick_deadzone: 0.05,
            invert_y: true,
            exit_button: ButtonType::Select,
            start_stop_button: ButtonType::Start,
        }
    }
}

impl InputConfig {
    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            gimbal_clamp: self.gimbal_clamp,
        }
    }

    pub fn gamepad_settings(&self) -> GamepadSettings {
        GamepadSettings {
            joystick_deadzone: self.joystick_deadzone,
            gimbal_axis_scale: self.gimbal_axis_scale,
            invert_y: self.invert_y,
            exit_button: self.exit_button,
            start_stop_button: self.start_stop_button,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub control: ControlConfig,
    pub input: InputConfig,
    /// Actuator link; without one only the dry-run actuator is available
    pub link: Option<MqttLinkConfig>,
}

impl AppConfig {
    /// `<config_dir>/robomaster-control/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Loads `path`, writing and returning the defaults if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }

        info!("No config at {}, writing defaults", path.display());
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, self.to_toml()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.frame_rate_hz == 0 {
            return Err(ConfigError::Invalid(
                "control.frame_rate_hz must be at least 1".to_string(),
            ));
        }
        if self.control.keep_alive_ms == 0 {
            return Err(ConfigError::Invalid(
                "control.keep_alive_ms must be at least 1".to_string(),
            ));
        }
        if let ChangeDetection::Tolerance(epsilon) = self.control.change_detection {
            if !epsilon.is_finite() || epsilon < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "control.change_detection tolerance must be a non-negative number, got {}",
                    epsilon
                )));
            }
        }
        if !self.input.gimbal_clamp.is_finite() || self.input.gimbal_clamp < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "input.gimbal_clamp must be a non-negative number, got {}",
                self.input.gimbal_clamp
            )));
        }
        if !(0.0..1.0).contains(&self.input.joystick_deadzone) {
            return Err(ConfigError::Invalid(format!(
                "input.joystick_deadzone must be in [0, 1), got {}",
                self.input.joystick_deadzone
            )));
        }
        if let Some(link) = &self.link {
            if link.topic.is_empty() {
                return Err(ConfigError::Invalid("link.topic must not be empty".to_string()));
            }
            if link.topic.contains(['+', '#']) {
                return Err(ConfigError::Invalid(format!(
                    "link.topic must not contain wildcards, got '{}'",
                    link.topic
                )));
            }
            if link.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
                return Err(ConfigError::Invalid(format!(
                    "link.keep_alive_secs must be at least {}",
                    MIN_KEEP_ALIVE_SECS
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = AppConfig::from_toml("").expect("empty config is valid");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.control.keep_alive_ms, 900);
        assert_eq!(config.control.frame_rate_hz, 60);
        assert!(config.link.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [control]
            keep_alive_ms = 500
            change_detection = { tolerance = 0.02 }
            sink_failure = "log_and_continue"

            [input]
            exit_button = "Guide"

            [link]
            host = "192.168.2.1"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.control.keep_alive_ms, 500);
        assert_eq!(config.control.frame_rate_hz, 60);
        assert_eq!(
            config.control.change_detection,
            ChangeDetection::Tolerance(0.02)
        );
        assert_eq!(config.control.sink_failure, SinkFailurePolicy::LogAndContinue);
        assert_eq!(config.input.exit_button, ButtonType::Guide);
        assert_eq!(config.input.start_stop_button, ButtonType::Start);

        let link = config.link.expect("link section present");
        assert_eq!(link.host, "192.168.2.1");
        assert_eq!(link.port, 1883);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            AppConfig::from_toml("[control]\nframe_rate_hz = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[input]\ngimbal_clamp = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[input]\njoystick_deadzone = 1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[link]\nkeep_alive_secs = 1"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[link]\ntopic = \"robomaster/#\""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        assert!(matches!(
            AppConfig::from_toml("[control\nframe_rate_hz = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let created = AppConfig::load_or_create(&path).expect("defaults written");
        assert!(path.exists());

        let reloaded = AppConfig::load(&path).expect("written file parses");
        assert_eq!(created, reloaded);
    }

    #[test]
    fn test_derived_settings() {
        let config = AppConfig::default();
        let throttle = config.control.throttle_settings();
        assert_eq!(throttle.keep_alive, Duration::from_millis(900));
        assert_eq!(config.input.sampler_settings().gimbal_clamp, 100.0);

        let interval = config.control.frame_interval();
        assert!(interval > Duration::from_millis(16) && interval < Duration::from_millis(17));
    }
}
