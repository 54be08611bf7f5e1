//! Configuration system for the rootless daemon
//!
//! Loads configuration from TOML file at `~/.config/rootless/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub redisplay: RedisplayConfig,
    pub event_queue: EventQueueConfig,
    pub screen: ScreenConfig,
    pub input: InputConfig,
    pub dri: DriConfig,
    pub resize: ResizeConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .context("Failed to read config file")?;

        let config = Self::from_toml_str(&content)
            .context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parse a configuration document; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("rootless");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    pub fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Deferred redisplay timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisplayConfig {
    /// Delay between the first damage and the flush, in milliseconds
    pub delay_ms: u64,
    /// Upper bound on the time between flushes while damage keeps coming
    pub max_delay_ms: u64,
}

impl Default for RedisplayConfig {
    fn default() -> Self {
        Self {
            delay_ms: 10,
            max_delay_ms: 60,
        }
    }
}

/// Native-to-server event queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventQueueConfig {
    /// Ring slots; one stays free
    pub capacity: usize,
    /// Collapse consecutive pointer motion into one event
    pub coalesce_motion: bool,
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            coalesce_motion: true,
        }
    }
}

/// Protocol screen geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Native coordinates of the protocol screen origin
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: u32,
    pub height: u32,
    /// 8, 15 or 24
    pub depth: u8,
    /// Start with the root window shown
    pub rooted: bool,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            origin_x: 0,
            origin_y: 0,
            width: 1280,
            height: 800,
            depth: 24,
            rooted: false,
        }
    }
}

/// Pointer emulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Emulate buttons 2 and 3 with modifier clicks
    pub fake_buttons: bool,
    /// Modifier list held for button 2, e.g. "option" or "command+shift"
    pub fake_button2: String,
    pub fake_button3: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            fake_buttons: false,
            fake_button2: "option".to_string(),
            fake_button3: "command".to_string(),
        }
    }
}

/// Accelerated surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriConfig {
    pub enabled: bool,
}

impl Default for DriConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeConfig {
    /// Copy only the cut-off strip when one dimension of a north-west
    /// anchored window shrinks
    pub preserve_partial_strips: bool,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            preserve_partial_strips: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(text.contains("[redisplay]"));
        assert!(text.contains("capacity = 256"));
        assert_eq!(Config::from_toml_str(&text).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let config = Config::from_toml_str(
            r#"
            [redisplay]
            delay_ms = 5

            [input]
            fake_buttons = true
            fake_button3 = "control+option"
            "#,
        )
        .unwrap();
        assert_eq!(config.redisplay.delay_ms, 5);
        assert_eq!(config.redisplay.max_delay_ms, 60);
        assert!(config.input.fake_buttons);
        assert_eq!(config.input.fake_button2, "option");
        assert_eq!(config.input.fake_button3, "control+option");
        assert_eq!(config.event_queue, EventQueueConfig::default());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(Config::from_toml_str("[screen]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn test_save_default_writes_loadable_file() {
        let dir = std::env::temp_dir().join(format!("rootless-config-test-{}", std::process::id()));
        let path = dir.join("nested").join("config.toml");
        Config::save_default(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(Config::from_toml_str(&content).unwrap(), Config::default());
        fs::remove_dir_all(&dir).unwrap();
    }
}
