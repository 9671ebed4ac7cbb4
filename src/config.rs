//! Configuration file support for the canvas engine.
//!
//! The configuration carries the tunables of the drawing engine (stamp
//! spacing, zoom limits, history depth, default brush) and the log level.
//! It is serialized as versioned JSON so front ends can persist it.

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::stroke::BrushStyle;

/// Log level setting for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Distance between brush stamps on sketch layers
    #[serde(default = "default_stamp_spacing")]
    pub stamp_spacing: f32,

    /// Lower scale bound for stepped zoom
    #[serde(default = "default_min_scale")]
    pub min_scale: f32,

    /// Upper scale bound for any zoom
    #[serde(default = "default_max_scale")]
    pub max_scale: f32,

    /// Multiplier per zoom step
    #[serde(default = "default_zoom_factor")]
    pub zoom_factor: f32,

    /// Maximum snapshots kept per history topic
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Dimension grid for the selection box and exports
    #[serde(default = "default_grid")]
    pub grid: u32,

    /// Brush used when a session starts
    #[serde(default)]
    pub brush: BrushStyle,

    /// Invert the exported inpainting mask
    #[serde(default)]
    pub invert_mask: bool,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_stamp_spacing() -> f32 {
    constants::STAMP_SPACING
}

fn default_min_scale() -> f32 {
    constants::MIN_SCALE
}

fn default_max_scale() -> f32 {
    constants::MAX_SCALE
}

fn default_zoom_factor() -> f32 {
    constants::ZOOM_FACTOR
}

fn default_max_history() -> usize {
    constants::MAX_HISTORY
}

fn default_grid() -> u32 {
    constants::GRID
}

impl EditorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            stamp_spacing: default_stamp_spacing(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            zoom_factor: default_zoom_factor(),
            max_history: default_max_history(),
            grid: default_grid(),
            brush: BrushStyle::default(),
            invert_mask: false,
            log_level: LogLevel::default(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    ///
    /// Out-of-range tunables are clamped to usable values rather than rejected.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config.sanitized())
    }

    /// Clamp tunables so the engine never divides by zero or loops forever.
    pub fn sanitized(mut self) -> Self {
        if !(self.stamp_spacing > 0.0) {
            log::warn!(
                "Invalid stamp spacing {}, using {}",
                self.stamp_spacing,
                constants::STAMP_SPACING
            );
            self.stamp_spacing = constants::STAMP_SPACING;
        }
        if !(self.min_scale > 0.0) {
            self.min_scale = constants::MIN_SCALE;
        }
        if !(self.max_scale >= self.min_scale) {
            self.max_scale = self.min_scale.max(constants::MAX_SCALE);
        }
        if !(self.zoom_factor > 1.0) {
            self.zoom_factor = constants::ZOOM_FACTOR;
        }
        self.grid = self.grid.max(1);
        self.max_history = self.max_history.max(1);
        self
    }

    /// Get the default filename for config export.
    pub fn default_filename() -> &'static str {
        "inpaint-canvas.json"
    }

    /// Get the default config file path for auto-load/save.
    pub fn default_path() -> Option<std::path::PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("inpaint-canvas").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("inpaint-canvas")
                    .join(Self::default_filename())
            })
        }
    }

    /// Load configuration from a file path.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match Self::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to load config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save configuration to a file path, creating parent directories.
    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = self.to_json()?;
        std::fs::write(path, json)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
