//! Stack configuration
//!
//! Controls how many slots a slice stack allocates and how large each
//! off-screen slot surface may grow. Values can come from code, from
//! environment variables, or from a small TOML file.

use std::path::{Path, PathBuf};

/// Sizing policy for slice stacks.
///
/// A stack sizes itself from the renderable's intrinsic data grid when
/// one is available; these values supply the defaults and the upper
/// bounds applied on top of whatever the data asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    /// Slot count used when the renderable reports no data resolution.
    pub default_slot_count: usize,
    /// Hard upper bound on the slot count.
    pub max_slot_count: usize,
    /// Slot surface width used when no in-plane resolution is known.
    pub default_slot_width: u32,
    /// Slot surface height used when no in-plane resolution is known.
    pub default_slot_height: u32,
    /// Hard upper bound on slot surface width.
    pub max_slot_width: u32,
    /// Hard upper bound on slot surface height.
    pub max_slot_height: u32,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            default_slot_count: 64,   // slices when the data has no depth axis
            max_slot_count: 256,      // cap on slots per stack
            default_slot_width: 256,  // pixels
            default_slot_height: 256, // pixels
            max_slot_width: 1024,     // pixels
            max_slot_height: 1024,    // pixels
        }
    }
}

impl StackConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the slot count used when the data reports no depth resolution.
    pub fn with_default_slot_count(mut self, count: usize) -> Self {
        self.default_slot_count = count;
        self
    }

    /// Sets the upper bound on the slot count.
    pub fn with_max_slot_count(mut self, count: usize) -> Self {
        self.max_slot_count = count;
        self
    }

    /// Sets the slot surface size used when no in-plane resolution is known.
    pub fn with_slot_size(mut self, width: u32, height: u32) -> Self {
        self.default_slot_width = width;
        self.default_slot_height = height;
        self
    }

    /// Sets the upper bound on slot surface dimensions.
    pub fn with_max_slot_size(mut self, width: u32, height: u32) -> Self {
        self.max_slot_width = width;
        self.max_slot_height = height;
        self
    }

    /// Resolves a slot count request against the defaults and bounds.
    pub fn clamped_slot_count(&self, requested: Option<usize>) -> usize {
        let count = requested.unwrap_or(self.default_slot_count);
        count.clamp(1, self.max_slot_count.max(1))
    }

    /// Resolves a slot surface size request against the defaults and bounds.
    pub fn clamped_slot_size(&self, requested: Option<(u32, u32)>) -> (u32, u32) {
        let (width, height) = requested.unwrap_or((self.default_slot_width, self.default_slot_height));
        (
            width.clamp(1, self.max_slot_width.max(1)),
            height.clamp(1, self.max_slot_height.max(1)),
        )
    }

    /// Returns the default location for the stack config file.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("sliceview").join("stack.toml"))
            .unwrap_or_else(|| PathBuf::from("sliceview-stack.toml"))
    }

    /// Loads configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Recognised variables:
    /// - `SLICEVIEW_DEFAULT_SLOTS`
    /// - `SLICEVIEW_MAX_SLOTS`
    /// - `SLICEVIEW_SLOT_WIDTH`
    /// - `SLICEVIEW_SLOT_HEIGHT`
    /// - `SLICEVIEW_MAX_SLOT_WIDTH`
    /// - `SLICEVIEW_MAX_SLOT_HEIGHT`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SLICEVIEW_DEFAULT_SLOTS") {
            config.default_slot_count = val.parse().map_err(|_| {
                ConfigError::InvalidValue(format!("SLICEVIEW_DEFAULT_SLOTS: {}", val))
            })?;
        }

        if let Ok(val) = std::env::var("SLICEVIEW_MAX_SLOTS") {
            config.max_slot_count = val
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("SLICEVIEW_MAX_SLOTS: {}", val)))?;
        }

        if let Ok(val) = std::env::var("SLICEVIEW_SLOT_WIDTH") {
            config.default_slot_width = val
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("SLICEVIEW_SLOT_WIDTH: {}", val)))?;
        }

        if let Ok(val) = std::env::var("SLICEVIEW_SLOT_HEIGHT") {
            config.default_slot_height = val
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("SLICEVIEW_SLOT_HEIGHT: {}", val)))?;
        }

        if let Ok(val) = std::env::var("SLICEVIEW_MAX_SLOT_WIDTH") {
            config.max_slot_width = val.parse().map_err(|_| {
                ConfigError::InvalidValue(format!("SLICEVIEW_MAX_SLOT_WIDTH: {}", val))
            })?;
        }

        if let Ok(val) = std::env::var("SLICEVIEW_MAX_SLOT_HEIGHT") {
            config.max_slot_height = val.parse().map_err(|_| {
                ConfigError::InvalidValue(format!("SLICEVIEW_MAX_SLOT_HEIGHT: {}", val))
            })?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// Simple line-based parser; unknown keys are ignored so config files
    /// stay forward compatible.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "default_slot_count" => {
                        config.default_slot_count = value.parse().map_err(|_| {
                            ConfigError::InvalidValue(format!("default_slot_count: {}", value))
                        })?;
                    }
                    "max_slot_count" => {
                        config.max_slot_count = value.parse().map_err(|_| {
                            ConfigError::InvalidValue(format!("max_slot_count: {}", value))
                        })?;
                    }
                    "default_slot_width" => {
                        config.default_slot_width = value.parse().map_err(|_| {
                            ConfigError::InvalidValue(format!("default_slot_width: {}", value))
                        })?;
                    }
                    "default_slot_height" => {
                        config.default_slot_height = value.parse().map_err(|_| {
                            ConfigError::InvalidValue(format!("default_slot_height: {}", value))
                        })?;
                    }
                    "max_slot_width" => {
                        config.max_slot_width = value.parse().map_err(|_| {
                            ConfigError::InvalidValue(format!("max_slot_width: {}", value))
                        })?;
                    }
                    "max_slot_height" => {
                        config.max_slot_height = value.parse().map_err(|_| {
                            ConfigError::InvalidValue(format!("max_slot_height: {}", value))
                        })?;
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml())?;
        Ok(())
    }

    /// Serialises configuration to a TOML string.
    pub fn to_toml(&self) -> String {
        format!(
            "# Sliceview stack configuration\n\
             default_slot_count = {}\n\
             max_slot_count = {}\n\
             default_slot_width = {}\n\
             default_slot_height = {}\n\
             max_slot_width = {}\n\
             max_slot_height = {}\n",
            self.default_slot_count,
            self.max_slot_count,
            self.default_slot_width,
            self.default_slot_height,
            self.max_slot_width,
            self.max_slot_height,
        )
    }
}

/// Errors from loading or saving stack configuration.
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
    IoError(std::io::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::IoError(e)
    }
}
