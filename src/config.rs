//! Configuration using Figment
//!
//! Configuration is layered, highest precedence last:
//! 1. built-in defaults
//! 2. a TOML file (`config/default.toml` unless another path is given)
//! 3. environment variables prefixed with `FBGS_`, nested with `__`
//!
//! # Environment Variable Overrides
//!
//! ```text
//! FBGS_CONNECTION__HOST=10.0.0.5
//! FBGS_CONNECTION__PORT=5001
//! FBGS_ACQUISITION__FREQUENCY_HZ=200
//! FBGS_APPLICATION__LOG_LEVEL=debug
//! ```

use crate::acquisition::{capacity_for, HistoryBuffer, PollingPolicy, MAX_HISTORY_CAPACITY};
use crate::core::Schema;
use crate::error::{AppResult, CalibrationError, ConfigError};
use crate::geometry::calibration::{radius_from_micrometers, read_core_radius};
use crate::geometry::StrainInverter;
use crate::logging::LogFormat;
use crate::protocol::framing::DEFAULT_MAX_FRAME_LEN;
use crate::protocol::SampleDecoder;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FbgsConfig {
    /// Logging settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Interrogator endpoint
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Session timing
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Fiber geometry for the multicore schema
    #[serde(default)]
    pub multicore: MulticoreConfig,
    /// Output files
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Interrogator endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Wire schema of the connected interrogator
    #[serde(default = "default_schema")]
    pub schema: Schema,
    /// Interrogator host name or address
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port; defaults to the schema's port when unset
    #[serde(default)]
    pub port: Option<u16>,
    /// TCP connect timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Largest accepted frame payload in bytes
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

/// Recording parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Interrogator output rate (Hz)
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,
    /// Recording length (s)
    #[serde(default = "default_recording_time")]
    pub recording_time_s: f64,
    /// Sleep between availability polls when idle
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Operator countdown before the start gate opens (s)
    #[serde(default = "default_countdown")]
    pub countdown_s: u64,
}

/// Multicore fiber geometry. One radius source is required for that schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MulticoreConfig {
    /// Vendor calibration file holding the core radius on line 12
    #[serde(default)]
    pub calibration_file: Option<PathBuf>,
    /// Core radius in micrometers; takes precedence over the calibration file
    #[serde(default)]
    pub core_radius_um: Option<f64>,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Output directory for data files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// File stem shared by the YAML header and CSV matrix
    #[serde(default = "default_file_stem")]
    pub file_stem: String,
    /// Free text stored in the YAML header
    #[serde(default)]
    pub notes: String,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_schema() -> Schema {
    Schema::ShapeSensing
}

fn default_host() -> String {
    "192.168.1.11".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

fn default_frequency() -> f64 {
    100.0
}

fn default_recording_time() -> f64 {
    6.0
}

fn default_poll_interval() -> u64 {
    1
}

fn default_countdown() -> u64 {
    3
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_file_stem() -> String {
    "fbgs_recording".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            host: default_host(),
            port: None,
            connect_timeout_ms: default_connect_timeout(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frequency_hz: default_frequency(),
            recording_time_s: default_recording_time(),
            poll_interval_ms: default_poll_interval(),
            countdown_s: default_countdown(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_stem: default_file_stem(),
            notes: String::new(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl FbgsConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment, then validate.
    ///
    /// A missing file leaves the defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(FbgsConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("FBGS_").split("__"))
    }

    /// Check the loaded values describe a usable session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let acquisition = &self.acquisition;
        if !(acquisition.frequency_hz.is_finite() && acquisition.frequency_hz > 0.0) {
            return Err(ConfigError::Validation(format!(
                "frequency_hz must be positive, got {}",
                acquisition.frequency_hz
            )));
        }
        if !(acquisition.recording_time_s.is_finite() && acquisition.recording_time_s > 0.0) {
            return Err(ConfigError::Validation(format!(
                "recording_time_s must be positive, got {}",
                acquisition.recording_time_s
            )));
        }
        if self.capacity()? == 0 {
            return Err(ConfigError::Validation(format!(
                "recording_time_s * frequency_hz rounds to zero samples ({} s at {} Hz)",
                acquisition.recording_time_s, acquisition.frequency_hz
            )));
        }
        if acquisition.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }

        if self.connection.host.is_empty() {
            return Err(ConfigError::Validation("host cannot be empty".to_string()));
        }
        if self.connection.max_frame_len == 0 {
            return Err(ConfigError::Validation(
                "max_frame_len must be positive".to_string(),
            ));
        }

        if self.connection.schema == Schema::MulticoreFiber
            && self.multicore.calibration_file.is_none()
            && self.multicore.core_radius_um.is_none()
        {
            return Err(ConfigError::Validation(
                "multicore_fiber schema requires multicore.calibration_file or multicore.core_radius_um"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Port to connect to, falling back to the schema's default.
    pub fn port(&self) -> u16 {
        self.connection
            .port
            .unwrap_or_else(|| self.connection.schema.default_port())
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.connect_timeout_ms)
    }

    /// History capacity in samples.
    pub fn capacity(&self) -> Result<usize, ConfigError> {
        let acquisition = &self.acquisition;
        capacity_for(acquisition.recording_time_s, acquisition.frequency_hz).ok_or_else(|| {
            ConfigError::Validation(format!(
                "recording_time_s * frequency_hz must be at most {MAX_HISTORY_CAPACITY} samples ({} s at {} Hz)",
                acquisition.recording_time_s, acquisition.frequency_hz
            ))
        })
    }

    /// Empty history sized for the configured session.
    pub fn history(&self) -> Result<HistoryBuffer, ConfigError> {
        self.capacity().map(HistoryBuffer::with_capacity)
    }

    /// Idle polling policy for the acquisition loop.
    pub fn polling(&self) -> PollingPolicy {
        PollingPolicy {
            interval: Duration::from_millis(self.acquisition.poll_interval_ms),
        }
    }

    /// Effective core radius (m) for the multicore schema.
    pub fn core_radius(&self) -> Result<f64, CalibrationError> {
        match (&self.multicore.core_radius_um, &self.multicore.calibration_file) {
            (Some(um), _) => radius_from_micrometers(*um),
            (None, Some(path)) => read_core_radius(path),
            (None, None) => Err(CalibrationError::InvalidRadius { value: 0.0 }),
        }
    }

    /// Decoder for the configured schema.
    pub fn decoder(&self) -> AppResult<SampleDecoder> {
        Ok(match self.connection.schema {
            Schema::ShapeSensing => SampleDecoder::shape_sensing(),
            Schema::MulticoreFiber => SampleDecoder::multicore(StrainInverter::new(self.core_radius()?)),
        })
    }
}
