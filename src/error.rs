//! Custom error types for the application.
//!
//! This module defines the primary error type, `FbgsError`, together with the
//! narrower error enums produced by each layer of the acquisition pipeline.
//! Using the `thiserror` crate, it provides a centralized and consistent way to
//! handle everything from socket failures to malformed interrogator output.
//!
//! ## Error Hierarchy
//!
//! - **`FramingError`**: The byte stream closed or misbehaved while a frame was
//!   being read. Fatal to the acquisition session because the wire format has
//!   no boundary marker to resynchronize on.
//! - **`SampleParseError`**: A fully buffered payload did not match the
//!   positional schema. Recovered locally: the sample is dropped and the next
//!   frame is decoded from a clean boundary.
//! - **`InversionError`**: Neither twist root yields a finite solution at a
//!   grating point. The point is zero-filled and flagged; the sample survives.
//! - **`CalibrationError`**: The vendor calibration file could not supply a
//!   core radius.
//! - **`ExportError`**: The recorded history cannot be flattened into a single
//!   column-major matrix.
//! - **`ConfigError`**: The layered configuration failed to load or describes
//!   an unusable setup.
//!
//! `FbgsError` wraps all of the above with `#[from]`, so `?` works across the
//! crate, and adds the connection-level failures surfaced at setup time.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, FbgsError>;

/// Top-level error for the acquisition system.
#[derive(Error, Debug)]
pub enum FbgsError {
    /// Loading the layered configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The configuration loaded but describes an unusable setup.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The interrogator could not be reached at setup.
    #[error("Failed to connect to interrogator at {address}: {source}")]
    Connection {
        /// `host:port` that was dialled
        address: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Connecting took longer than the configured timeout.
    #[error("Connection to interrogator at {address} timed out after {timeout_ms} ms")]
    ConnectionTimeout {
        /// `host:port` that was dialled
        address: String,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Frame-level transport failure.
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// Payload did not decode.
    #[error("Sample parse error: {0}")]
    SampleParse(#[from] SampleParseError),

    /// Calibration data unusable.
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    /// Recording could not be exported.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// The acquisition task panicked or was aborted.
    #[error("Acquisition task failed: {0}")]
    TaskFailed(String),

    /// Plain I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for FbgsError {
    fn from(err: figment::Error) -> Self {
        FbgsError::Config(Box::new(err))
    }
}

impl From<ConfigError> for FbgsError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Load(e) => FbgsError::Config(e),
            ConfigError::Validation(msg) => FbgsError::Configuration(msg),
        }
    }
}

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Figment could not read or deserialize a layer.
    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),
    /// Values loaded but describe an unusable session.
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Failures of the length-prefixed framing layer.
#[derive(Error, Debug)]
pub enum FramingError {
    /// The peer closed the stream before a length prefix was complete.
    #[error("Connection closed by interrogator ({buffered} bytes left unread)")]
    ConnectionClosed {
        /// Bytes that were buffered when the close was observed
        buffered: usize,
    },

    /// The length prefix arrived but the payload was cut short.
    #[error("Stream closed mid-frame: expected {expected} payload bytes, received {received}")]
    Truncated {
        /// Declared payload length
        expected: usize,
        /// Bytes actually received before the close
        received: usize,
    },

    /// The length prefix exceeds the configured maximum.
    #[error("Frame length {length} exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Declared payload length
        length: usize,
        /// Configured limit
        max: usize,
    },

    /// Socket read failed.
    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while tokenizing a payload into a [`crate::core::Sample`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleParseError {
    /// The payload ran out of tokens while `field` was expected.
    #[error("Payload ended while reading {field}")]
    UnexpectedEnd {
        /// Field that was being read
        field: &'static str,
    },

    /// A token could not be converted to a number.
    #[error("Invalid value {token:?} for {field}")]
    InvalidNumber {
        /// Field that was being read
        field: &'static str,
        /// Offending token
        token: String,
    },

    /// A curvature block refers to a channel the frame did not contain.
    #[error("Curvature block {sensor} needs channel {channel} but frame has {num_channels} channels")]
    MissingChannel {
        /// Index of the curvature block
        sensor: usize,
        /// Channel index the block would take its point count from
        channel: usize,
        /// Channels present in the frame
        num_channels: usize,
    },

    /// The payload is not valid UTF-8 text.
    #[error("Payload is not valid UTF-8")]
    NotUtf8,
}

/// No self-consistent strain inversion at a grating point.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InversionError {
    /// Neither twist root produced finite bending-angle estimates.
    #[error("No finite twist solution (candidates {twist_candidates:?} rad/m)")]
    NoFiniteSolution {
        /// The two twist magnitudes that were tried
        twist_candidates: [f64; 2],
    },
}

/// Failures reading the effective core radius.
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// The calibration file could not be opened or read.
    #[error("Cannot read calibration file {path}: {source}")]
    Read {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file has fewer lines than expected.
    #[error("Calibration file has {lines} lines, radius expected on line {expected}")]
    MissingLine {
        /// Lines found
        lines: usize,
        /// 1-indexed line holding the radius
        expected: usize,
    },

    /// The radius line does not hold a tab-separated key/value pair.
    #[error("Malformed radius line {line:?}")]
    MalformedLine {
        /// Raw line text
        line: String,
    },

    /// The radius is not a positive finite number.
    #[error("Invalid core radius {value} m")]
    InvalidRadius {
        /// Parsed radius in meters
        value: f64,
    },
}

/// Failures flattening a recording into the column-major export matrix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    /// A sample does not match the row layout fixed by the first sample.
    #[error("Sample {sample_number} has {actual} rows, layout expects {expected}")]
    InconsistentLayout {
        /// Offending sample
        sample_number: i64,
        /// Rows required by the layout
        expected: usize,
        /// Rows this sample would produce
        actual: usize,
    },
}
