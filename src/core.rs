//! Core data types for FBGS acquisition.
//!
//! A [`Sample`] is the fully decoded content of one frame. It carries the raw
//! per-channel peak data and, depending on the interrogator variant, either the
//! shape reconstructed by the interrogator itself ([`ShapeSensor`]) or the
//! per-grating curvature/twist inverted from multicore strain
//! ([`MulticoreSensor`]).
//!
//! # Data Flow
//!
//! ```text
//! bytes --[FrameReader]--> payload --[SampleDecoder]--> Sample --> HistoryBuffer
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of channels that make up one physical sensor.
pub const CHANNELS_PER_SENSOR: usize = 4;

/// Conversion from the wire's 1/cm curvature to 1/m.
pub const KAPPA_SCALE: f64 = 100.0;

/// Conversion from the wire's cm shape coordinates to m.
pub const SHAPE_SCALE: f64 = 0.01;

/// Arc length between consecutive shape points (1 mm resolution, starting at 0).
pub const ARC_LENGTH_STEP: f64 = 0.001;

/// Hardware family of the interrogator, selected once at configuration time.
///
/// The wire format carries no version marker, so the schema must match the
/// connected hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    /// Interrogator that reconstructs curvature and 3-D shape on-device.
    ShapeSensing,
    /// Interrogator that reports raw per-core strain (engineered values).
    MulticoreFiber,
}

impl Schema {
    /// Default TCP port the interrogator serves this schema on.
    pub fn default_port(self) -> u16 {
        match self {
            Schema::ShapeSensing => 5001,
            Schema::MulticoreFiber => 2055,
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::ShapeSensing => write!(f, "shape_sensing"),
            Schema::MulticoreFiber => write!(f, "multicore_fiber"),
        }
    }
}

/// One optical core's measurement series across all of its gratings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel number as reported by the interrogator
    pub channel_number: i32,
    /// Four vendor error-status flags
    pub error_status: [i32; 4],
    /// Peak wavelength per grating (nm)
    pub peak_wavelengths: Vec<f64>,
    /// Peak power per grating
    pub peak_powers: Vec<f64>,
    /// Strain per grating in micro-strain (multicore variant only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strains: Option<Vec<f64>>,
}

impl Channel {
    /// Number of gratings on this channel.
    pub fn num_gratings(&self) -> usize {
        self.peak_wavelengths.len()
    }
}

/// Curvature and shape reconstructed by a shape-sensing interrogator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeSensor {
    /// Curvature magnitude per point (1/m)
    pub kappa: Vec<f64>,
    /// Curvature angle per point (rad)
    pub phi: Vec<f64>,
    /// Shape points `[x, y, z]` in meters
    pub shape: Vec<[f64; 3]>,
    /// Arc length of each shape point in meters
    pub arc_length: Vec<f64>,
}

impl ShapeSensor {
    /// Number of curvature points.
    pub fn num_curv_points(&self) -> usize {
        self.kappa.len()
    }

    /// Number of reconstructed shape points.
    pub fn num_shape_points(&self) -> usize {
        self.shape.len()
    }
}

/// Inverted geometry at one grating point of a multicore fiber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CurvatureStrain {
    /// Twist rate of the cross-section (rad/m)
    pub twist: f64,
    /// Curvature about the y axis (1/m)
    pub kappa_y: f64,
    /// Curvature about the z axis (1/m)
    pub kappa_z: f64,
    /// Axial stretch ratio
    pub elongation: f64,
}

impl CurvatureStrain {
    /// Six-component strain row `(twist, kappa_y, kappa_z, elongation, 0, 0)`.
    pub fn as_row(&self) -> [f64; 6] {
        [
            self.twist,
            self.kappa_y,
            self.kappa_z,
            self.elongation,
            0.0,
            0.0,
        ]
    }
}

/// Per-grating geometry of a multicore fiber built from one channel quadruple.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MulticoreSensor {
    /// One entry per grating point
    pub curvature_strains: Vec<CurvatureStrain>,
    /// Grating indices whose inversion is unreliable: either the bending
    /// estimates disagreed (entry holds the approximate solution) or no finite
    /// solution existed (entry is zero)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_points: Vec<usize>,
}

impl MulticoreSensor {
    /// Number of curvature points (one per grating).
    pub fn num_curv_points(&self) -> usize {
        self.curvature_strains.len()
    }
}

/// A physical sensor, in whichever form the schema provides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sensor {
    /// Interrogator-reconstructed shape
    Shape(ShapeSensor),
    /// Strain-inverted multicore geometry
    Multicore(MulticoreSensor),
}

impl Sensor {
    /// Number of curvature points along the sensor.
    pub fn num_curv_points(&self) -> usize {
        match self {
            Sensor::Shape(s) => s.num_curv_points(),
            Sensor::Multicore(m) => m.num_curv_points(),
        }
    }

    /// Number of points this sensor contributes to each export block.
    pub fn num_export_points(&self) -> usize {
        match self {
            Sensor::Shape(s) => s.num_shape_points(),
            Sensor::Multicore(m) => m.num_curv_points(),
        }
    }
}

/// The fully decoded content of one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Interrogator sample counter (monotonic, may skip)
    pub sample_number: i64,
    /// Instant the frame was captured on this host
    pub time_stamp: DateTime<Utc>,
    /// Channels in wire order
    pub channels: Vec<Channel>,
    /// Sensors derived from the channels
    pub sensors: Vec<Sensor>,
}

impl Sample {
    /// Number of channels in the frame.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of sensors derived for this sample.
    pub fn num_sensors(&self) -> usize {
        self.sensors.len()
    }

    /// Total grating count over all channels (the wire's engineered-value count).
    pub fn total_gratings(&self) -> usize {
        self.channels.iter().map(Channel::num_gratings).sum()
    }
}

/// Number of sensors a channel set can form.
///
/// Four channels with equal grating counts form one sensor; eight channels
/// whose first and last quadruples are each internally equal form two. Any
/// other layout forms none.
pub fn sensor_count(channels: &[Channel]) -> usize {
    let quad_consistent = |quad: &[Channel]| {
        let n = quad[0].num_gratings();
        quad.iter().all(|c| c.num_gratings() == n)
    };

    match channels.len() {
        4 if quad_consistent(channels) => 1,
        8 if channels.chunks(CHANNELS_PER_SENSOR).all(quad_consistent) => 2,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(num: i32, gratings: usize) -> Channel {
        Channel {
            channel_number: num,
            error_status: [0; 4],
            peak_wavelengths: vec![1550.0; gratings],
            peak_powers: vec![1.0; gratings],
            strains: None,
        }
    }

    #[test]
    fn test_sensor_count_single_quadruple() {
        let channels: Vec<_> = (1..=4).map(|n| channel(n, 5)).collect();
        assert_eq!(sensor_count(&channels), 1);
    }

    #[test]
    fn test_sensor_count_two_quadruples() {
        let mut channels: Vec<_> = (1..=4).map(|n| channel(n, 5)).collect();
        channels.extend((5..=8).map(|n| channel(n, 7)));
        assert_eq!(sensor_count(&channels), 2);
    }

    #[test]
    fn test_sensor_count_rejects_other_layouts() {
        let three: Vec<_> = (1..=3).map(|n| channel(n, 5)).collect();
        assert_eq!(sensor_count(&three), 0);

        let mut mismatched: Vec<_> = (1..=4).map(|n| channel(n, 5)).collect();
        mismatched[2] = channel(3, 6);
        assert_eq!(sensor_count(&mismatched), 0);

        let mut eight: Vec<_> = (1..=8).map(|n| channel(n, 5)).collect();
        eight[6] = channel(7, 4);
        assert_eq!(sensor_count(&eight), 0);

        assert_eq!(sensor_count(&[]), 0);
    }

    #[test]
    fn test_curvature_strain_row_padding() {
        let cs = CurvatureStrain {
            twist: 0.5,
            kappa_y: 1.0,
            kappa_z: -2.0,
            elongation: 1.0001,
        };
        assert_eq!(cs.as_row(), [0.5, 1.0, -2.0, 1.0001, 0.0, 0.0]);
    }

    #[test]
    fn test_sensor_curvature_points() {
        let shape = Sensor::Shape(ShapeSensor {
            kappa: vec![1.0; 3],
            phi: vec![0.0; 3],
            shape: vec![[0.0; 3]; 10],
            arc_length: vec![0.0; 10],
        });
        assert_eq!(shape.num_curv_points(), 3);

        let multicore = Sensor::Multicore(MulticoreSensor {
            curvature_strains: vec![CurvatureStrain::default(); 5],
            invalid_points: vec![4],
        });
        assert_eq!(multicore.num_curv_points(), 5);
    }

    #[test]
    fn test_schema_default_ports() {
        assert_eq!(Schema::ShapeSensing.default_port(), 5001);
        assert_eq!(Schema::MulticoreFiber.default_port(), 2055);
        assert_eq!(Schema::MulticoreFiber.to_string(), "multicore_fiber");
    }
}
