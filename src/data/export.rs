//! Flattening a recording into a column-major matrix plus header.
//!
//! Each sample becomes one column:
//!
//! ```text
//! sample_number
//! time_stamp            (seconds since the Unix epoch)
//! number_of_sensors
//! points[0] .. points[s-1]
//! block[0]  .. block[s-1]
//! ```
//!
//! A shape-sensing block is `arc_length[n], x[n], y[n], z[n]`; a multicore
//! block is `twist[n], kappa_y[n], kappa_z[n], elongation[n]`. The layout is
//! fixed by the first sample.

use crate::acquisition::Recording;
use crate::core::{Sample, Schema, Sensor};
use crate::error::ExportError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const FIXED_ROWS: usize = 3;
const FIELDS_PER_POINT: usize = 4;

/// Dense `rows × cols` matrix stored column by column.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl ColumnMatrix {
    /// Values per sample.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of samples.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Backing storage in column-major order.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Value at `row` of sample `col`.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.data[col * self.rows + row])
    }

    /// All values of sample `col`.
    pub fn column(&self, col: usize) -> Option<&[f64]> {
        (col < self.cols).then(|| &self.data[col * self.rows..(col + 1) * self.rows])
    }

    /// Iterate rows as owned vectors.
    pub fn row_iter(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        (0..self.rows).map(move |r| (0..self.cols).map(|c| self.data[c * self.rows + r]).collect())
    }
}

/// Names of the matrix rows, grouped the way the layout is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataOrder {
    /// Leading per-sample rows
    pub header: Vec<String>,
    /// One point-count row per sensor
    pub number_of_points_per_sensors: Vec<String>,
    /// Per-sensor blocks, each `number_of_datapoints` rows long
    pub sensors_data: Vec<String>,
}

impl DataOrder {
    fn for_schema(schema: Schema) -> Self {
        let sensors_data: &[&str] = match schema {
            Schema::ShapeSensing => &[
                "arc_length_coordinates",
                "x_positions",
                "y_positions",
                "z_positions",
            ],
            Schema::MulticoreFiber => &["twist", "kappa_y", "kappa_z", "elongation"],
        };
        Self {
            header: ["sample_number", "time_stamp", "number_of_sensors"]
                .map(String::from)
                .to_vec(),
            number_of_points_per_sensors: vec!["number_of_datapoints".to_string()],
            sensors_data: sensors_data.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Compact description of an exported recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordingHeader {
    /// Recorded samples (matrix columns)
    pub number_of_snapshots: usize,
    /// Nominal acquisition frequency (Hz)
    pub frequency: f64,
    /// Seconds from loop start to the last sample
    pub duration: f64,
    /// Sensors per sample
    pub number_of_sensors: usize,
    /// Channels per sample
    pub number_of_channels: usize,
    /// Always `"colmajor"`
    pub data_storage: String,
    /// Row layout of the matrix
    pub data_order: DataOrder,
}

/// Seconds since the Unix epoch.
pub fn epoch_seconds(time_stamp: DateTime<Utc>) -> f64 {
    time_stamp.timestamp() as f64 + f64::from(time_stamp.timestamp_subsec_nanos()) * 1e-9
}

fn layout(sample: &Sample) -> Vec<usize> {
    sample.sensors.iter().map(Sensor::num_export_points).collect()
}

fn rows_for(layout: &[usize]) -> usize {
    FIXED_ROWS + layout.len() + FIELDS_PER_POINT * layout.iter().sum::<usize>()
}

fn push_sensor_block(column: &mut Vec<f64>, sensor: &Sensor) {
    match sensor {
        Sensor::Shape(shape) => {
            column.extend(&shape.arc_length);
            for axis in 0..3 {
                column.extend(shape.shape.iter().map(|p| p[axis]));
            }
        }
        Sensor::Multicore(multicore) => {
            let strains = &multicore.curvature_strains;
            column.extend(strains.iter().map(|c| c.twist));
            column.extend(strains.iter().map(|c| c.kappa_y));
            column.extend(strains.iter().map(|c| c.kappa_z));
            column.extend(strains.iter().map(|c| c.elongation));
        }
    }
}

/// Flatten `samples` into the export matrix.
///
/// # Errors
/// [`ExportError::InconsistentLayout`] if a sample's sensors or point counts
/// differ from the first sample's.
pub fn to_column_matrix(samples: &[Sample]) -> Result<ColumnMatrix, ExportError> {
    let expected = samples.first().map(layout).unwrap_or_default();
    let rows = rows_for(&expected);
    let mut data = Vec::with_capacity(rows * samples.len());

    for sample in samples {
        let actual = layout(sample);
        if actual != expected {
            return Err(ExportError::InconsistentLayout {
                sample_number: sample.sample_number,
                expected: rows,
                actual: rows_for(&actual),
            });
        }

        data.push(sample.sample_number as f64);
        data.push(epoch_seconds(sample.time_stamp));
        data.push(sample.num_sensors() as f64);
        data.extend(actual.iter().map(|&n| n as f64));
        for sensor in &sample.sensors {
            push_sensor_block(&mut data, sensor);
        }
    }

    Ok(ColumnMatrix {
        rows,
        cols: samples.len(),
        data,
    })
}

/// Header and matrix for a completed recording.
pub fn export(recording: &Recording) -> Result<(RecordingHeader, ColumnMatrix), ExportError> {
    let matrix = to_column_matrix(&recording.samples)?;
    let first = recording.samples.first();
    let header = RecordingHeader {
        number_of_snapshots: recording.samples.len(),
        frequency: recording.frequency,
        duration: recording.duration(),
        number_of_sensors: first.map_or(0, Sample::num_sensors),
        number_of_channels: first.map_or(0, Sample::num_channels),
        data_storage: "colmajor".to_string(),
        data_order: DataOrder::for_schema(recording.schema),
    };
    Ok((header, matrix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{SessionStats, StopReason};
    use crate::core::{CurvatureStrain, MulticoreSensor, ShapeSensor};
    use chrono::TimeZone;

    fn shape_sample(n: i64, points: usize) -> Sample {
        Sample {
            sample_number: n,
            time_stamp: Utc.timestamp_opt(1_700_000_000 + n, 500_000_000).unwrap(),
            channels: vec![],
            sensors: vec![Sensor::Shape(ShapeSensor {
                kappa: vec![],
                phi: vec![],
                shape: (0..points).map(|j| [j as f64, 10.0 + j as f64, 20.0 + j as f64]).collect(),
                arc_length: (0..points).map(|j| j as f64 * 0.001).collect(),
            })],
        }
    }

    #[test]
    fn test_empty_recording_has_fixed_rows() {
        let matrix = to_column_matrix(&[]).unwrap();
        assert_eq!((matrix.rows(), matrix.cols()), (3, 0));
        assert!(matrix.as_slice().is_empty());
    }

    #[test]
    fn test_shape_column_layout() {
        let matrix = to_column_matrix(&[shape_sample(1, 2), shape_sample(2, 2)]).unwrap();
        assert_eq!(matrix.rows(), 3 + 1 + 4 * 2);
        assert_eq!(matrix.cols(), 2);
        assert_eq!(
            matrix.column(1).unwrap(),
            &[2.0, 1_700_000_002.5, 1.0, 2.0, 0.0, 0.001, 0.0, 1.0, 10.0, 11.0, 20.0, 21.0]
        );
        assert_eq!(matrix.get(0, 0), Some(1.0));
        assert_eq!(matrix.get(12, 0), None);
        assert_eq!(matrix.row_iter().next().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_multicore_block_order() {
        let sample = Sample {
            sample_number: 5,
            time_stamp: Utc.timestamp_opt(0, 0).unwrap(),
            channels: vec![],
            sensors: vec![Sensor::Multicore(MulticoreSensor {
                curvature_strains: vec![
                    CurvatureStrain {
                        twist: 1.0,
                        kappa_y: 2.0,
                        kappa_z: 3.0,
                        elongation: 4.0,
                    },
                    CurvatureStrain::default(),
                ],
                invalid_points: vec![1],
            })],
        };
        let matrix = to_column_matrix(&[sample]).unwrap();
        assert_eq!(
            matrix.column(0).unwrap(),
            &[5.0, 0.0, 1.0, 2.0, 1.0, 0.0, 2.0, 0.0, 3.0, 0.0, 4.0, 0.0]
        );
    }

    #[test]
    fn test_layout_change_is_rejected() {
        let err = to_column_matrix(&[shape_sample(1, 2), shape_sample(2, 3)]).unwrap_err();
        assert_eq!(
            err,
            ExportError::InconsistentLayout {
                sample_number: 2,
                expected: 12,
                actual: 16
            }
        );
    }

    #[test]
    fn test_header_from_recording() {
        let started_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let recording = Recording {
            schema: Schema::ShapeSensing,
            samples: vec![shape_sample(1, 2), shape_sample(2, 2)],
            frequency: 100.0,
            started_at,
            stop_reason: StopReason::CapacityReached,
            stats: SessionStats::default(),
        };

        let (header, matrix) = export(&recording).unwrap();
        assert_eq!(header.number_of_snapshots, 2);
        assert_eq!(header.number_of_sensors, 1);
        assert_eq!(header.number_of_channels, 0);
        assert_eq!(header.duration, 2.5);
        assert_eq!(header.data_storage, "colmajor");
        assert_eq!(header.data_order.sensors_data[1], "x_positions");
        assert_eq!(matrix.cols(), 2);
    }
}
