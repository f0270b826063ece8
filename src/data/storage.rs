//! Writing exported recordings to disk.
//!
//! A recording is saved as two files sharing a stem:
//!
//! - `<stem>.yaml`: session header (`date`, `notes`) and the
//!   [`RecordingHeader`] under `measurements`
//! - `<stem>.csv`: the column-major matrix, one CSV row per matrix row
use crate::data::export::{ColumnMatrix, RecordingHeader};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Free-form session information stored next to the measurements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    /// Save time, RFC 3339 in UTC
    pub date: String,
    /// Operator notes
    pub notes: String,
}

/// Top-level YAML document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordingDocument {
    /// Session information
    pub header: SessionHeader,
    /// Layout of the companion CSV matrix
    pub measurements: RecordingHeader,
}

/// Paths of a saved recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedRecording {
    /// YAML header path
    pub yaml: PathBuf,
    /// CSV matrix path
    pub csv: PathBuf,
}

/// Save `header` and `matrix` under `dir`, creating it if needed.
pub fn save_recording(
    dir: impl AsRef<Path>,
    stem: &str,
    notes: &str,
    header: &RecordingHeader,
    matrix: &ColumnMatrix,
) -> Result<SavedRecording> {
    let dir = dir.as_ref();
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create storage directory at {:?}", dir))?;
    }

    let yaml = dir.join(format!("{stem}.yaml"));
    let document = RecordingDocument {
        header: SessionHeader {
            date: Utc::now().to_rfc3339(),
            notes: notes.to_string(),
        },
        measurements: header.clone(),
    };
    let file =
        File::create(&yaml).with_context(|| format!("Failed to create YAML file at {:?}", yaml))?;
    serde_yaml::to_writer(file, &document).context("Failed to write recording header")?;

    let csv = dir.join(format!("{stem}.csv"));
    write_matrix_csv(&csv, matrix)?;

    info!(
        yaml = %yaml.display(),
        csv = %csv.display(),
        rows = matrix.rows(),
        cols = matrix.cols(),
        "Recording saved"
    );
    Ok(SavedRecording { yaml, csv })
}

fn write_matrix_csv(path: &Path, matrix: &ColumnMatrix) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create CSV file at {:?}", path))?;

    for row in matrix.row_iter() {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .context("Failed to write matrix row to CSV file")?;
    }
    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

/// Load the YAML document of a saved recording.
pub fn load_document(path: impl AsRef<Path>) -> Result<RecordingDocument> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    serde_yaml::from_reader(file).with_context(|| format!("Failed to parse {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Sample, Sensor, ShapeSensor};
    use crate::data::export::to_column_matrix;
    use chrono::TimeZone;

    fn header() -> RecordingHeader {
        RecordingHeader {
            number_of_snapshots: 1,
            frequency: 100.0,
            duration: 0.5,
            number_of_sensors: 1,
            number_of_channels: 4,
            data_storage: "colmajor".to_string(),
            data_order: crate::data::export::DataOrder {
                header: vec!["sample_number".into()],
                number_of_points_per_sensors: vec!["number_of_datapoints".into()],
                sensors_data: vec!["x_positions".into()],
            },
        }
    }

    #[test]
    fn test_save_writes_yaml_and_csv() {
        let sample = Sample {
            sample_number: 7,
            time_stamp: Utc.timestamp_opt(10, 0).unwrap(),
            channels: vec![],
            sensors: vec![Sensor::Shape(ShapeSensor {
                kappa: vec![],
                phi: vec![],
                shape: vec![[0.5, 0.25, 0.125]],
                arc_length: vec![0.0],
            })],
        };
        let matrix = to_column_matrix(&[sample]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("run");
        let saved = save_recording(&target, "session", "bench test", &header(), &matrix).unwrap();

        let document = load_document(&saved.yaml).unwrap();
        assert_eq!(document.measurements, header());
        assert_eq!(document.header.notes, "bench test");

        let csv = std::fs::read_to_string(&saved.csv).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), matrix.rows());
        assert_eq!(lines[0], "7");
        assert_eq!(lines[1], "10");
        assert_eq!(lines[5], "0.5");
    }
}
