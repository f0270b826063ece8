//! Effective core radius from the interrogator's calibration file.
//!
//! The vendor file is plain text. Line 12 (1-indexed) holds a tab-separated
//! key/value pair whose value is the core radius in micrometers.

use crate::error::CalibrationError;
use std::path::Path;
use tracing::info;

/// 1-indexed line of the calibration file holding the core radius.
pub const RADIUS_LINE: usize = 12;

const MICROMETER: f64 = 1e-6;

/// Read the effective core radius (m) from a calibration file.
pub fn read_core_radius(path: impl AsRef<Path>) -> Result<f64, CalibrationError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| CalibrationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let radius = parse_core_radius(&text)?;
    info!(path = %path.display(), radius_m = radius, "Loaded core radius from calibration file");
    Ok(radius)
}

/// Parse the effective core radius (m) from calibration file contents.
pub fn parse_core_radius(text: &str) -> Result<f64, CalibrationError> {
    let lines = text.lines().count();
    let line = text
        .lines()
        .nth(RADIUS_LINE - 1)
        .ok_or(CalibrationError::MissingLine {
            lines,
            expected: RADIUS_LINE,
        })?;

    let (_, value) = line
        .split_once('\t')
        .ok_or_else(|| CalibrationError::MalformedLine {
            line: line.to_string(),
        })?;

    let micrometers: f64 = value
        .trim()
        .parse()
        .map_err(|_| CalibrationError::MalformedLine {
            line: line.to_string(),
        })?;

    let radius = micrometers * MICROMETER;
    if radius.is_finite() && radius > 0.0 {
        Ok(radius)
    } else {
        Err(CalibrationError::InvalidRadius { value: radius })
    }
}

/// Radius in meters from a value configured in micrometers.
pub fn radius_from_micrometers(micrometers: f64) -> Result<f64, CalibrationError> {
    let radius = micrometers * MICROMETER;
    if radius.is_finite() && radius > 0.0 {
        Ok(radius)
    } else {
        Err(CalibrationError::InvalidRadius { value: radius })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn calibration_text(radius_line: &str) -> String {
        let mut text = String::new();
        for i in 1..RADIUS_LINE {
            text.push_str(&format!("Header {i}\tvalue {i}\n"));
        }
        text.push_str(radius_line);
        text.push_str("\nTrailer\t0\n");
        text
    }

    #[test]
    fn test_parse_radius_from_line_twelve() {
        let text = calibration_text("Core distance [um]\t35.5");
        let radius = parse_core_radius(&text).unwrap();
        assert!((radius - 35.5e-6).abs() < 1e-18);
    }

    #[test]
    fn test_parse_radius_tolerates_crlf() {
        let text = calibration_text("Core distance [um]\t50\r");
        assert!((parse_core_radius(&text).unwrap() - 50e-6).abs() < 1e-18);
    }

    #[test]
    fn test_short_file_is_rejected() {
        let err = parse_core_radius("only\t1\n").unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::MissingLine {
                lines: 1,
                expected: RADIUS_LINE
            }
        ));
    }

    #[test]
    fn test_malformed_and_invalid_values() {
        let no_tab = calibration_text("Core distance 35.5");
        assert!(matches!(
            parse_core_radius(&no_tab),
            Err(CalibrationError::MalformedLine { .. })
        ));

        let not_number = calibration_text("Core distance\tabc");
        assert!(matches!(
            parse_core_radius(&not_number),
            Err(CalibrationError::MalformedLine { .. })
        ));

        let negative = calibration_text("Core distance\t-3");
        assert!(matches!(
            parse_core_radius(&negative),
            Err(CalibrationError::InvalidRadius { .. })
        ));
    }

    #[test]
    fn test_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(calibration_text("r\t42").as_bytes()).unwrap();
        let radius = read_core_radius(file.path()).unwrap();
        assert!((radius - 42e-6).abs() < 1e-18);

        let missing = read_core_radius("/nonexistent/fbgs/calibration.txt");
        assert!(matches!(missing, Err(CalibrationError::Read { .. })));
    }
}
