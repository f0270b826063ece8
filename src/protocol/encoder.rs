//! Payload encoding, the exact inverse of [`SampleDecoder`](super::SampleDecoder).
//!
//! Used by the simulated interrogator. Values are divided by the unit scale
//! factors the decoder multiplies by, so samples built from dyadic values
//! survive a round trip bit for bit.

use crate::core::{Sample, Schema, Sensor, KAPPA_SCALE, SHAPE_SCALE};
use crate::protocol::decoder::CURVATURE_MARKER;
use std::fmt::{self, Write};

const ANGLE_MARKER: &str = "Angle [rad]";
const X_MARKER: &str = "X [cm]";
const Y_MARKER: &str = "Y [cm]";
const Z_MARKER: &str = "Z [cm]";

/// Tab-joined token writer.
struct Line {
    out: String,
}

impl Line {
    fn token(&mut self, value: impl fmt::Display) {
        if !self.out.is_empty() {
            self.out.push('\t');
        }
        // Writing into a String cannot fail.
        let _ = write!(self.out, "{value}");
    }

    fn values<'a>(&mut self, values: impl IntoIterator<Item = &'a f64>, scale: f64) {
        for v in values {
            self.token(v / scale);
        }
    }
}

/// Render `sample` as a payload in the layout of `schema`.
///
/// Multicore payloads carry each channel's `strains` (zeros when absent); the
/// inverted sensors are not part of the wire format. Shape-sensing payloads
/// carry one curvature block per [`Sensor::Shape`].
pub fn encode(schema: Schema, sample: &Sample) -> String {
    let mut line = Line { out: String::new() };

    line.token(sample.time_stamp.format("%Y-%m-%d"));
    line.token(sample.time_stamp.format("%H:%M:%S%.3f"));
    line.token(sample.sample_number);
    line.token(sample.num_channels());

    for channel in &sample.channels {
        line.token(channel.channel_number);
        line.token(channel.num_gratings());
        for flag in channel.error_status {
            line.token(flag);
        }
        line.values(&channel.peak_wavelengths, 1.0);
        line.values(&channel.peak_powers, 1.0);
    }

    match schema {
        Schema::MulticoreFiber => {
            line.token(sample.total_gratings());
            for channel in &sample.channels {
                match &channel.strains {
                    Some(strains) => line.values(strains, 1.0),
                    None => line.values(std::iter::repeat(&0.0).take(channel.num_gratings()), 1.0),
                }
            }
        }
        Schema::ShapeSensing => {
            for sensor in &sample.sensors {
                let Sensor::Shape(shape) = sensor else {
                    continue;
                };
                let points = shape.num_shape_points();

                line.token(CURVATURE_MARKER);
                line.values(&shape.kappa, KAPPA_SCALE);
                line.token(ANGLE_MARKER);
                line.values(&shape.phi, 1.0);

                for (axis, marker) in [X_MARKER, Y_MARKER, Z_MARKER].into_iter().enumerate() {
                    line.token(marker);
                    line.token(points);
                    line.values(shape.shape.iter().map(|p| &p[axis]), SHAPE_SCALE);
                }
            }
        }
    }

    line.out.push('\n');
    line.out
}
