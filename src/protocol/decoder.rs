//! Positional decoding of tab-separated interrogator payloads.
//!
//! A payload is a flat sequence of tab-separated ASCII tokens whose meaning is
//! given only by position:
//!
//! ```text
//! date  time  sample_number  num_channels
//!   { channel_number  num_gratings  err0..err3  wavelength*n  power*n } * num_channels
//! multicore:  engineered_count  { strain*n } * num_channels
//! shape:      { "Curvature [1/cm]"  kappa*m  <marker>  phi*m
//!               <marker>  k  x*k  <marker>  k  y*k  <marker>  k  z*k } * sensors
//! ```
//!
//! Decoding stops at the first malformed token; the whole sample is rejected.

use crate::core::{
    sensor_count, Channel, CurvatureStrain, MulticoreSensor, Sample, Schema, Sensor, ShapeSensor,
    ARC_LENGTH_STEP, CHANNELS_PER_SENSOR, KAPPA_SCALE, SHAPE_SCALE,
};
use crate::error::SampleParseError;
use crate::geometry::StrainInverter;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use tracing::{debug, warn};

/// Token that opens each curvature block of a shape-sensing payload.
pub const CURVATURE_MARKER: &str = "Curvature [1/cm]";

/// Cursor over the tab-separated tokens of one payload.
struct Tokens<'a> {
    inner: std::str::Split<'a, char>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.split('\t'),
        }
    }

    fn next(&mut self, field: &'static str) -> Result<&'a str, SampleParseError> {
        self.inner
            .next()
            .ok_or(SampleParseError::UnexpectedEnd { field })
    }

    fn skip(&mut self, count: usize, field: &'static str) -> Result<(), SampleParseError> {
        for _ in 0..count {
            self.next(field)?;
        }
        Ok(())
    }

    fn parse<T: FromStr>(&mut self, field: &'static str) -> Result<T, SampleParseError> {
        let token = self.next(field)?;
        token
            .trim()
            .parse()
            .map_err(|_| SampleParseError::InvalidNumber {
                field,
                token: token.to_string(),
            })
    }

    fn floats(
        &mut self,
        count: usize,
        scale: f64,
        field: &'static str,
    ) -> Result<Vec<f64>, SampleParseError> {
        (0..count)
            .map(|_| self.parse::<f64>(field).map(|v| v * scale))
            .collect()
    }
}

/// Turns one frame payload into a [`Sample`] for a fixed [`Schema`].
#[derive(Clone, Debug)]
pub struct SampleDecoder {
    schema: Schema,
    inverter: Option<StrainInverter>,
}

impl SampleDecoder {
    /// Decoder for the shape-sensing interrogator.
    pub fn shape_sensing() -> Self {
        Self {
            schema: Schema::ShapeSensing,
            inverter: None,
        }
    }

    /// Decoder for the multicore interrogator, inverting strain with `inverter`.
    pub fn multicore(inverter: StrainInverter) -> Self {
        Self {
            schema: Schema::MulticoreFiber,
            inverter: Some(inverter),
        }
    }

    /// Payload layout this decoder expects.
    pub fn schema(&self) -> Schema {
        self.schema
    }

    /// Decode a complete payload captured at `time_stamp`.
    ///
    /// # Errors
    /// Any [`SampleParseError`]; the caller discards the sample.
    pub fn decode(
        &self,
        payload: &[u8],
        time_stamp: DateTime<Utc>,
    ) -> Result<Sample, SampleParseError> {
        let text = std::str::from_utf8(payload).map_err(|_| SampleParseError::NotUtf8)?;
        let mut tokens = Tokens::new(text);

        tokens.skip(2, "date/time")?;
        let sample_number: i64 = tokens.parse("sample_number")?;
        let num_channels: usize = tokens.parse("num_channels")?;

        let mut channels = (0..num_channels)
            .map(|_| read_channel(&mut tokens))
            .collect::<Result<Vec<_>, _>>()?;

        let sensors = match (self.schema, &self.inverter) {
            (Schema::MulticoreFiber, Some(inverter)) => {
                read_strains(&mut tokens, &mut channels)?;
                invert_sensors(inverter, &channels, sample_number)
            }
            // A multicore decoder is only built with an inverter, so this arm
            // is the shape-sensing schema.
            _ => read_curvature_blocks(&mut tokens, &channels)?,
        };

        Ok(Sample {
            sample_number,
            time_stamp,
            channels,
            sensors,
        })
    }
}

fn read_channel(tokens: &mut Tokens<'_>) -> Result<Channel, SampleParseError> {
    let channel_number = tokens.parse("channel_number")?;
    let num_gratings: usize = tokens.parse("num_gratings")?;
    let mut error_status = [0i32; 4];
    for flag in &mut error_status {
        *flag = tokens.parse("error_status")?;
    }
    let peak_wavelengths = tokens.floats(num_gratings, 1.0, "peak_wavelength")?;
    let peak_powers = tokens.floats(num_gratings, 1.0, "peak_power")?;

    Ok(Channel {
        channel_number,
        error_status,
        peak_wavelengths,
        peak_powers,
        strains: None,
    })
}

fn read_strains(tokens: &mut Tokens<'_>, channels: &mut [Channel]) -> Result<(), SampleParseError> {
    // Engineered-value count; redundant with the grating counts.
    tokens.skip(1, "engineered_count")?;
    for channel in channels.iter_mut() {
        channel.strains = Some(tokens.floats(channel.num_gratings(), 1.0, "strain")?);
    }
    Ok(())
}

/// Invert every grating point of every complete channel quadruple.
fn invert_sensors(
    inverter: &StrainInverter,
    channels: &[Channel],
    sample_number: i64,
) -> Vec<Sensor> {
    channels
        .chunks(CHANNELS_PER_SENSOR)
        .take(sensor_count(channels))
        .enumerate()
        .map(|(sensor, quad)| {
            // Centre core first, then the outer cores at 90°, 210°, 330°.
            let (center, c2, c3, c4) = (
                strains_of(&quad[0]),
                strains_of(&quad[1]),
                strains_of(&quad[3]),
                strains_of(&quad[2]),
            );

            let points = quad[0].num_gratings();
            let mut curvature_strains = Vec::with_capacity(points);
            let mut invalid_points = Vec::new();
            for j in 0..points {
                match inverter.invert(center[j], [c2[j], c3[j], c4[j]]) {
                    Ok(inversion) => {
                        if !inversion.consistent {
                            debug!(sample_number, sensor, point = j, "Bending-angle estimates disagree, keeping first root");
                            invalid_points.push(j);
                        }
                        curvature_strains.push(inversion.strain);
                    }
                    Err(e) => {
                        warn!(sample_number, sensor, point = j, error = %e, "Strain inversion failed, zero-filling point");
                        curvature_strains.push(CurvatureStrain::default());
                        invalid_points.push(j);
                    }
                }
            }

            Sensor::Multicore(MulticoreSensor {
                curvature_strains,
                invalid_points,
            })
        })
        .collect()
}

fn strains_of(channel: &Channel) -> &[f64] {
    channel.strains.as_deref().unwrap_or(&[])
}

fn read_curvature_blocks(
    tokens: &mut Tokens<'_>,
    channels: &[Channel],
) -> Result<Vec<Sensor>, SampleParseError> {
    let mut sensors = Vec::new();

    while matches!(tokens.inner.next(), Some(t) if t.trim() == CURVATURE_MARKER) {
        let index = sensors.len();
        let channel = index * CHANNELS_PER_SENSOR;
        let points = channels
            .get(channel)
            .map(Channel::num_gratings)
            .ok_or(SampleParseError::MissingChannel {
                sensor: index,
                channel,
                num_channels: channels.len(),
            })?;

        let kappa = tokens.floats(points, KAPPA_SCALE, "kappa")?;
        tokens.skip(1, "angle marker")?;
        let phi = tokens.floats(points, 1.0, "phi")?;

        tokens.skip(1, "x marker")?;
        let shape_points: usize = tokens.parse("shape_points")?;
        let xs = tokens.floats(shape_points, SHAPE_SCALE, "x")?;
        tokens.skip(2, "y marker")?;
        let ys = tokens.floats(shape_points, SHAPE_SCALE, "y")?;
        tokens.skip(2, "z marker")?;
        let zs = tokens.floats(shape_points, SHAPE_SCALE, "z")?;

        let shape = xs
            .into_iter()
            .zip(ys)
            .zip(zs)
            .map(|((x, y), z)| [x, y, z])
            .collect();
        let arc_length = (0..shape_points)
            .map(|j| j as f64 * ARC_LENGTH_STEP)
            .collect();

        sensors.push(Sensor::Shape(ShapeSensor {
            kappa,
            phi,
            shape,
            arc_length,
        }));
    }

    Ok(sensors)
}
