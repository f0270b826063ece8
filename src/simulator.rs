//! A simulated interrogator that serves synthetic frames over TCP.
//!
//! Every accepted client receives its own stream of well-formed frames at the
//! configured rate. Shape-sensing frames describe a fiber bent into a slowly
//! oscillating planar arc; multicore frames carry the per-core strains that
//! the same bend would produce, so the decoder's inversion recovers it.

use crate::core::{
    Channel, Sample, Schema, Sensor, ShapeSensor, ARC_LENGTH_STEP, CHANNELS_PER_SENSOR,
};
use crate::error::{AppResult, FbgsError};
use crate::protocol::{encode, encode_frame};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::{FRAC_PI_2, PI};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const GRATINGS: usize = 8;
const SHAPE_POINTS: usize = 100;
const BASE_WAVELENGTH: f64 = 1530.0;
const WAVELENGTH_SPACING: f64 = 4.0;

/// Outer-core angles in wire order q1, q2, q3 (cores c2, c4, c3).
const OUTER_CORE_ANGLES: [f64; 3] = [
    FRAC_PI_2,
    4.0 * PI / 3.0 + FRAC_PI_2,
    2.0 * PI / 3.0 + FRAC_PI_2,
];

/// Produces consecutive synthetic samples.
#[derive(Debug)]
pub struct SampleGenerator {
    schema: Schema,
    core_radius: f64,
    sample_number: i64,
    rng: StdRng,
}

impl SampleGenerator {
    /// Generator for `schema`; `core_radius` (m) shapes multicore strain.
    pub fn new(schema: Schema, core_radius: f64) -> Self {
        Self {
            schema,
            core_radius,
            sample_number: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic noise for reproducible streams.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Next sample in the stream; sample numbers start at 1.
    pub fn next_sample(&mut self) -> Sample {
        self.sample_number += 1;
        let t = self.sample_number as f64 * 0.01;
        let kappa = 2.0 + (0.5 * t).sin();
        let bend_angle = 0.3 * t.sin();

        let mut channels: Vec<Channel> = (1..=CHANNELS_PER_SENSOR as i32)
            .map(|number| self.channel(number))
            .collect();

        let sensors = match self.schema {
            Schema::ShapeSensing => vec![Sensor::Shape(self.arc(kappa, bend_angle))],
            Schema::MulticoreFiber => {
                self.attach_strains(&mut channels, kappa, bend_angle);
                Vec::new()
            }
        };

        Sample {
            sample_number: self.sample_number,
            time_stamp: Utc::now(),
            channels,
            sensors,
        }
    }

    /// Next frame payload, encoded for this generator's schema.
    pub fn next_payload(&mut self) -> String {
        let sample = self.next_sample();
        encode(self.schema, &sample)
    }

    fn channel(&mut self, number: i32) -> Channel {
        let peak_wavelengths = (0..GRATINGS)
            .map(|g| {
                BASE_WAVELENGTH
                    + g as f64 * WAVELENGTH_SPACING
                    + self.rng.gen_range(-0.01..0.01)
            })
            .collect();
        let peak_powers = (0..GRATINGS)
            .map(|_| self.rng.gen_range(0.8..1.0))
            .collect();
        Channel {
            channel_number: number,
            error_status: [0; 4],
            peak_wavelengths,
            peak_powers,
            strains: None,
        }
    }

    /// Planar arc of constant curvature in the plane at `bend_angle`.
    fn arc(&mut self, kappa: f64, bend_angle: f64) -> ShapeSensor {
        let shape = (0..SHAPE_POINTS)
            .map(|j| {
                let s = j as f64 * ARC_LENGTH_STEP;
                let lateral = (1.0 - (kappa * s).cos()) / kappa;
                [
                    (kappa * s).sin() / kappa,
                    lateral * bend_angle.cos(),
                    lateral * bend_angle.sin(),
                ]
            })
            .collect();

        ShapeSensor {
            kappa: (0..GRATINGS)
                .map(|_| kappa + self.rng.gen_range(-0.01..0.01))
                .collect(),
            phi: vec![bend_angle; GRATINGS],
            shape,
            arc_length: (0..SHAPE_POINTS)
                .map(|j| j as f64 * ARC_LENGTH_STEP)
                .collect(),
        }
    }

    /// Micro-strain of pure bending, centre core on channel 1.
    fn attach_strains(&mut self, channels: &mut [Channel], kappa: f64, bend_angle: f64) {
        let elongation = self.rng.gen_range(-2.0..2.0);
        channels[0].strains = Some(vec![elongation; GRATINGS]);
        for (channel, theta) in channels[1..].iter_mut().zip(OUTER_CORE_ANGLES) {
            let bending = -self.core_radius * kappa * (bend_angle - theta).cos() * 1e6;
            channel.strains = Some(vec![elongation + bending; GRATINGS]);
        }
    }
}

/// TCP server streaming synthetic frames.
#[derive(Debug)]
pub struct Simulator {
    listener: TcpListener,
    schema: Schema,
    frequency: f64,
    core_radius: f64,
    frame_limit: Option<u64>,
}

impl Simulator {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr, schema: Schema, frequency: f64) -> AppResult<Self> {
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(FbgsError::Configuration(format!(
                "simulator frequency must be positive, got {frequency}"
            )));
        }
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, %schema, frequency, "Simulated interrogator listening");
        Ok(Self {
            listener,
            schema,
            frequency,
            core_radius: 50e-6,
            frame_limit: None,
        })
    }

    /// Core radius (m) used to synthesize multicore strain.
    pub fn with_core_radius(mut self, radius: f64) -> Self {
        self.core_radius = radius;
        self
    }

    /// Close each client connection after `limit` frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Bound address, useful after binding port 0.
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until `shutdown` becomes true.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        let period = Duration::from_secs_f64(1.0 / self.frequency);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    info!(%peer, "Client connected");
                    let generator = SampleGenerator::new(self.schema, self.core_radius);
                    let client_shutdown = shutdown.clone();
                    let limit = self.frame_limit;
                    tokio::spawn(async move {
                        match stream_frames(stream, generator, period, limit, client_shutdown).await {
                            Ok(sent) => info!(%peer, frames = sent, "Client stream finished"),
                            Err(e) => warn!(%peer, error = %e, "Client disconnected"),
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Simulated interrogator shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn stream_frames(
    mut stream: TcpStream,
    mut generator: SampleGenerator,
    period: Duration,
    limit: Option<u64>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<u64> {
    stream.set_nodelay(true)?;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0u64;

    while limit.map_or(true, |l| sent < l) {
        tokio::select! {
            _ = ticker.tick() => {
                let payload = generator.next_payload();
                stream.write_all(&encode_frame(payload.as_bytes())).await?;
                sent += 1;
                debug!(frames = sent, "Sent frame");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    stream.shutdown().await?;
    Ok(sent)
}
