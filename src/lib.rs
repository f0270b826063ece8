//! Core library for the fbgs_daq application.
//!
//! Acquisition of FBGS fiber-optic strain interrogator streams: length-prefixed
//! framing, positional payload decoding, multicore strain-to-curvature
//! inversion, a timed acquisition loop with a start gate, and export of the
//! recorded history as a column-major matrix. It is used by the `fbgs_daq`
//! binary and by the integration tests.

pub mod acquisition;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod protocol;
pub mod simulator;
