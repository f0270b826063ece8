//! Interrogator wire protocol.
//!
//! - [`framing`]: length-prefixed frames over a byte stream
//! - [`decoder`]: frame payload to [`Sample`](crate::core::Sample)
//! - [`encoder`]: the inverse, for simulated interrogators

pub mod decoder;
pub mod encoder;
pub mod framing;

pub use decoder::SampleDecoder;
pub use encoder::encode;
pub use framing::{encode_frame, FrameReader};
