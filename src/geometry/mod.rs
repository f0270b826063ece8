//! Fiber geometry: multicore strain inversion and its calibration input.

pub mod calibration;
pub mod strain;

pub use calibration::{parse_core_radius, read_core_radius};
pub use strain::{Inversion, RootOrder, StrainInverter};
