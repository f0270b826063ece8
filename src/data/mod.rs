//! Recorded data: column-major export and on-disk storage.

pub mod export;
pub mod storage;

pub use export::{export, to_column_matrix, ColumnMatrix, RecordingHeader};
pub use storage::save_recording;
