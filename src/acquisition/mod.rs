//! Timed acquisition loop.
//!
//! A single producer task owns the [`FrameReader`], the [`SampleDecoder`] and
//! the [`HistoryBuffer`]. It moves through
//!
//! ```text
//! Idle -> Draining -> Armed -> Recording -> Stopped
//! ```
//!
//! publishing each transition on a `watch` channel. Frames already queued in
//! the transport when the loop starts are decoded and discarded; after that
//! every decoded sample becomes the live snapshot, and once the start gate is
//! open it is also appended to the history. The loop stops when the history is
//! full or a stop is requested.
//!
//! Framing errors end the session. Malformed payloads are logged and skipped.

pub mod control;
pub mod history;

pub use control::{AcquisitionControl, ControlContext};
pub use history::{capacity_for, HistoryBuffer, MAX_HISTORY_CAPACITY};

use crate::core::{Sample, Schema};
use crate::error::{AppResult, FbgsError, FramingError};
use crate::protocol::{FrameReader, SampleDecoder};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of an acquisition session. Ordered by progression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AcquisitionState {
    /// Spawned, not yet reading
    Idle,
    /// Discarding frames buffered before the session started
    Draining,
    /// Decoding live frames, waiting for the start gate
    Armed,
    /// Appending decoded samples to the history
    Recording,
    /// Loop exited (capacity, cancellation or error)
    Stopped,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Draining => "draining",
            AcquisitionState::Armed => "armed",
            AcquisitionState::Recording => "recording",
            AcquisitionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How long the loop sleeps when no frame is ready.
///
/// Shorter intervals detect frames sooner at the cost of CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollingPolicy {
    /// Sleep between availability checks
    pub interval: Duration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1),
        }
    }
}

/// Why a session ended without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The history buffer reached its capacity
    CapacityReached,
    /// A stop was requested through [`AcquisitionControl`]
    Cancelled,
}

/// Per-session counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames read from the transport, including drained ones
    pub frames_read: u64,
    /// Frames discarded before arming
    pub drained: u64,
    /// Payloads that failed to decode after arming
    pub malformed: u64,
    /// Samples appended to the history
    pub recorded: u64,
}

/// The outcome of a completed session.
#[derive(Clone, Debug)]
pub struct Recording {
    /// Schema the samples were decoded with
    pub schema: Schema,
    /// Recorded samples in arrival order
    pub samples: Vec<Sample>,
    /// Nominal acquisition frequency (Hz)
    pub frequency: f64,
    /// Instant the loop started
    pub started_at: DateTime<Utc>,
    /// Why the loop stopped
    pub stop_reason: StopReason,
    /// Counters for the whole session
    pub stats: SessionStats,
}

impl Recording {
    /// Seconds from loop start to the last recorded sample.
    pub fn duration(&self) -> f64 {
        self.samples
            .last()
            .map(|s| (s.time_stamp - self.started_at).num_microseconds().unwrap_or(0) as f64 * 1e-6)
            .unwrap_or(0.0)
    }
}

/// Everything the producer task owns.
pub struct AcquisitionLoop<R> {
    reader: FrameReader<R>,
    decoder: SampleDecoder,
    history: HistoryBuffer,
    frequency: f64,
    polling: PollingPolicy,
}

impl<R> AcquisitionLoop<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Loop over `reader` that records into `history`. `frequency` is the
    /// nominal rate reported in the recording.
    pub fn new(
        reader: FrameReader<R>,
        decoder: SampleDecoder,
        history: HistoryBuffer,
        frequency: f64,
    ) -> Self {
        Self {
            reader,
            decoder,
            history,
            frequency,
            polling: PollingPolicy::default(),
        }
    }

    /// Override the idle polling interval.
    pub fn with_polling(mut self, polling: PollingPolicy) -> Self {
        self.polling = polling;
        self
    }

    /// Start the loop on the tokio runtime.
    pub fn spawn(self, control: ControlContext) -> AcquisitionHandle {
        let (state_tx, state_rx) = watch::channel(AcquisitionState::Idle);
        let latest = Arc::new(Mutex::new(None));
        let snapshot = Arc::clone(&latest);

        let task = tokio::spawn(async move { self.run(control, state_tx, snapshot).await });

        AcquisitionHandle {
            task,
            state_rx,
            latest,
        }
    }

    async fn run(
        mut self,
        control: ControlContext,
        state: watch::Sender<AcquisitionState>,
        latest: Arc<Mutex<Option<Sample>>>,
    ) -> Result<Recording, FramingError> {
        let started_at = Utc::now();
        let mut stats = SessionStats::default();
        info!(
            schema = %self.decoder.schema(),
            capacity = self.history.capacity(),
            frequency = self.frequency,
            "Acquisition loop started"
        );

        let outcome = self.acquire(&control, &state, &latest, &mut stats).await;
        state.send_replace(AcquisitionState::Stopped);

        info!(
            frames_read = stats.frames_read,
            drained = stats.drained,
            malformed = stats.malformed,
            recorded = stats.recorded,
            "Acquisition loop stopped"
        );

        let stop_reason = outcome?;
        info!(reason = ?stop_reason, samples = self.history.len(), "Recording complete");

        Ok(Recording {
            schema: self.decoder.schema(),
            samples: self.history.into_samples(),
            frequency: self.frequency,
            started_at,
            stop_reason,
            stats,
        })
    }

    async fn acquire(
        &mut self,
        control: &ControlContext,
        state: &watch::Sender<AcquisitionState>,
        latest: &Mutex<Option<Sample>>,
        stats: &mut SessionStats,
    ) -> Result<StopReason, FramingError> {
        state.send_replace(AcquisitionState::Draining);
        while self.reader.frame_ready()? {
            let payload = self.reader.read_frame().await?;
            stats.frames_read += 1;
            stats.drained += 1;
            if let Err(e) = self.decoder.decode(&payload, Utc::now()) {
                debug!(error = %e, "Drained frame did not decode");
            }
        }
        info!(drained = stats.drained, "Discarded buffered frames before arming");
        state.send_replace(AcquisitionState::Armed);

        loop {
            if control.stop_requested() {
                return Ok(StopReason::Cancelled);
            }
            if self.history.is_full() {
                return Ok(StopReason::CapacityReached);
            }
            let recording = control.recording_gate();
            if recording {
                arm_to_recording(state);
            }

            if !self.reader.frame_ready()? {
                tokio::time::sleep(self.polling.interval).await;
                continue;
            }

            let payload = self.reader.read_frame().await?;
            stats.frames_read += 1;

            let sample = match self.decoder.decode(&payload, Utc::now()) {
                Ok(sample) => sample,
                Err(e) => {
                    stats.malformed += 1;
                    warn!(error = %e, bytes = payload.len(), "Discarding malformed sample");
                    continue;
                }
            };

            *latest.lock() = Some(sample.clone());

            // Re-read the gate: it may have opened while this frame was in flight.
            if recording || control.recording_gate() {
                arm_to_recording(state);
                debug!(sample_number = sample.sample_number, "Recorded sample");
                if self.history.push(sample).is_ok() {
                    stats.recorded += 1;
                }
            }
        }
    }
}

fn arm_to_recording(state: &watch::Sender<AcquisitionState>) {
    let armed = *state.borrow() == AcquisitionState::Armed;
    if armed {
        info!("Start gate open, recording");
        state.send_replace(AcquisitionState::Recording);
    }
}

/// Observer/owner handle for a spawned acquisition loop.
#[derive(Debug)]
pub struct AcquisitionHandle {
    task: JoinHandle<Result<Recording, FramingError>>,
    state_rx: watch::Receiver<AcquisitionState>,
    latest: Arc<Mutex<Option<Sample>>>,
}

impl AcquisitionHandle {
    /// Copy of the most recently decoded sample, if any.
    pub fn latest_sample(&self) -> Option<Sample> {
        self.latest.lock().clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AcquisitionState {
        *self.state_rx.borrow()
    }

    /// Wait until the loop has reached `target` (or any later state).
    pub async fn wait_for_state(&self, target: AcquisitionState) -> AcquisitionState {
        let mut rx = self.state_rx.clone();
        let reached = rx.wait_for(|s| *s >= target).await.map(|s| *s);
        match reached {
            Ok(state) => state,
            Err(_) => *rx.borrow(),
        }
    }

    /// Whether the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to finish and take its recording.
    ///
    /// # Errors
    /// * [`FbgsError::Framing`] if the session ended on a transport failure
    /// * [`FbgsError::TaskFailed`] if the task panicked or was aborted
    pub async fn join(self) -> AppResult<Recording> {
        let recording = self
            .task
            .await
            .map_err(|e| FbgsError::TaskFailed(e.to_string()))??;
        Ok(recording)
    }
}
