//! End-to-end acquisition sessions over in-memory and loopback transports.

use fbgs_daq::acquisition::{
    AcquisitionControl, AcquisitionHandle, AcquisitionLoop, AcquisitionState, HistoryBuffer,
    StopReason,
};
use fbgs_daq::core::{Schema, Sensor};
use fbgs_daq::geometry::StrainInverter;
use fbgs_daq::data::export;
use fbgs_daq::error::{FbgsError, FramingError};
use fbgs_daq::protocol::{encode_frame, FrameReader, SampleDecoder};
use fbgs_daq::simulator::Simulator;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn frame(sample_number: i64) -> Vec<u8> {
    let payload = format!(
        "2024-01-01\t00:00:00\t{sample_number}\t1\t1\t2\t0\t0\t0\t0\t1550.0\t1551.0\t0.5\t0.5\n"
    );
    encode_frame(payload.as_bytes()).to_vec()
}

fn spawn_loop(rx: DuplexStream, capacity: usize) -> (AcquisitionControl, AcquisitionHandle) {
    let (control, ctx) = AcquisitionControl::new();
    let handle = AcquisitionLoop::new(
        FrameReader::new(rx),
        SampleDecoder::shape_sensing(),
        HistoryBuffer::with_capacity(capacity),
        100.0,
    )
    .spawn(ctx);
    (control, handle)
}

async fn wait_for_sample(handle: &AcquisitionHandle, sample_number: i64) {
    timeout(TEST_TIMEOUT, async {
        while handle.latest_sample().map(|s| s.sample_number) != Some(sample_number) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn gate_opens_after_five_frames() {
    let (mut tx, rx) = tokio::io::duplex(64 * 1024);
    let (control, handle) = spawn_loop(rx, 10);
    handle.wait_for_state(AcquisitionState::Armed).await;

    for n in 1..=5 {
        tx.write_all(&frame(n)).await.unwrap();
    }
    wait_for_sample(&handle, 5).await;
    assert_eq!(handle.state(), AcquisitionState::Armed);

    control.start_recording();
    for n in 6..=20 {
        tx.write_all(&frame(n)).await.unwrap();
    }

    let recording = timeout(TEST_TIMEOUT, handle.join()).await.unwrap().unwrap();
    let numbers: Vec<_> = recording.samples.iter().map(|s| s.sample_number).collect();
    assert_eq!(numbers, (6..=15).collect::<Vec<_>>());
    assert_eq!(recording.stop_reason, StopReason::CapacityReached);
    assert_eq!(recording.stats.recorded, 10);

    let (header, matrix) = export(&recording).unwrap();
    assert_eq!(header.number_of_snapshots, 10);
    assert_eq!(matrix.cols(), 10);
    assert_eq!(matrix.rows(), 3);
    assert_eq!(matrix.get(0, 0), Some(6.0));
}

#[tokio::test]
async fn buffered_frames_are_drained() {
    let (mut tx, rx) = tokio::io::duplex(64 * 1024);
    for n in 1..=4 {
        tx.write_all(&frame(n)).await.unwrap();
    }

    let (control, handle) = spawn_loop(rx, 2);
    control.start_recording();
    handle.wait_for_state(AcquisitionState::Armed).await;

    tx.write_all(&frame(100)).await.unwrap();
    tx.write_all(&frame(101)).await.unwrap();

    let recording = timeout(TEST_TIMEOUT, handle.join()).await.unwrap().unwrap();
    let numbers: Vec<_> = recording.samples.iter().map(|s| s.sample_number).collect();
    assert_eq!(numbers, vec![100, 101]);
    assert_eq!(recording.stats.drained, 4);
    assert_eq!(recording.stats.frames_read, 6);
}

#[tokio::test]
async fn truncated_frame_ends_session() {
    let (mut tx, rx) = tokio::io::duplex(64 * 1024);
    let (control, handle) = spawn_loop(rx, 10);
    control.start_recording();
    handle.wait_for_state(AcquisitionState::Armed).await;

    tx.write_all(&frame(1)).await.unwrap();
    tx.write_all(&100u32.to_be_bytes()).await.unwrap();
    tx.write_all(b"short").await.unwrap();
    drop(tx);

    let err = timeout(TEST_TIMEOUT, handle.join()).await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        FbgsError::Framing(FramingError::Truncated {
            expected: 100,
            received: 5
        })
    ));
}

#[tokio::test]
async fn closed_peer_ends_idle_session() {
    let (tx, rx) = tokio::io::duplex(1024);
    let (_control, handle) = spawn_loop(rx, 10);
    handle.wait_for_state(AcquisitionState::Armed).await;
    drop(tx);

    let err = timeout(TEST_TIMEOUT, handle.join()).await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        FbgsError::Framing(FramingError::ConnectionClosed { .. })
    ));
}

#[tokio::test]
async fn records_from_simulator_over_tcp() {
    let simulator = Simulator::bind("127.0.0.1:0".parse().unwrap(), Schema::ShapeSensing, 200.0)
        .await
        .unwrap();
    let addr = simulator.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(simulator.serve(shutdown_rx));

    let reader = FrameReader::connect("127.0.0.1", addr.port(), Duration::from_secs(2))
        .await
        .unwrap();
    let (control, ctx) = AcquisitionControl::new();
    control.start_recording();
    let handle = AcquisitionLoop::new(
        reader,
        SampleDecoder::shape_sensing(),
        HistoryBuffer::with_capacity(5),
        200.0,
    )
    .spawn(ctx);

    let recording = timeout(TEST_TIMEOUT, handle.join()).await.unwrap().unwrap();
    assert_eq!(recording.samples.len(), 5);
    assert!(recording
        .samples
        .windows(2)
        .all(|w| w[1].sample_number == w[0].sample_number + 1));
    assert!(recording.samples.iter().all(|s| s.num_sensors() == 1));

    let (header, _) = export(&recording).unwrap();
    assert_eq!(header.number_of_sensors, 1);
    assert_eq!(header.number_of_channels, 4);

    shutdown_tx.send_replace(true);
    timeout(TEST_TIMEOUT, server).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn simulator_closes_after_frame_limit() {
    let radius = 50e-6;
    let simulator = Simulator::bind("127.0.0.1:0".parse().unwrap(), Schema::MulticoreFiber, 500.0)
        .await
        .unwrap()
        .with_core_radius(radius)
        .with_frame_limit(3);
    let addr = simulator.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(simulator.serve(shutdown_rx));

    let mut reader = FrameReader::connect("127.0.0.1", addr.port(), Duration::from_secs(2))
        .await
        .unwrap();
    let decoder = SampleDecoder::multicore(StrainInverter::new(radius));
    for expected in 1..=3 {
        let frame = timeout(TEST_TIMEOUT, reader.read_frame()).await.unwrap().unwrap();
        let sample = decoder.decode(&frame, chrono::Utc::now()).unwrap();
        assert_eq!(sample.sample_number, expected);
        let Sensor::Multicore(sensor) = &sample.sensors[0] else {
            panic!("expected multicore sensor");
        };
        assert!(sensor.invalid_points.is_empty());
    }

    let err = timeout(TEST_TIMEOUT, reader.read_frame()).await.unwrap().unwrap_err();
    assert!(matches!(err, FramingError::ConnectionClosed { buffered: 0 }));

    shutdown_tx.send_replace(true);
    timeout(TEST_TIMEOUT, server).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = FrameReader::connect("127.0.0.1", port, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, FbgsError::Connection { .. }));
}
