//! Length-prefixed framing over a byte stream.
//!
//! Each frame on the wire is a 4-byte big-endian unsigned length `N` followed
//! by exactly `N` payload bytes. There is no magic number, checksum or
//! delimiter, so a stream that loses alignment cannot be resynchronized and
//! every framing failure ends the session.
//!
//! [`FrameReader`] buffers whatever the transport has delivered so that
//! [`FrameReader::frame_ready`] can answer without blocking, while
//! [`FrameReader::read_frame`] waits until a complete frame is buffered.

use crate::error::{AppResult, FbgsError, FramingError};
use bytes::{BufMut, Bytes, BytesMut};
use futures::FutureExt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on a single payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Splits a byte stream into opaque frame payloads.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buffer: BytesMut,
    max_frame_len: usize,
    eof: bool,
}

impl FrameReader<TcpStream> {
    /// Connect to the interrogator's TCP endpoint.
    ///
    /// # Errors
    /// * [`FbgsError::ConnectionTimeout`] if no connection within `connect_timeout`
    /// * [`FbgsError::Connection`] if resolution or connection fails
    pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> AppResult<Self> {
        let address = format!("{}:{}", host, port);
        info!(%address, "Establishing connection to interrogator");

        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| FbgsError::ConnectionTimeout {
                address: address.clone(),
                timeout_ms: connect_timeout.as_millis() as u64,
            })?
            .map_err(|source| FbgsError::Connection {
                address: address.clone(),
                source,
            })?;

        // Disable Nagle's algorithm for low latency
        stream
            .set_nodelay(true)
            .map_err(|source| FbgsError::Connection {
                address: address.clone(),
                source,
            })?;

        if let Ok(peer) = stream.peer_addr() {
            info!(%peer, "Connected to interrogator");
        }
        Ok(Self::new(stream))
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a connected byte stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            eof: false,
        }
    }

    /// Reject payloads longer than `max` bytes.
    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }

    /// Bytes received but not yet consumed as frames.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether at least a length prefix is available without blocking.
    ///
    /// Pulls whatever the transport has already delivered into the internal
    /// buffer but never waits for more.
    ///
    /// # Errors
    /// [`FramingError::ConnectionClosed`] once the peer has closed and fewer
    /// than [`LENGTH_PREFIX_LEN`] bytes remain.
    pub fn frame_ready(&mut self) -> Result<bool, FramingError> {
        while self.buffer.len() < LENGTH_PREFIX_LEN && !self.eof {
            self.buffer.reserve(READ_CHUNK);
            match self.inner.read_buf(&mut self.buffer).now_or_never() {
                Some(Ok(0)) => self.eof = true,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(FramingError::Io(e)),
                None => break,
            }
        }

        if self.buffer.len() >= LENGTH_PREFIX_LEN {
            Ok(true)
        } else if self.eof {
            Err(FramingError::ConnectionClosed {
                buffered: self.buffer.len(),
            })
        } else {
            Ok(false)
        }
    }

    /// Read one complete frame and return its payload.
    ///
    /// Callers should gate on [`frame_ready`](Self::frame_ready); this call
    /// waits for as long as the transport takes to deliver the frame.
    ///
    /// # Errors
    /// * [`FramingError::ConnectionClosed`] if the stream ends inside the prefix
    /// * [`FramingError::Truncated`] if it ends inside the payload
    /// * [`FramingError::FrameTooLarge`] if the prefix exceeds the limit
    pub async fn read_frame(&mut self) -> Result<Bytes, FramingError> {
        if !self.fill_to(LENGTH_PREFIX_LEN).await? {
            return Err(FramingError::ConnectionClosed {
                buffered: self.buffer.len(),
            });
        }

        let length = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;

        if length > self.max_frame_len {
            return Err(FramingError::FrameTooLarge {
                length,
                max: self.max_frame_len,
            });
        }

        let total = LENGTH_PREFIX_LEN + length;
        if !self.fill_to(total).await? {
            return Err(FramingError::Truncated {
                expected: length,
                received: self.buffer.len() - LENGTH_PREFIX_LEN,
            });
        }

        let mut frame = self.buffer.split_to(total);
        let payload = frame.split_off(LENGTH_PREFIX_LEN).freeze();
        debug!(bytes = length, "Read frame");
        Ok(payload)
    }

    /// Wait until `wanted` bytes are buffered. Returns `false` if the stream
    /// ended first.
    async fn fill_to(&mut self, wanted: usize) -> std::io::Result<bool> {
        while self.buffer.len() < wanted {
            if self.eof {
                return Ok(false);
            }
            self.buffer
                .reserve((wanted - self.buffer.len()).max(READ_CHUNK));
            if self.inner.read_buf(&mut self.buffer).await? == 0 {
                self.eof = true;
            }
        }
        Ok(true)
    }
}

/// Wire form of a payload: big-endian length prefix followed by the bytes.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    frame.freeze()
}
