//! Framed TCP Stream
//!
//! Both wire protocols (RESP and the memcached text protocol) follow the
//! same pattern: write a request, then accumulate socket data until a
//! complete reply can be parsed from the front of the buffer.
//!
//! ```text
//!   send(request) ──► BufWriter<TcpStream> ──► flush
//!
//!   read_frame(parse):
//!     loop {
//!       parse(buffer) ── Some((frame, n)) ──► advance n, return frame
//!                     └─ None ──► read_more() (EOF / limit = error)
//!     }
//! ```
//!
//! TCP is a stream protocol: one read may hold half a reply, or several.
//! Unconsumed bytes stay buffered for the next call.

use crate::error::{Result, StorageError};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::trace;

/// Default limit for buffered, not yet parsed reply data (64 MB).
pub const DEFAULT_MAX_BUFFER: usize = 64 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// A TCP connection with a read buffer and a buffered writer.
#[derive(Debug)]
pub struct FramedStream {
    /// The TCP stream, buffered for writes
    stream: BufWriter<TcpStream>,

    /// Remote address (for logging)
    peer: SocketAddr,

    /// Data read but not yet consumed
    buffer: BytesMut,

    /// Maximum bytes held in `buffer`
    max_buffer: usize,
}

impl FramedStream {
    /// Wraps an established stream.
    pub fn new(stream: TcpStream, max_buffer: usize) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream: BufWriter::new(stream),
            peer,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            max_buffer,
        })
    }

    /// Connects to `addr` within `timeout`.
    pub async fn connect(addr: &str, timeout: Duration, backend: &'static str) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| StorageError::Timeout { backend })?
            .map_err(|e| StorageError::backend(backend, format!("connect {}: {}", addr, e)))?;

        trace!(addr = %addr, "Connected");
        Self::new(stream, DEFAULT_MAX_BUFFER)
    }

    /// The remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Buffered, unconsumed data.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Drops `n` bytes from the front of the buffer.
    pub fn advance(&mut self, n: usize) {
        self.buffer.advance(n);
    }

    /// Writes `data` and flushes it to the socket.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        trace!(peer = %self.peer, bytes = data.len(), "Sent");
        Ok(())
    }

    /// Reads more data from the socket into the buffer.
    ///
    /// Fails on EOF, when the buffer limit is reached, or on I/O errors.
    pub async fn read_more(&mut self) -> Result<()> {
        if self.buffer.len() >= self.max_buffer {
            return Err(StorageError::Protocol(format!(
                "reply exceeds buffer limit of {} bytes",
                self.max_buffer
            )));
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("connection to {} closed", self.peer),
            )));
        }

        trace!(peer = %self.peer, bytes = n, "Read data");
        Ok(())
    }

    /// Reads until `parse` recognizes a complete frame, then consumes it.
    ///
    /// `parse` returns the frame and its length in bytes, or `None` when
    /// more data is needed.
    pub async fn read_frame<T, F>(&mut self, mut parse: F) -> Result<T>
    where
        F: FnMut(&[u8]) -> Result<Option<(T, usize)>>,
    {
        loop {
            if !self.buffer.is_empty() {
                if let Some((frame, consumed)) = parse(&self.buffer)? {
                    self.buffer.advance(consumed);
                    return Ok(frame);
                }
            }
            self.read_more().await?;
        }
    }
}
