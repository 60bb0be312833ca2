//! TCP Frame I/O
//!
//! Length-prefixed framing over one socket: every frame is preceded by a
//! 4-byte big-endian length. Reader and writer halves are owned by separate
//! tasks so a slow reader never blocks concurrent sends.

use crate::error::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use codec::FRAME_LENGTH_PREFIX;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};
use types::ProtocolError;

/// Result of one read from a socket
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Frame(Bytes),
    /// Peer closed the socket between frames
    EndOfStream,
}

/// Split a connected stream into its framed halves
pub fn split(
    stream: TcpStream,
    max_frame_size: usize,
) -> Result<(FrameReader, FrameWriter, SocketAddr)> {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }
    let peer = stream
        .peer_addr()
        .map_err(|e| TransportError::io("Failed to get peer address", e))?;

    let (read, write) = stream.into_split();
    Ok((
        FrameReader::new(read, Some(peer), max_frame_size),
        FrameWriter::new(write, Some(peer), max_frame_size),
        peer,
    ))
}

/// Reads length-prefixed frames
pub struct FrameReader<R = OwnedReadHalf> {
    stream: R,
    peer: Option<SocketAddr>,
    max_frame_size: usize,
    /// Reusable read buffer
    buffer: BytesMut,
    pub(crate) bytes_received: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R, peer: Option<SocketAddr>, max_frame_size: usize) -> Self {
        Self {
            stream,
            peer,
            max_frame_size,
            buffer: BytesMut::with_capacity(64 * 1024),
            bytes_received: 0,
        }
    }

    /// Read the next frame.
    ///
    /// A close before the first byte of a length prefix is a normal end of
    /// stream. A close anywhere inside a frame, or a frame larger than the
    /// configured maximum, is a decode failure.
    pub async fn read_frame(&mut self) -> Result<ReadOutcome> {
        let mut len_bytes = [0u8; FRAME_LENGTH_PREFIX];

        let first = self
            .stream
            .read(&mut len_bytes[..1])
            .await
            .map_err(|e| TransportError::io("Failed to read frame length", e))?;
        if first == 0 {
            debug!(peer = ?self.peer, "Peer closed connection");
            return Ok(ReadOutcome::EndOfStream);
        }
        self.stream
            .read_exact(&mut len_bytes[1..])
            .await
            .map_err(|e| self.truncated(e, FRAME_LENGTH_PREFIX, "frame length"))?;

        let frame_len = u32::from_be_bytes(len_bytes) as usize;
        if frame_len > self.max_frame_size {
            return Err(TransportError::decode(
                self.peer,
                ProtocolError::FieldTooLarge {
                    field: "frame",
                    size: frame_len,
                    limit: self.max_frame_size,
                },
            ));
        }

        self.buffer.clear();
        self.buffer.resize(frame_len, 0);
        self.stream
            .read_exact(&mut self.buffer[..])
            .await
            .map_err(|e| self.truncated(e, frame_len, "frame body"))?;

        self.bytes_received += (FRAME_LENGTH_PREFIX + frame_len) as u64;
        trace!(
            peer = ?self.peer,
            bytes = frame_len,
            total_received = self.bytes_received,
            "Received frame"
        );

        Ok(ReadOutcome::Frame(self.buffer.split_to(frame_len).freeze()))
    }

    /// Map an EOF inside a frame to a decode failure, anything else to I/O
    fn truncated(&self, error: std::io::Error, need: usize, context: &'static str) -> TransportError {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::decode(
                self.peer,
                ProtocolError::message_too_small(need, 0, context),
            )
        } else {
            TransportError::io(format!("Failed to read {context}"), error)
        }
    }
}

/// Writes length-prefixed frames
pub struct FrameWriter<W = OwnedWriteHalf> {
    stream: W,
    peer: Option<SocketAddr>,
    max_frame_size: usize,
    /// Reusable write buffer
    buffer: BytesMut,
    pub(crate) bytes_sent: u64,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(stream: W, peer: Option<SocketAddr>, max_frame_size: usize) -> Self {
        Self {
            stream,
            peer,
            max_frame_size,
            buffer: BytesMut::with_capacity(64 * 1024),
            bytes_sent: 0,
        }
    }

    /// Write one frame with its length prefix and flush
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > self.max_frame_size {
            return Err(TransportError::encode(ProtocolError::FieldTooLarge {
                field: "frame",
                size: frame.len(),
                limit: self.max_frame_size,
            }));
        }

        // Clear and reuse write buffer
        self.buffer.clear();
        self.buffer
            .extend_from_slice(&(frame.len() as u32).to_be_bytes());
        self.buffer.extend_from_slice(frame);

        // Single write call for better performance
        self.stream
            .write_all(&self.buffer)
            .await
            .map_err(|e| TransportError::io("Failed to write frame", e))?;
        self.stream
            .flush()
            .await
            .map_err(|e| TransportError::io("Failed to flush TCP stream", e))?;

        self.bytes_sent += (FRAME_LENGTH_PREFIX + frame.len()) as u64;
        trace!(
            peer = ?self.peer,
            bytes = frame.len(),
            total_sent = self.bytes_sent,
            "Sent frame"
        );
        Ok(())
    }

    /// Shut down the write side; errors are logged only
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = ?self.peer, "Error shutting down TCP stream: {}", e);
        }
    }
}
