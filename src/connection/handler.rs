//! Connection Handler
//!
//! Each client gets its own handler task that runs in a loop, reading
//! frames and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from stream  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ FrameReader::next_frame │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Dispatcher::dispatch    │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Write reply             │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects, or a malformed frame is answered and the
//!    connection closed
//! ```
//!
//! TCP is a stream protocol: one read may carry half a command or several
//! commands. The [`FrameReader`] buffers partial input and yields complete
//! frames in order.

use crate::commands::Dispatcher;
use crate::protocol::{Command, FrameReader, ProtocolError, RespValue};
use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Most input buffered beyond what the frame in progress has declared.
///
/// A frame may grow past this only through bulk lengths its headers have
/// already announced.
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Minimum spare capacity before each read
const READ_RESERVE: usize = 4096;

/// Errors that can end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed request; the client was sent an error reply first
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Client disconnected between commands
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Stream ended in the middle of a frame
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Serves one client over any byte stream.
///
/// Generic over the transport so tests can drive it with scripted I/O.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Peer label for logging
    peer: String,

    reader: FrameReader,

    dispatcher: Dispatcher,
}

impl<S> fmt::Debug for ConnectionHandler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("peer", &self.peer)
            .field("buffered", &self.reader.buffered())
            .finish()
    }
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: impl fmt::Display, dispatcher: Dispatcher) -> Self {
        Self {
            stream: BufWriter::new(stream),
            peer: peer.to_string(),
            reader: FrameReader::new(),
            dispatcher,
        }
    }

    /// Runs the connection until the client leaves or an error occurs.
    ///
    /// A clean disconnect between commands returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.peer, "Client connected");

        let result = match self.main_loop().await {
            Err(ConnectionError::ClientDisconnected) => Ok(()),
            other => other,
        };

        match &result {
            Ok(()) => info!(client = %self.peer, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.peer, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.peer, error = %e, "Connection closed with error"),
        }

        result
    }

    /// The read-dispatch-reply loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            loop {
                let command = match self.next_command() {
                    Ok(Some(command)) => command,
                    Ok(None) => break,
                    Err(e) => return self.reject(e).await,
                };

                let response = self.dispatcher.dispatch(&command);
                self.write_response(&response).await?;
            }

            // Replies for a pipelined batch go out together
            self.stream.flush().await?;
            self.read_more_data().await?;
        }
    }

    /// Takes the next complete command off the buffer.
    fn next_command(&mut self) -> Result<Option<Command>, ProtocolError> {
        let frame = match self.reader.next_frame()? {
            Some(frame) => frame,
            None => {
                trace!(
                    client = %self.peer,
                    buffered = self.reader.buffered(),
                    "Incomplete frame, need more data"
                );
                return Ok(None);
            }
        };

        let command = Command::from_frame(frame)?;
        trace!(
            client = %self.peer,
            command = command.name(),
            remaining = self.reader.buffered(),
            "Decoded command"
        );
        Ok(Some(command))
    }

    /// Answers a malformed request, then ends the connection.
    async fn reject(&mut self, e: ProtocolError) -> Result<(), ConnectionError> {
        warn!(client = %self.peer, error = %e, "Protocol error");

        let reply = RespValue::error(format!("ERR Protocol error: {}", e));
        self.write_response(&reply).await?;
        self.stream.flush().await?;
        self.reader.clear();

        Err(ConnectionError::Protocol(e))
    }

    /// Reads more data from the stream into the frame buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        let limit = self.reader.claimed() + MAX_BUFFER_SIZE;
        if self.reader.buffered() >= limit {
            error!(
                client = %self.peer,
                size = self.reader.buffered(),
                limit,
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        let buffer = self.reader.buffer_mut();
        buffer.reserve(READ_RESERVE);
        let n = self.stream.get_mut().read_buf(buffer).await?;

        if n == 0 {
            return if self.reader.buffered() == 0 {
                Err(ConnectionError::ClientDisconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        trace!(client = %self.peer, bytes = n, "Read data");
        Ok(())
    }

    /// Queues a reply; the caller flushes.
    async fn write_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        trace!(client = %self.peer, bytes = bytes.len(), "Queued response");
        Ok(())
    }
}

/// Serves one accepted TCP client to completion.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, dispatcher: Dispatcher) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
    }

    // Errors are already logged by `run`
    let _ = ConnectionHandler::new(stream, addr, dispatcher).run().await;
}
