//! stdio transport for MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! # Lifecycle
//!
//! A transport is bound to a cancellation token by [`Transport::start`] and
//! released by [`Transport::stop`]. Every read and write checks the bound
//! token first and fails fast once it has been cancelled. End of input is
//! reported as [`TransportError::Closed`] so callers can tell "no more work"
//! apart from a real I/O failure.
//!
//! # Thread Safety
//!
//! The transport is shared behind an `Arc`. Reader and writer halves sit
//! behind separate async mutexes so a write never waits on a pending read.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::config::{ServerSettings, TransportKind};

/// Errors produced by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The input stream reached end-of-file.
    #[error("stream closed")]
    Closed,

    /// The transport's context was cancelled.
    #[error("transport cancelled")]
    Cancelled,

    /// `read_message`/`write_message` was called before `start`.
    #[error("transport not started")]
    NotStarted,

    /// `start` was called on a running transport.
    #[error("transport already started")]
    AlreadyStarted,

    /// An outgoing message contained a newline.
    #[error("message contains an embedded newline")]
    EmbeddedNewline,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A framed, bidirectional message channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Binds the transport to a child of `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadyStarted`] if the transport is already
    /// bound to a live context.
    fn start(&self, ctx: &CancellationToken) -> Result<(), TransportError>;

    /// Cancels the bound context and flushes pending output.
    ///
    /// Stopping a stopped transport is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    async fn stop(&self) -> Result<(), TransportError>;

    /// Blocks until a full message is available and returns it without its
    /// line terminator.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] at end of input,
    /// [`TransportError::Cancelled`] once the context is cancelled, or an I/O
    /// error.
    async fn read_message(&self) -> Result<Vec<u8>, TransportError>;

    /// Writes one message followed by a line terminator and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is cancelled, the message contains a
    /// newline, or writing fails.
    async fn write_message(&self, message: &[u8]) -> Result<(), TransportError>;
}

/// Newline-delimited transport over any async reader/writer pair.
pub struct LineTransport<R, W> {
    reader: tokio::sync::Mutex<BufReader<R>>,
    writer: tokio::sync::Mutex<W>,
    ctx: Mutex<Option<CancellationToken>>,
}

/// The production transport: stdin in, stdout out.
pub type StdioTransport = LineTransport<tokio::io::Stdin, tokio::io::Stdout>;

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a transport over `reader` and `writer`.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: tokio::sync::Mutex::new(BufReader::new(reader)),
            writer: tokio::sync::Mutex::new(writer),
            ctx: Mutex::new(None),
        }
    }

    /// Returns the bound context, failing if unbound or cancelled.
    fn bound(&self) -> Result<CancellationToken, TransportError> {
        let guard = self.ctx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            None => Err(TransportError::NotStarted),
            Some(ctx) if ctx.is_cancelled() => Err(TransportError::Cancelled),
            Some(ctx) => Ok(ctx.clone()),
        }
    }
}

impl StdioTransport {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn start(&self, ctx: &CancellationToken) -> Result<(), TransportError> {
        let mut guard = self.ctx.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref().is_some_and(|bound| !bound.is_cancelled()) {
            return Err(TransportError::AlreadyStarted);
        }
        *guard = Some(ctx.child_token());
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let ctx = self
            .ctx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(ctx) = ctx else {
            return Ok(());
        };
        ctx.cancel();

        self.writer.lock().await.flush().await?;
        Ok(())
    }

    async fn read_message(&self) -> Result<Vec<u8>, TransportError> {
        let ctx = self.bound()?;
        let mut reader = self.reader.lock().await;
        let mut line = Vec::new();

        let bytes_read = tokio::select! {
            () = ctx.cancelled() => return Err(TransportError::Cancelled),
            read = reader.read_until(b'\n', &mut line) => read?,
        };

        if bytes_read == 0 {
            return Err(TransportError::Closed);
        }

        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        Ok(line)
    }

    async fn write_message(&self, message: &[u8]) -> Result<(), TransportError> {
        self.bound()?;

        // stdio framing: one message per line, no embedded newlines
        if message.contains(&b'\n') {
            return Err(TransportError::EmbeddedNewline);
        }

        let mut writer = self.writer.lock().await;
        writer.write_all(message).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        Ok(())
    }
}

/// Builds the transport selected by the server settings.
#[must_use]
pub fn from_settings(settings: &ServerSettings) -> Arc<dyn Transport> {
    match settings.transport {
        TransportKind::Stdio => Arc::new(StdioTransport::stdio()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn reading(input: &[u8]) -> LineTransport<tokio_test::io::Mock, tokio::io::Sink> {
        LineTransport::new(Builder::new().read(input).build(), tokio::io::sink())
    }

    #[tokio::test]
    async fn read_strips_terminators() {
        let transport = reading(b"first\r\nsecond\nthird");
        transport.start(&CancellationToken::new()).unwrap();

        assert_eq!(transport.read_message().await.unwrap(), b"first");
        assert_eq!(transport.read_message().await.unwrap(), b"second");
        assert_eq!(transport.read_message().await.unwrap(), b"third");
        assert!(matches!(
            transport.read_message().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn write_appends_newline() {
        let writer = Builder::new().write(b"{\"id\":1}\n").build();
        let transport = LineTransport::new(tokio::io::empty(), writer);
        transport.start(&CancellationToken::new()).unwrap();

        transport.write_message(br#"{"id":1}"#).await.unwrap();
    }

    #[tokio::test]
    async fn write_rejects_embedded_newline() {
        let transport = LineTransport::new(tokio::io::empty(), tokio::io::sink());
        transport.start(&CancellationToken::new()).unwrap();

        assert!(matches!(
            transport.write_message(b"a\nb").await,
            Err(TransportError::EmbeddedNewline)
        ));
    }

    #[tokio::test]
    async fn io_before_start_fails() {
        let transport = LineTransport::new(tokio::io::empty(), tokio::io::sink());
        assert!(matches!(
            transport.read_message().await,
            Err(TransportError::NotStarted)
        ));
        assert!(matches!(
            transport.write_message(b"x").await,
            Err(TransportError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_fails_fast_afterwards() {
        let transport = LineTransport::new(tokio::io::empty(), tokio::io::sink());
        transport.start(&CancellationToken::new()).unwrap();

        transport.stop().await.unwrap();
        transport.stop().await.unwrap();

        assert!(matches!(
            transport.write_message(b"x").await,
            Err(TransportError::Cancelled)
        ));
        assert!(matches!(
            transport.read_message().await,
            Err(TransportError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn parent_cancellation_propagates() {
        let transport = LineTransport::new(tokio::io::empty(), tokio::io::sink());
        let parent = CancellationToken::new();
        transport.start(&parent).unwrap();

        parent.cancel();
        assert!(matches!(
            transport.read_message().await,
            Err(TransportError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn cancel_unblocks_pending_read() {
        let (_client, server) = tokio::io::duplex(64);
        let transport = Arc::new(LineTransport::new(server, tokio::io::sink()));
        let ctx = CancellationToken::new();
        transport.start(&ctx).unwrap();

        let reader = Arc::clone(&transport);
        let pending = tokio::spawn(async move { reader.read_message().await });
        tokio::task::yield_now().await;

        ctx.cancel();
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(TransportError::Cancelled)));
    }

    #[tokio::test]
    async fn double_start_rejected_until_stopped() {
        let transport = LineTransport::new(tokio::io::empty(), tokio::io::sink());
        let ctx = CancellationToken::new();
        transport.start(&ctx).unwrap();
        assert!(matches!(
            transport.start(&ctx),
            Err(TransportError::AlreadyStarted)
        ));

        transport.stop().await.unwrap();
        transport.start(&ctx).unwrap();
    }

    #[test]
    fn transport_is_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StdioTransport>();
    }
}
