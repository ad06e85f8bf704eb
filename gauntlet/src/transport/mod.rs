//! Terminal transport
//!
//! A [`LineTerminal`] turns any async byte stream into submitted lines and
//! accepts rendered frames. Reading happens on a dedicated task feeding an
//! `mpsc` channel, so waiting for the next line is cancel-safe inside the
//! session loop's `select!`.

pub mod stdio;
pub mod tcp;

use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::presentation::Theme;

pub use stdio::stdio_terminal;
pub use tcp::{bind_listener, reject_busy, tcp_terminal};

/// Longest accepted input line in bytes; the rest of the line is dropped.
pub const DEFAULT_MAX_LINE: usize = 4 * 1024;

/// Lines buffered between the reader task and the session loop.
const LINE_BUFFER: usize = 16;

/// Where a terminal is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The process's own stdin/stdout.
    Stdio,
    /// An accepted TCP connection.
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// A line-oriented terminal over an async reader/writer pair.
pub struct LineTerminal<W> {
    writer: W,
    lines: mpsc::Receiver<String>,
    reader: JoinHandle<()>,
    kind: TransportKind,
    peer: String,
}

impl<W> fmt::Debug for LineTerminal<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineTerminal")
            .field("kind", &self.kind)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl<W> LineTerminal<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Spawns the reader task and wraps `writer`.
    pub fn new<R>(
        reader: R,
        writer: W,
        kind: TransportKind,
        peer: impl Into<String>,
        max_line: usize,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let peer = peer.into();
        let reader = tokio::spawn(read_lines(BufReader::new(reader), tx, max_line));
        debug!(%kind, peer = %peer, "terminal opened");
        Self {
            writer,
            lines: rx,
            reader,
            kind,
            peer,
        }
    }

    /// Waits for the next submitted line; `None` once input has closed.
    ///
    /// Cancel-safe.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Writes a full frame, clearing the screen first when `theme` allows.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the peer is gone.
    pub async fn write_frame(&mut self, theme: &Theme, frame: &str) -> Result<(), TransportError> {
        self.writer.write_all(theme.frame_prefix().as_bytes()).await?;
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Writes one line of text.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the peer is gone.
    pub async fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Flushes and shuts down the write side.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if shutdown fails.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.reader.abort();
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    /// What the terminal is connected to.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Peer description for logs.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl<W> Drop for LineTerminal<W> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_lines<R>(mut reader: R, tx: mpsc::Sender<String>, max_line: usize)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_bounded_line(&mut reader, max_line).await {
            Ok(Some(line)) => {
                trace!(len = line.len(), "line received");
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "terminal read failed");
                break;
            }
        }
    }
}

/// Reads one `\n`-terminated line, keeping at most `max` bytes of it.
///
/// A trailing `\r` is stripped and invalid UTF-8 is replaced. Returns
/// `None` at end of input when no bytes were pending.
///
/// # Errors
///
/// Propagates read errors.
pub async fn read_bounded_line<R>(reader: &mut R, max: usize) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut saw_any = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if !saw_any {
                return Ok(None);
            }
            break;
        }
        saw_any = true;

        let (chunk, used, done) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (&available[..pos], pos + 1, true),
            None => (available, available.len(), false),
        };
        let room = max.saturating_sub(line.len());
        line.extend_from_slice(&chunk[..chunk.len().min(room)]);
        reader.consume(used);
        if done {
            break;
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_bounded_line_truncates() {
        let input = format!("{}\nnext\n", "x".repeat(20));
        let mut reader = BufReader::new(input.as_bytes());
        assert_eq!(
            read_bounded_line(&mut reader, 8).await.unwrap().as_deref(),
            Some("xxxxxxxx")
        );
        assert_eq!(
            read_bounded_line(&mut reader, 8).await.unwrap().as_deref(),
            Some("next")
        );
        assert_eq!(read_bounded_line(&mut reader, 8).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_crlf_and_trailing_partial() {
        let mut reader = BufReader::new(&b"hello\r\nbye"[..]);
        assert_eq!(
            read_bounded_line(&mut reader, 64).await.unwrap().as_deref(),
            Some("hello")
        );
        assert_eq!(
            read_bounded_line(&mut reader, 64).await.unwrap().as_deref(),
            Some("bye")
        );
        assert_eq!(read_bounded_line(&mut reader, 64).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"a@b")
            .read(b".com\r")
            .read(b"\nDDRR")
            .build();
        let mut reader = BufReader::new(mock);
        assert_eq!(
            read_bounded_line(&mut reader, 64).await.unwrap().as_deref(),
            Some("a@b.com")
        );
        assert_eq!(
            read_bounded_line(&mut reader, 64).await.unwrap().as_deref(),
            Some("DDRR")
        );
    }

    #[tokio::test]
    async fn test_terminal_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let mut term = LineTerminal::new(
            server_read,
            server_write,
            TransportKind::Tcp,
            "test",
            DEFAULT_MAX_LINE,
        );
        client_write.write_all(b"a@b.com\n").await.unwrap();
        assert_eq!(term.next_line().await.as_deref(), Some("a@b.com"));

        term.write_frame(&Theme::plain(), "hello\n").await.unwrap();
        term.close().await.unwrap();
        let mut out = String::new();
        client_read.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "\nhello\n");

        drop(client_write);
        assert_eq!(term.next_line().await, None);
    }
}
