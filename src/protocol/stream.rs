//! Line transport between the engine and a remote terminal.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::config::LineEnding;

/// Read a line, write a line, close
///
/// Reads suspend until a full line arrives; timeouts belong to the transport.
#[async_trait]
pub trait StreamHandler: Send {
    /// Next line without its terminator, `None` at end of input
    ///
    /// A line that is not valid UTF-8 yields an `InvalidData` error; the stream
    /// stays usable afterwards.
    async fn read_line(&mut self) -> io::Result<Option<String>>;

    async fn write_line(&mut self, line: &str) -> io::Result<()>;

    async fn close(&mut self) -> io::Result<()>;
}

/// [`StreamHandler`] over any async reader/writer pair
#[derive(Debug)]
pub struct LineStream<R, W> {
    reader: BufReader<R>,
    writer: W,
    line_ending: LineEnding,
    buffer: Vec<u8>,
}

impl<R, W> LineStream<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, line_ending: LineEnding) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            line_ending,
            buffer: Vec::with_capacity(256),
        }
    }
}

impl LineStream<tokio::io::Stdin, tokio::io::Stdout> {
    /// The standard streams a remote shell hands to the session command
    pub fn stdio(line_ending: LineEnding) -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), line_ending)
    }
}

#[async_trait]
impl<R, W> StreamHandler for LineStream<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        self.buffer.clear();
        let read = self
            .reader
            .read_until(self.line_ending.delimiter(), &mut self.buffer)
            .await?;
        if read == 0 {
            return Ok(None);
        }

        if self.buffer.ends_with(self.line_ending.as_str().as_bytes()) {
            let keep = self.buffer.len() - self.line_ending.as_str().len();
            self.buffer.truncate(keep);
        } else if self.buffer.last() == Some(&self.line_ending.delimiter()) {
            self.buffer.pop();
        }
        // Terminals configured for LF still tend to send CRLF
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }

        String::from_utf8(std::mem::take(&mut self.buffer))
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut framed = String::with_capacity(line.len() + 2);
        framed.push_str(line);
        framed.push_str(self.line_ending.as_str());
        self.writer.write_all(framed.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_reads_lines_and_writes_framed_responses() {
        let reader = Builder::new().read(b"login B1\nstatus\r\n").build();
        let writer = Builder::new().write(b"OK ready\n").build();
        let mut stream = LineStream::new(reader, writer, LineEnding::Lf);

        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("login B1"));
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("status"));
        stream.write_line("OK ready").await.unwrap();
        assert_eq!(stream.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_crlf_line_ending() {
        let reader = Builder::new().read(b"commit\r\ncancel").build();
        let writer = Builder::new().write(b"OK done\r\n").build();
        let mut stream = LineStream::new(reader, writer, LineEnding::CrLf);

        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("commit"));
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("cancel"));
        stream.write_line("OK done").await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_poison_stream() {
        let reader = Builder::new().read(b"\xff\xfe\nquit\n").build();
        let writer = Builder::new().build();
        let mut stream = LineStream::new(reader, writer, LineEnding::Lf);

        let error = stream.read_line().await.unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("quit"));
    }
}
