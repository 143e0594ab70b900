//! Single request/reply steps over a secured channel.
//!
//! The reply length is the number of bytes just written. This only works
//! against a responder that echoes the request back; there is no framing.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

use crate::buffer::MessageBuffer;
use crate::error::{timed_out, Stage};

/// Read one line from `input` into the request buffer
///
/// The line terminator is dropped. Anything past the buffer capacity is cut
/// off; the remainder of an overlong line stays unread in `input`.
pub async fn read_request<R>(input: &mut R, buffer: &mut MessageBuffer) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    // Room for the payload plus a "\r\n" terminator
    let limit = (buffer.capacity() + 2) as u64;
    let mut line = Vec::with_capacity(buffer.capacity() + 2);
    input.take(limit).read_until(b'\n', &mut line).await?;

    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }

    if buffer.fill_request(&line) {
        warn!(
            component = "exchange",
            "Request truncated from {} to {} bytes",
            line.len(),
            buffer.capacity()
        );
    }
    Ok(buffer.request().len())
}

/// Write the whole payload and flush it onto the channel
pub async fn write_request<S>(stream: &mut S, payload: &[u8], timeout: Duration) -> io::Result<usize>
where
    S: AsyncWrite + Unpin,
{
    let write = async {
        stream.write_all(payload).await?;
        stream.flush().await?;
        Ok::<_, io::Error>(())
    };
    tokio::time::timeout(timeout, write)
        .await
        .map_err(|_| timed_out(Stage::Write, timeout))??;

    trace!(component = "exchange", "Wrote {} bytes", payload.len());
    Ok(payload.len())
}

/// Fill `slot` completely from the channel
pub async fn read_reply<S>(stream: &mut S, slot: &mut [u8], timeout: Duration) -> io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, stream.read_exact(slot))
        .await
        .map_err(|_| timed_out(Stage::Read, timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, BufReader};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_read_request_strips_terminator() {
        let mut buffer = MessageBuffer::default();

        let mut input = BufReader::new(&b"hello\r\nworld\n"[..]);
        assert_eq!(read_request(&mut input, &mut buffer).await.unwrap(), 5);
        assert_eq!(buffer.request(), b"hello");

        assert_eq!(read_request(&mut input, &mut buffer).await.unwrap(), 5);
        assert_eq!(buffer.request(), b"world");

        // EOF yields an empty request
        assert_eq!(read_request(&mut input, &mut buffer).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_request_without_newline() {
        let mut buffer = MessageBuffer::default();
        let mut input = BufReader::new(&b"no newline"[..]);
        assert_eq!(read_request(&mut input, &mut buffer).await.unwrap(), 10);
        assert_eq!(buffer.request(), b"no newline");
    }

    #[tokio::test]
    async fn test_read_request_truncates_overlong_line() {
        let mut buffer = MessageBuffer::new(8);
        let mut input = BufReader::new(&b"0123456789abcdef\n"[..]);

        assert_eq!(read_request(&mut input, &mut buffer).await.unwrap(), 8);
        assert_eq!(buffer.request(), b"01234567");
    }

    #[tokio::test]
    async fn test_reply_length_follows_write_length() {
        let (mut client, mut server) = duplex(64);

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = server.read(&mut buf).await.unwrap();
            // Echo plus trailing bytes that must not be consumed
            server.write_all(&buf[..n]).await.unwrap();
            server.write_all(b"extra").await.unwrap();
        });

        let written = write_request(&mut client, b"ping", TIMEOUT).await.unwrap();
        assert_eq!(written, 4);

        let mut reply = vec![0u8; written];
        read_reply(&mut client, &mut reply, TIMEOUT).await.unwrap();
        assert_eq!(reply, b"ping");
    }

    #[tokio::test]
    async fn test_short_reply_is_read_error() {
        let (mut client, mut server) = duplex(64);

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = server.read(&mut buf).await.unwrap();
            server.write_all(b"pi").await.unwrap();
            // dropping the peer ends the stream early
        });

        write_request(&mut client, b"ping", TIMEOUT).await.unwrap();
        let mut reply = [0u8; 4];
        let err = read_reply(&mut client, &mut reply, TIMEOUT).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out() {
        let (mut client, _server) = duplex(64);

        let mut reply = [0u8; 4];
        let err = read_reply(&mut client, &mut reply, TIMEOUT).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
