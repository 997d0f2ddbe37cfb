//! Container log relay.
//!
//! Copies a container's live log stream into the caller's sinks until the
//! stream ends. Interactive containers produce one raw stream; everything
//! else arrives frame-multiplexed and is split back into stdout and stderr.

use std::io;

use async_trait::async_trait;
use extender_core::log::{RelayMode, StreamKind, FRAME_HEADER_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Destination for relayed output.
pub type LogSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Caller-supplied output sinks.
pub struct LogSinks {
    pub stdout: LogSink,
    pub stderr: LogSink,
}

impl LogSinks {
    pub fn new(stdout: LogSink, stderr: LogSink) -> Self {
        Self { stdout, stderr }
    }

    /// The process's own stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(Box::new(tokio::io::stdout()), Box::new(tokio::io::stderr()))
    }

    /// Drop all output.
    pub fn discard() -> Self {
        Self::new(Box::new(tokio::io::sink()), Box::new(tokio::io::sink()))
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush().await?;
        self.stderr.flush().await
    }
}

/// Strategy for draining a log stream into sinks.
#[async_trait]
pub trait LogRelay: Send + Sync {
    /// Relay until the source ends, returning the number of payload bytes
    /// written.
    async fn relay(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        sinks: &mut LogSinks,
    ) -> io::Result<u64>;
}

/// Raw copy into the stdout sink, used for TTY containers.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergedRelay;

#[async_trait]
impl LogRelay for MergedRelay {
    async fn relay(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        sinks: &mut LogSinks,
    ) -> io::Result<u64> {
        let copied = tokio::io::copy(source, &mut sinks.stdout).await?;
        sinks.flush().await?;
        Ok(copied)
    }
}

/// Splits a frame-multiplexed stream by channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemuxRelay;

#[async_trait]
impl LogRelay for DemuxRelay {
    async fn relay(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        sinks: &mut LogSinks,
    ) -> io::Result<u64> {
        let mut total = 0u64;
        while let Some((kind, len)) = read_header(source).await? {
            let sink = match kind {
                StreamKind::Stdin | StreamKind::Stdout => &mut sinks.stdout,
                StreamKind::Stderr => &mut sinks.stderr,
                StreamKind::System => {
                    let mut message = Vec::new();
                    (&mut *source).take(len).read_to_end(&mut message).await?;
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!(
                            "engine reported a stream error: {}",
                            String::from_utf8_lossy(&message).trim()
                        ),
                    ));
                }
            };

            let copied = tokio::io::copy(&mut (&mut *source).take(len), sink).await?;
            if copied != len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("log frame truncated: got {} of {} bytes", copied, len),
                ));
            }
            total += copied;
        }
        sinks.flush().await?;
        Ok(total)
    }
}

/// Relay strategy for a mode.
pub fn relay_for(mode: RelayMode) -> Box<dyn LogRelay> {
    match mode {
        RelayMode::Interactive => Box::new(MergedRelay),
        RelayMode::Demux => Box::new(DemuxRelay),
    }
}

/// Read one frame header.
///
/// Returns `Ok(None)` on EOF at a frame boundary; EOF inside a header is an
/// error.
async fn read_header(
    source: &mut (dyn AsyncRead + Send + Unpin),
) -> io::Result<Option<(StreamKind, u64)>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let n = source.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("log frame header truncated after {} bytes", filled),
            ));
        }
        filled += n;
    }

    let kind = StreamKind::from_byte(header[0]).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown log stream type: {}", header[0]),
        )
    })?;
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    Ok(Some((kind, len as u64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use extender_core::log::frame_header;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl AsyncWrite for Capture {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn capture_sinks() -> (LogSinks, Capture, Capture) {
        let out = Capture::default();
        let err = Capture::default();
        let sinks = LogSinks::new(Box::new(out.clone()), Box::new(err.clone()));
        (sinks, out, err)
    }

    fn frame(kind: StreamKind, payload: &[u8]) -> Vec<u8> {
        let mut buf = frame_header(kind, payload.len() as u32).to_vec();
        buf.extend_from_slice(payload);
        buf
    }

    #[tokio::test]
    async fn test_demux_splits_channels_in_order() {
        let mut stream = Vec::new();
        stream.extend(frame(StreamKind::Stdout, b"one\n"));
        stream.extend(frame(StreamKind::Stderr, b"warn\n"));
        stream.extend(frame(StreamKind::Stdout, b"two\n"));
        stream.extend(frame(StreamKind::Stderr, b""));
        stream.extend(frame(StreamKind::Stdout, b"three\n"));

        let (mut sinks, out, err) = capture_sinks();
        let mut source = io::Cursor::new(stream);
        let total = DemuxRelay.relay(&mut source, &mut sinks).await.unwrap();

        assert_eq!(out.contents(), b"one\ntwo\nthree\n");
        assert_eq!(err.contents(), b"warn\n");
        assert_eq!(total, 19);
    }

    #[tokio::test]
    async fn test_demux_empty_stream() {
        let (mut sinks, out, err) = capture_sinks();
        let mut source = io::Cursor::new(Vec::new());
        assert_eq!(DemuxRelay.relay(&mut source, &mut sinks).await.unwrap(), 0);
        assert!(out.contents().is_empty());
        assert!(err.contents().is_empty());
    }

    #[tokio::test]
    async fn test_demux_truncated_payload() {
        let mut stream = frame(StreamKind::Stdout, b"complete");
        stream.extend(frame_header(StreamKind::Stdout, 10));
        stream.extend(b"short");

        let (mut sinks, out, _) = capture_sinks();
        let mut source = io::Cursor::new(stream);
        let err = DemuxRelay.relay(&mut source, &mut sinks).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        // Output relayed before the failure is kept.
        assert!(out.contents().starts_with(b"complete"));
    }

    #[tokio::test]
    async fn test_demux_truncated_header() {
        let mut stream = frame(StreamKind::Stdout, b"ok");
        stream.extend(&[1, 0, 0]);
        let (mut sinks, _, _) = capture_sinks();
        let mut source = io::Cursor::new(stream);
        let err = DemuxRelay.relay(&mut source, &mut sinks).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_demux_unknown_stream_type() {
        let mut stream = vec![9, 0, 0, 0, 0, 0, 0, 1];
        stream.push(b'x');
        let (mut sinks, _, _) = capture_sinks();
        let mut source = io::Cursor::new(stream);
        let err = DemuxRelay.relay(&mut source, &mut sinks).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_demux_system_frame_is_error() {
        let stream = frame(StreamKind::System, b"container gone");
        let (mut sinks, _, _) = capture_sinks();
        let mut source = io::Cursor::new(stream);
        let err = DemuxRelay.relay(&mut source, &mut sinks).await.unwrap_err();
        assert!(err.to_string().contains("container gone"));
    }

    #[tokio::test]
    async fn test_merged_copies_verbatim() {
        let raw = b"\x1b[32mgreen\x1b[0m\r\nplain\r\n".to_vec();
        let (mut sinks, out, err) = capture_sinks();
        let mut source = io::Cursor::new(raw.clone());
        let total = MergedRelay.relay(&mut source, &mut sinks).await.unwrap();
        assert_eq!(total, raw.len() as u64);
        assert_eq!(out.contents(), raw);
        assert!(err.contents().is_empty());
    }

    #[tokio::test]
    async fn test_relay_for_mode() {
        let stream = frame(StreamKind::Stderr, b"e");
        let (mut sinks, out, err) = capture_sinks();
        let mut source = io::Cursor::new(stream.clone());
        relay_for(RelayMode::Demux)
            .relay(&mut source, &mut sinks)
            .await
            .unwrap();
        assert_eq!(err.contents(), b"e");
        assert!(out.contents().is_empty());

        let (mut sinks, out, _) = capture_sinks();
        let mut source = io::Cursor::new(stream.clone());
        relay_for(RelayMode::Interactive)
            .relay(&mut source, &mut sinks)
            .await
            .unwrap();
        assert_eq!(out.contents(), stream);
    }
}
