use std::io::{self, Write};

use lz4_flex::frame::FrameEncoder;

use crate::error::SinkError;

/// Destination for serialized log data.
///
/// Implementations decide what happens with the bytes produced by
/// [`Session::consume`](crate::Session::consume): write them to a file, a
/// socket, memory, or a compressor. The sink is owned by the application and
/// handed to `consume` by mutable reference, so one sink is only ever used by
/// one `consume` call at a time.
///
/// A sink does not retry. Once a write fails it should report
/// [`has_failed`](OutputSink::has_failed) so the application can inspect the
/// failure after `consume` returns, the same way it would check a stream's
/// error flag.
///
/// # Usage
///
/// ```
/// # use binlog::{OutputSink, SinkError};
/// // Sink that only counts bytes
/// #[derive(Default)]
/// struct CountingSink(usize);
///
/// impl OutputSink for CountingSink {
///     fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
///         self.0 += bytes.len();
///         Ok(())
///     }
///
///     fn has_failed(&self) -> bool {
///         false
///     }
/// }
/// ```
pub trait OutputSink {
    /// Writes all of `bytes`, or reports why it could not.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Pushes buffered bytes towards the destination.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Whether an earlier write or flush failed.
    fn has_failed(&self) -> bool;
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        (**self).write_bytes(bytes)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }

    fn has_failed(&self) -> bool {
        (**self).has_failed()
    }
}

/// In-memory sink. Never fails.
impl OutputSink for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.extend_from_slice(bytes);
        Ok(())
    }

    fn has_failed(&self) -> bool {
        false
    }
}

/// Sink over any [`Write`] implementation.
///
/// The first I/O error is latched: the sink reports
/// [`has_failed`](OutputSink::has_failed) from then on and refuses further
/// writes with [`SinkError::Poisoned`], so a partially written stream is never
/// extended with bytes that would not line up with what reached the
/// destination.
///
/// ```
/// # use binlog::{IoSink, OutputSink};
/// let mut sink = IoSink::new(Vec::new());
/// sink.write_bytes(b"abc").unwrap();
/// assert!(!sink.has_failed());
/// assert_eq!(sink.into_inner(), b"abc");
/// ```
#[derive(Debug)]
pub struct IoSink<W: Write> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: Write> IoSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    /// The error that put the sink into its failed state.
    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn latch(&mut self, err: io::Error) -> SinkError {
        tracing::warn!(error = %err, "output sink failed");
        let kind = err.kind();
        let message = err.to_string();
        self.error = Some(err);
        SinkError::Io(io::Error::new(kind, message))
    }
}

impl<W: Write> OutputSink for IoSink<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if self.error.is_some() {
            return Err(SinkError::Poisoned);
        }
        self.inner.write_all(bytes).map_err(|err| self.latch(err))
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        if self.error.is_some() {
            return Err(SinkError::Poisoned);
        }
        self.inner.flush().map_err(|err| self.latch(err))
    }

    fn has_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Sink that LZ4 frame-compresses the stream before handing it to `W`.
///
/// The output is a standard LZ4 frame; decompress it with
/// [`lz4_flex::frame::FrameDecoder`] before reading it with
/// [`LogReader`](crate::LogReader). Call [`finish`](Lz4Sink::finish) to write
/// the frame trailer.
pub struct Lz4Sink<W: Write> {
    inner: IoSink<FrameEncoder<W>>,
}

impl<W: Write> Lz4Sink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: IoSink::new(FrameEncoder::new(writer)),
        }
    }

    /// Completes the frame and returns the underlying writer.
    pub fn finish(self) -> Result<W, SinkError> {
        if self.inner.has_failed() {
            return Err(SinkError::Poisoned);
        }
        Ok(self.inner.into_inner().finish()?)
    }
}

impl<W: Write> OutputSink for Lz4Sink<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.inner.write_bytes(bytes)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.inner.flush()
    }

    fn has_failed(&self) -> bool {
        self.inner.has_failed()
    }
}
