//! Output sinks. Every byte of an archive funnels through one [`Sink`].

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Byte-oriented output target for an archive.
///
/// `write` may report fewer bytes than requested only by failing; the
/// archive writer never retries a short write. `close` is invoked exactly
/// once, when the session finishes or is dropped.
pub trait Sink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
    fn close(&mut self) -> io::Result<()>;
}

/// Default sink: a buffered file created at a caller-supplied path.
pub struct FileSink {
    file: BufWriter<File>,
}

impl FileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self {
            file: BufWriter::new(File::create(path)?),
        })
    }
}

impl Sink for FileSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file.write_all(data)?;
        Ok(data.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Adapts any [`io::Write`] into a [`Sink`].
pub struct WriteSink<W: Write> {
    inner: W,
}

impl<W: Write> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Sink for WriteSink<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inner.write_all(data)?;
        Ok(data.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Session-side wrapper around the sink: tracks the archive offset and
/// latches the first failure. Once latched, every subsequent write
/// short-circuits without touching the sink.
pub(crate) struct SinkStream {
    sink: Box<dyn Sink>,
    offset: u64,
    error: Option<io::Error>,
    closed: bool,
}

impl SinkStream {
    pub(crate) fn new(sink: Box<dyn Sink>) -> Self {
        Self {
            sink,
            offset: 0,
            error: None,
            closed: false,
        }
    }

    /// Bytes successfully handed to the sink so far.
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Closes the sink at most once; a close failure latches like a
    /// write failure unless an earlier error is already recorded.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.sink.close() {
            if self.error.is_none() {
                self.error = Some(err);
            }
        }
    }
}

impl Write for SinkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.error.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "archive output already failed",
            ));
        }
        match self.sink.write(buf) {
            Ok(written) => {
                self.offset += written as u64;
                if written == buf.len() {
                    Ok(written)
                } else {
                    self.error = Some(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "short write to archive sink",
                    ));
                    Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "short write to archive sink",
                    ))
                }
            }
            Err(err) => {
                self.error = Some(io::Error::new(err.kind(), err.to_string()));
                Err(err)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
