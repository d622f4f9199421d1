#![forbid(unsafe_code)]

use std::io::{self, Write};

use log::*;

use crate::engine::{CompressConfig, Compressor, StepStatus};
use crate::error::{EngineError, Error, Result};

////////////////////////////////////////////////////////////////////////////////

/// Size of the staging buffer the engine compresses into before the bytes
/// are handed to the sink.
const STAGING_SIZE: usize = 4096;

/// Streaming compressor writing to any [`io::Write`] sink.
///
/// The compression engine is created lazily on the first
/// [`write`](Writer::write), using the construction-time configuration.
/// [`try_finish`](Writer::try_finish) terminates the compressed stream
/// and releases the engine; a later `write` starts a fresh stream.
/// [`close`](Writer::close) finishes and then refuses all further use.
///
/// Nothing is finished implicitly: dropping an unfinished `Writer`
/// abandons buffered engine state, so call `close` (or `try_finish`)
/// before letting one go.
///
/// ```
/// use bzstream::Writer;
///
/// let mut writer = Writer::new(Vec::new());
/// writer.write(b"payload")?;
/// writer.close()?;
/// let compressed = writer.into_inner();
/// assert_eq!(bzstream::decompress(&compressed)?, b"payload");
/// # Ok::<(), bzstream::Error>(())
/// ```
pub struct Writer<W: Write> {
    sink: W,
    config: CompressConfig,
    engine: Option<Compressor>,
    staging: Vec<u8>,
    closed: bool,
}

impl<W: Write> std::fmt::Debug for Writer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("config", &self.config)
            .field("engine_initialized", &self.engine.is_some())
            .field("staging_len", &self.staging.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl<W: Write> Writer<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            config: CompressConfig::default(),
            engine: None,
            staging: vec![0; STAGING_SIZE],
            closed: false,
        }
    }

    /// Construct with explicit compression parameters. Out-of-range
    /// parameters are rejected here, before any engine exists.
    pub fn with_config(sink: W, config: CompressConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sink,
            config,
            engine: None,
            staging: vec![0; STAGING_SIZE],
            closed: false,
        })
    }

    /// Compress `data` into the stream, draining the staging buffer to
    /// the sink whenever the engine fills it. Returns the number of input
    /// bytes accepted, which is always `data.len()`.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        self.ensure_started();
        let mut rest = data;
        while !rest.is_empty() {
            let step = {
                let spare = &mut self.staging[..];
                match self.engine.as_mut() {
                    Some(engine) => engine.run(rest, spare),
                    None => Err(EngineError::Sequence),
                }
            };
            let step = match step {
                Ok(step) => step,
                Err(kind) => {
                    // The engine cannot continue after a fatal condition.
                    self.engine = None;
                    return Err(Error::Engine(kind));
                }
            };
            rest = &rest[step.consumed..];
            if step.produced > 0 {
                self.sink.write_all(&self.staging[..step.produced])?;
            }
        }
        Ok(data.len())
    }

    /// Compress a single byte.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])?;
        Ok(())
    }

    /// Terminate the compressed stream: drive the engine to its logical
    /// end, write out everything it still holds and flush the sink. The
    /// engine is released and cannot be resumed; a subsequent
    /// [`write`](Writer::write) starts a fresh, independent stream.
    ///
    /// A no-op when nothing has been written since construction or since
    /// the last finish.
    pub fn try_finish(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.finish_stream()
    }

    /// Finish the stream and refuse all further use. Calling `close` on
    /// an already-closed writer fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        self.try_finish()?;
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Recover the sink. For an in-memory writer over `Vec<u8>` this is
    /// the accumulated compressed stream; make sure the stream was
    /// finished first.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Create the engine on first use, with the construction-time
    /// parameters. Also runs after a finish, starting the next stream.
    fn ensure_started(&mut self) {
        if self.engine.is_none() {
            self.engine = Some(Compressor::new(&self.config));
        }
    }

    fn finish_stream(&mut self) -> Result<()> {
        if self.engine.is_some() {
            debug!("finishing compressed stream");
        }
        loop {
            let step = {
                let spare = &mut self.staging[..];
                match self.engine.as_mut() {
                    Some(engine) => engine.finish(spare),
                    None => return Ok(()),
                }
            };
            let step = match step {
                Ok(step) => step,
                Err(kind) => {
                    self.engine = None;
                    return Err(Error::Engine(kind));
                }
            };
            if step.produced > 0 {
                self.sink.write_all(&self.staging[..step.produced])?;
            }
            if step.status == StepStatus::Finished {
                break;
            }
        }
        self.engine = None;
        self.sink.flush()?;
        Ok(())
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Writer::write(self, buf).map_err(Error::into_io)
    }

    /// Flushes the sink only. Terminating the compressed stream stays
    /// explicit via [`Writer::try_finish`] or [`Writer::close`].
    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decompress, Reader};

    #[test]
    fn write_reports_the_input_length() {
        let mut writer = Writer::new(Vec::new());
        assert_eq!(writer.write(b"abc").unwrap(), 3);
        assert_eq!(writer.write(b"").unwrap(), 0);
        writer.close().unwrap();
    }

    #[test]
    fn close_then_into_inner_round_trips() {
        let mut writer = Writer::new(Vec::new());
        writer.write(b"compressed payload").unwrap();
        writer.close().unwrap();
        let compressed = writer.into_inner();
        assert_eq!(decompress(&compressed).unwrap(), b"compressed payload");
    }

    #[test]
    fn empty_stream_is_valid() {
        let mut writer = Writer::new(Vec::new());
        writer.write(b"").unwrap();
        writer.close().unwrap();
        let compressed = writer.into_inner();
        assert!(!compressed.is_empty());
        assert_eq!(decompress(&compressed).unwrap(), b"");
    }

    #[test]
    fn close_twice_fails_with_closed() {
        let mut writer = Writer::new(Vec::new());
        writer.write(b"x").unwrap();
        writer.close().unwrap();
        assert!(writer.is_closed());
        assert!(matches!(writer.close().unwrap_err(), Error::Closed));
        assert!(matches!(writer.write(b"y").unwrap_err(), Error::Closed));
    }

    #[test]
    fn finish_is_a_noop_without_writes() {
        let mut writer = Writer::new(Vec::new());
        writer.try_finish().unwrap();
        writer.close().unwrap();
        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn write_after_finish_starts_a_second_stream() {
        let mut writer = Writer::new(Vec::new());
        writer.write(b"first").unwrap();
        writer.try_finish().unwrap();
        writer.write(b"second").unwrap();
        writer.close().unwrap();
        let compressed = writer.into_inner();

        // The reader stops at the first stream's logical end; the second
        // stream is left over as unused input.
        let mut reader = Reader::new(&compressed[..]);
        assert_eq!(reader.read_all().unwrap().as_deref(), Some(&b"first"[..]));
        let rest = reader.unused().unwrap();
        assert_eq!(decompress(&rest).unwrap(), b"second");
    }

    #[test]
    fn write_byte_appends_single_bytes() {
        let mut writer = Writer::new(Vec::new());
        for &byte in b"abc" {
            writer.write_byte(byte).unwrap();
        }
        writer.close().unwrap();
        assert_eq!(decompress(&writer.into_inner()).unwrap(), b"abc");
    }

    #[test]
    fn configured_block_size_round_trips() {
        let config = CompressConfig {
            block_size_100k: 1,
            work_factor: 30,
        };
        let mut writer = Writer::with_config(Vec::new(), config).unwrap();
        writer.write(b"configured stream").unwrap();
        writer.close().unwrap();
        assert_eq!(
            decompress(&writer.into_inner()).unwrap(),
            b"configured stream"
        );
    }

    #[test]
    fn invalid_config_is_rejected_eagerly() {
        let bad = CompressConfig {
            block_size_100k: 10,
            work_factor: 0,
        };
        assert!(matches!(
            Writer::with_config(Vec::new(), bad).unwrap_err(),
            Error::InvalidConfig(_)
        ));
    }

    #[test]
    fn io_write_interop() {
        let mut writer = Writer::new(Vec::new());
        let mut data = &b"via io::copy"[..];
        io::copy(&mut data, &mut writer).unwrap();
        writer.close().unwrap();
        assert_eq!(decompress(&writer.into_inner()).unwrap(), b"via io::copy");
    }

    #[test]
    fn large_input_spans_many_staging_drains() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut writer = Writer::new(Vec::new());
        writer.write(&data).unwrap();
        writer.close().unwrap();
        let compressed = writer.into_inner();
        assert_eq!(decompress(&compressed).unwrap(), data);
    }
}
