#![forbid(unsafe_code)]

//! Thin adapter over the incremental bzip2 engine.
//!
//! The engine is a black box driven one step at a time: each step consumes
//! some compressed or raw input, produces some output, and reports whether
//! the logical stream has ended. Everything above this module works in
//! terms of [`Step`] outcomes and never touches the engine directly.

use bzip2::{Action, Compress, Compression, Decompress, Status};
use log::*;

use crate::error::{EngineError, Error, Result};

////////////////////////////////////////////////////////////////////////////////

/// Construction-time parameters of the compression engine. Once the
/// engine has started they can no longer change.
#[derive(Clone, Copy, Debug)]
pub struct CompressConfig {
    /// Block size in units of 100 kB, `1..=9`. Bigger blocks compress
    /// better and cost more memory.
    pub block_size_100k: u32,
    /// Work factor for the fallback sorting algorithm, `0..=250`,
    /// where `0` selects the engine default.
    pub work_factor: u32,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            block_size_100k: 9,
            work_factor: 0,
        }
    }
}

impl CompressConfig {
    /// Reject out-of-range parameters before any engine state exists.
    pub(crate) fn validate(&self) -> Result<()> {
        if !(1..=9).contains(&self.block_size_100k) {
            return Err(Error::InvalidConfig("block_size_100k must be in 1..=9"));
        }
        if self.work_factor > 250 {
            return Err(Error::InvalidConfig("work_factor must be in 0..=250"));
        }
        Ok(())
    }
}

/// Construction-time parameters of the decompression engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecompressConfig {
    /// Trade speed for roughly half the memory use.
    pub small: bool,
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StepStatus {
    /// The engine accepts more input or has more output pending.
    Running,
    /// The logical end of the stream has been reached.
    Finished,
}

/// Byte counts moved by a single engine step.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Step {
    pub consumed: usize,
    pub produced: usize,
    pub status: StepStatus,
}

////////////////////////////////////////////////////////////////////////////////

/// Incremental compressor. One instance produces exactly one logical
/// bzip2 stream; engine resources are released on drop.
pub(crate) struct Compressor {
    raw: Compress,
    finished: bool,
}

impl Compressor {
    pub fn new(config: &CompressConfig) -> Self {
        debug!(
            "compress engine init: block_size_100k={}, work_factor={}",
            config.block_size_100k, config.work_factor
        );
        Self {
            raw: Compress::new(
                Compression::new(config.block_size_100k),
                config.work_factor,
            ),
            finished: false,
        }
    }

    /// Feed `input` through the engine, writing compressed bytes to
    /// `output`.
    pub fn run(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> std::result::Result<Step, EngineError> {
        self.step(input, output, Action::Run)
    }

    /// Drive stream termination. Call repeatedly until the returned step
    /// reports [`StepStatus::Finished`].
    pub fn finish(&mut self, output: &mut [u8]) -> std::result::Result<Step, EngineError> {
        self.step(&[], output, Action::Finish)
    }

    fn step(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        action: Action,
    ) -> std::result::Result<Step, EngineError> {
        if self.finished {
            return Err(EngineError::Sequence);
        }
        let in_before = self.raw.total_in();
        let out_before = self.raw.total_out();
        let status = self.raw.compress(input, output, action)?;
        if status == Status::MemNeeded {
            self.finished = true;
            return Err(EngineError::Mem);
        }
        let step = Step {
            consumed: (self.raw.total_in() - in_before) as usize,
            produced: (self.raw.total_out() - out_before) as usize,
            status: match status {
                Status::StreamEnd => StepStatus::Finished,
                _ => StepStatus::Running,
            },
        };
        self.finished = step.status == StepStatus::Finished;
        trace!(
            "compress step: consumed={}, produced={}, status={:?}",
            step.consumed,
            step.produced,
            step.status
        );
        Ok(step)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Incremental decompressor for one logical bzip2 stream.
pub(crate) struct Decompressor {
    raw: Decompress,
    finished: bool,
}

impl Decompressor {
    pub fn new(config: &DecompressConfig) -> Self {
        debug!("decompress engine init: small={}", config.small);
        Self {
            raw: Decompress::new(config.small),
            finished: false,
        }
    }

    /// Consume compressed bytes from `input` and write decompressed bytes
    /// to `output`. After [`StepStatus::Finished`] has been returned once,
    /// further steps fail with a sequence error.
    pub fn step(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> std::result::Result<Step, EngineError> {
        if self.finished {
            return Err(EngineError::Sequence);
        }
        let in_before = self.raw.total_in();
        let out_before = self.raw.total_out();
        let status = self.raw.decompress(input, output)?;
        if status == Status::MemNeeded {
            self.finished = true;
            return Err(EngineError::Mem);
        }
        let step = Step {
            consumed: (self.raw.total_in() - in_before) as usize,
            produced: (self.raw.total_out() - out_before) as usize,
            status: match status {
                Status::StreamEnd => StepStatus::Finished,
                _ => StepStatus::Running,
            },
        };
        self.finished = step.status == StepStatus::Finished;
        trace!(
            "decompress step: consumed={}, produced={}, status={:?}",
            step.consumed,
            step.produced,
            step.status
        );
        Ok(step)
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn compress_all(data: &[u8]) -> Vec<u8> {
        let mut engine = Compressor::new(&CompressConfig::default());
        let mut out = Vec::new();
        let mut chunk = [0u8; 64];
        let mut pos = 0;
        while pos < data.len() {
            let step = engine.run(&data[pos..], &mut chunk).unwrap();
            pos += step.consumed;
            out.extend_from_slice(&chunk[..step.produced]);
        }
        loop {
            let step = engine.finish(&mut chunk).unwrap();
            out.extend_from_slice(&chunk[..step.produced]);
            if step.status == StepStatus::Finished {
                break;
            }
        }
        out
    }

    #[test]
    fn round_trip_through_raw_engines() {
        let data = b"engine adapter smoke data";
        let compressed = compress_all(data);
        let mut engine = Decompressor::new(&DecompressConfig::default());
        let mut out = Vec::new();
        let mut chunk = [0u8; 32];
        let mut pos = 0;
        loop {
            let step = engine.step(&compressed[pos..], &mut chunk).unwrap();
            pos += step.consumed;
            out.extend_from_slice(&chunk[..step.produced]);
            if step.status == StepStatus::Finished {
                break;
            }
        }
        assert_eq!(out, data);
    }

    #[test]
    fn step_after_stream_end_is_a_sequence_error() {
        let mut engine = Compressor::new(&CompressConfig::default());
        let mut chunk = [0u8; 128];
        loop {
            let step = engine.finish(&mut chunk).unwrap();
            if step.status == StepStatus::Finished {
                break;
            }
        }
        let err = engine.run(b"more", &mut chunk).unwrap_err();
        assert_eq!(err, EngineError::Sequence);
    }

    #[test]
    fn garbage_input_reports_magic_error() {
        let mut engine = Decompressor::new(&DecompressConfig::default());
        let mut chunk = [0u8; 32];
        let err = engine.step(b"definitely not bzip2", &mut chunk).unwrap_err();
        assert_eq!(err, EngineError::DataMagic);
    }

    #[test]
    fn config_validation_rejects_out_of_range() {
        let bad_block = CompressConfig {
            block_size_100k: 0,
            work_factor: 0,
        };
        assert!(bad_block.validate().is_err());

        let bad_work = CompressConfig {
            block_size_100k: 9,
            work_factor: 251,
        };
        assert!(bad_work.validate().is_err());

        assert!(CompressConfig::default().validate().is_ok());
    }
}
