#![forbid(unsafe_code)]

use std::io;

use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by [`Reader`](crate::Reader), [`Writer`](crate::Writer)
/// and the bulk helpers.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation on a handle that has already been closed.
    #[error("stream is closed")]
    Closed,

    /// The byte source ran out before the engine saw the logical end of
    /// the compressed stream.
    #[error("compressed stream finishes before the logical end of stream")]
    UnexpectedEof,

    /// A strict reader (`read_byte`, `read_line`) hit the end of the
    /// compressed stream.
    #[error("end of compressed stream reached")]
    EndOfStream,

    /// Failure reported by the compression engine itself.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A construction-time parameter was out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// I/O failure in the underlying byte source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Adapt to `io::Error` for the `io::Read`/`io::Write` impls.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            Error::Io(err) => err,
            Error::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, self),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Engine failures, keeping the classification the engine reports.
///
/// `Sequence` and `Param` indicate misuse of the engine rather than bad
/// data; neither is retryable.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Engine calls were made in an impossible order.
    #[error("incorrect sequence of engine calls")]
    Sequence,

    /// A data integrity error was detected in the compressed stream.
    #[error("data integrity error detected in compressed stream")]
    Data,

    /// The compressed stream does not start with the correct magic bytes.
    #[error("compressed stream does not start with the correct magic bytes")]
    DataMagic,

    /// A parameter passed to the engine was out of range.
    #[error("engine parameter out of range")]
    Param,

    /// The engine could not allocate enough memory.
    #[error("not enough memory is available")]
    Mem,
}

impl From<bzip2::Error> for EngineError {
    fn from(err: bzip2::Error) -> Self {
        match err {
            bzip2::Error::Sequence => EngineError::Sequence,
            bzip2::Error::Data => EngineError::Data,
            bzip2::Error::DataMagic => EngineError::DataMagic,
            bzip2::Error::Param => EngineError::Param,
        }
    }
}
