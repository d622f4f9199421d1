#![forbid(unsafe_code)]

//! Streaming access to bzip2-compressed data.
//!
//! [`Reader`] decompresses from any [`std::io::Read`] source and layers
//! byte-, line- and bulk-oriented operations on top: pushback
//! ([`Reader::unget`]), arbitrary multi-byte line separators including
//! paragraph mode ([`Separator`]), line counting and end-of-stream
//! inspection. [`Writer`] compresses to any [`std::io::Write`] sink with
//! an explicit finish/close protocol. The compression itself is delegated
//! to the incremental bzip2 engine; this crate is the stream adaptation
//! layer around it.
//!
//! One-shot helpers cover the common whole-buffer case:
//!
//! ```
//! let compressed = bzstream::compress(b"round trip")?;
//! assert_eq!(bzstream::decompress(&compressed)?, b"round trip");
//! # Ok::<(), bzstream::Error>(())
//! ```

mod buffer;
mod engine;
mod error;
mod reader;
mod scanner;
mod writer;

pub use engine::{CompressConfig, DecompressConfig};
pub use error::{EngineError, Error, Result};
pub use reader::{Lines, Reader};
pub use scanner::Separator;
pub use writer::Writer;

////////////////////////////////////////////////////////////////////////////////

/// Compress `data` into a standalone bzip2 stream with default settings.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with(data, CompressConfig::default())
}

/// Compress `data` with explicit compression parameters.
pub fn compress_with(data: &[u8], config: CompressConfig) -> Result<Vec<u8>> {
    let mut writer = Writer::with_config(Vec::new(), config)?;
    writer.write(data)?;
    writer.close()?;
    Ok(writer.into_inner())
}

/// Decompress a complete bzip2 stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decompress_with(data, DecompressConfig::default())
}

/// Decompress a complete bzip2 stream with explicit engine parameters.
pub fn decompress_with(data: &[u8], config: DecompressConfig) -> Result<Vec<u8>> {
    let mut reader = Reader::with_config(data, config);
    Ok(reader.read_all()?.unwrap_or_default())
}

////////////////////////////////////////////////////////////////////////////////
