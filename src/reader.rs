#![forbid(unsafe_code)]

use std::io::{self, Read};

use log::*;

use crate::buffer::OutputBuffer;
use crate::engine::{DecompressConfig, Decompressor, StepStatus};
use crate::error::{EngineError, Error, Result};
use crate::scanner::{find_byte, Separator, SkipTable};

////////////////////////////////////////////////////////////////////////////////

/// Compressed bytes pulled from the source per refill.
const INPUT_CHUNK: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// No read has happened yet; the engine does not exist.
    Idle,
    /// The engine is live and has not reported the end of the stream.
    Running,
    /// The engine reported the logical end of the stream and was released.
    Done,
    /// The engine hit a fatal condition and was released; the failure is
    /// reported again on every further decode attempt.
    Failed(Failure),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Failure {
    UnexpectedEof,
    Engine(EngineError),
}

impl Failure {
    fn to_error(self) -> Error {
        match self {
            Failure::UnexpectedEof => Error::UnexpectedEof,
            Failure::Engine(kind) => Error::Engine(kind),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Refill {
    More,
    StreamEnd,
}

////////////////////////////////////////////////////////////////////////////////

/// Streaming decompressor with byte-, line- and bulk-oriented reads.
///
/// Decompressed bytes are served out of an internal growable buffer;
/// [`unget`](Reader::unget) and [`unget_byte`](Reader::unget_byte) push
/// bytes back in front of it. Line reads accept arbitrary multi-byte
/// separators, including paragraph mode, and keep a line counter.
///
/// The decompression engine is created lazily on the first read call, so
/// a `Reader` can be constructed without touching the source. `Reader`
/// also implements [`io::Read`] (returning 0 at the end of the stream),
/// which gives interop with `io::copy`, `Read::bytes()` and friends.
///
/// ```
/// use bzstream::{Reader, Separator};
///
/// let compressed = bzstream::compress(b"a\nb")?;
/// let mut reader = Reader::new(&compressed[..]);
/// assert_eq!(reader.next_line(&Separator::default())?.as_deref(), Some(&b"a\n"[..]));
/// assert_eq!(reader.next_line(&Separator::default())?.as_deref(), Some(&b"b"[..]));
/// assert_eq!(reader.next_line(&Separator::default())?, None);
/// # Ok::<(), bzstream::Error>(())
/// ```
pub struct Reader<R> {
    source: R,
    config: DecompressConfig,
    engine: Option<Decompressor>,
    /// Compressed bytes pulled from the source, not yet fed to the engine.
    staged: Vec<u8>,
    staged_pos: usize,
    buf: OutputBuffer,
    state: State,
    line_num: u64,
    closed: bool,
}

impl<R: Read> Reader<R> {
    pub fn new(source: R) -> Self {
        Self::with_config(source, DecompressConfig::default())
    }

    pub fn with_config(source: R, config: DecompressConfig) -> Self {
        Self {
            source,
            config,
            engine: None,
            staged: Vec::new(),
            staged_pos: 0,
            buf: OutputBuffer::new(),
            state: State::Idle,
            line_num: 0,
            closed: false,
        }
    }

    /// Read and decompress everything up to the end of the stream.
    ///
    /// Returns `None` only when the stream had already ended and nothing
    /// is buffered.
    pub fn read_all(&mut self) -> Result<Option<Vec<u8>>> {
        self.read_some(None)
    }

    /// Read up to `len` decompressed bytes.
    ///
    /// Returns exactly `len` bytes unless the stream ends first, in which
    /// case the short remainder is returned; `None` once the stream has
    /// ended and nothing is buffered.
    pub fn read_at_most(&mut self, len: usize) -> Result<Option<Vec<u8>>> {
        self.read_some(Some(len))
    }

    fn read_some(&mut self, len: Option<usize>) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.ensure_started();
        if self.at_end() {
            return Ok(None);
        }
        let mut out = Vec::new();
        if len == Some(0) {
            return Ok(Some(out));
        }
        loop {
            let avail = self.buf.available();
            if let Some(want) = len {
                if out.len() + avail >= want {
                    let take = want - out.len();
                    out.extend_from_slice(&self.buf.readable()[..take]);
                    self.buf.consume(take);
                    return Ok(Some(out));
                }
            }
            out.extend_from_slice(self.buf.readable());
            self.buf.consume(avail);
            if self.refill()? == Refill::StreamEnd {
                return Ok(Some(out));
            }
        }
    }

    /// Read a single byte; `None` at the end of the stream.
    pub fn next_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.read_at_most(1)?.and_then(|bytes| bytes.first().copied()))
    }

    /// Read a single byte, failing with [`Error::EndOfStream`] at the end
    /// of the stream.
    pub fn read_byte(&mut self) -> Result<u8> {
        self.next_byte()?.ok_or(Error::EndOfStream)
    }

    /// Push one byte back in front of the stream; the next read returns
    /// it first.
    pub fn unget_byte(&mut self, byte: u8) -> Result<()> {
        self.unget(&[byte])
    }

    /// Push a byte sequence back in front of the stream. Subsequent reads
    /// see exactly `bytes` first and then continue where the stream left
    /// off. Pushbacks compose LIFO: the last pushed sequence is read
    /// first.
    pub fn unget(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.buf.pushback(bytes);
        Ok(())
    }

    /// Read one line, where a line ends with `sep`. The separator is
    /// included in the returned bytes; the final line is returned even
    /// without one. `None` once the stream has ended.
    pub fn next_line(&mut self, sep: &Separator) -> Result<Option<Vec<u8>>> {
        match sep {
            Separator::Newline => self.gets_with(sep, None),
            _ => {
                let table = SkipTable::build(sep.needle());
                self.gets_with(sep, Some(&table))
            }
        }
    }

    /// Like [`next_line`](Reader::next_line), but fails with
    /// [`Error::EndOfStream`] once the stream has ended.
    pub fn read_line(&mut self, sep: &Separator) -> Result<Vec<u8>> {
        self.next_line(sep)?.ok_or(Error::EndOfStream)
    }

    /// Read all remaining lines.
    pub fn read_lines(&mut self, sep: &Separator) -> Result<Vec<Vec<u8>>> {
        self.lines(sep.clone()).collect()
    }

    /// Iterator over the remaining lines. The separator scan table is
    /// built once and reused for every line.
    pub fn lines(&mut self, sep: Separator) -> Lines<'_, R> {
        let table = match &sep {
            Separator::Newline => None,
            other => Some(SkipTable::build(other.needle())),
        };
        Lines {
            reader: self,
            sep,
            table,
        }
    }

    /// Number of separator matches delivered so far by the line reads.
    pub fn line_num(&self) -> u64 {
        self.line_num
    }

    /// Overwrite the line counter. Does not move the stream.
    pub fn set_line_num(&mut self, line_num: u64) {
        self.line_num = line_num;
    }

    fn gets_with(&mut self, sep: &Separator, table: Option<&SkipTable>) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.ensure_started();
        if self.at_end() {
            return Ok(None);
        }
        if sep.is_paragraph() {
            self.skip_newlines()?;
        }
        let line = self.read_until(sep.needle(), table)?;
        if sep.is_paragraph() {
            self.skip_newlines()?;
        }
        if line.is_some() {
            self.line_num += 1;
        }
        Ok(line)
    }

    /// Accumulate bytes up to and including the next occurrence of
    /// `needle`, refilling as needed. A match may straddle refills: all
    /// but the last `len - 1` buffered bytes are consumed into the result
    /// and the tail is carried over before the next decode.
    fn read_until(&mut self, needle: &[u8], table: Option<&SkipTable>) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::new();
        loop {
            let (found, avail) = {
                let hay = self.buf.readable();
                let found = if needle.len() == 1 {
                    find_byte(needle[0], hay)
                } else if let Some(table) = table {
                    table.find(needle, hay)
                } else {
                    SkipTable::build(needle).find(needle, hay)
                };
                (found, hay.len())
            };
            if let Some(pos) = found {
                let end = pos + needle.len();
                out.extend_from_slice(&self.buf.readable()[..end]);
                self.buf.consume(end);
                return Ok(Some(out));
            }
            let keep = avail.min(needle.len() - 1);
            let eat = avail - keep;
            out.extend_from_slice(&self.buf.readable()[..eat]);
            self.buf.consume(eat);
            if self.refill()? == Refill::StreamEnd {
                let tail = self.buf.available();
                out.extend_from_slice(self.buf.readable());
                self.buf.consume(tail);
                if out.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(out));
            }
        }
    }

    /// Consume a run of newlines (paragraph mode absorbs blank lines
    /// around each break).
    fn skip_newlines(&mut self) -> Result<()> {
        loop {
            let (stop, avail) = {
                let hay = self.buf.readable();
                (hay.iter().position(|&byte| byte != b'\n'), hay.len())
            };
            if let Some(pos) = stop {
                self.buf.consume(pos);
                return Ok(());
            }
            self.buf.consume(avail);
            if self.refill()? == Refill::StreamEnd {
                return Ok(());
            }
        }
    }

    /// Whether the engine has consumed the logical end-of-stream marker
    /// and the output buffer is drained.
    ///
    /// `None` until a first read has initialized the engine; the answer
    /// is not knowable before then.
    pub fn eoz(&self) -> Option<bool> {
        match self.state {
            State::Idle => None,
            State::Done => Some(self.buf.is_empty()),
            State::Running | State::Failed(_) => Some(false),
        }
    }

    /// Whether every decompressed byte has been delivered: the logical
    /// end of stream was reached, the buffer is empty and no byte can be
    /// read. Probes by reading one byte and pushing it back, so it is
    /// meaningful even before the first real read.
    pub fn eof(&mut self) -> Result<bool> {
        match self.next_byte()? {
            Some(byte) => {
                self.unget_byte(byte)?;
                Ok(false)
            }
            None => Ok(true),
        }
    }

    /// Compressed bytes that were pulled from the source but not consumed
    /// by the engine. `None` until the logical end of stream has been
    /// reached; afterwards the leftover is drained and returned.
    pub fn unused(&mut self) -> Option<Vec<u8>> {
        match self.state {
            State::Done => {
                let rest = self.staged[self.staged_pos..].to_vec();
                self.staged_pos = self.staged.len();
                Some(rest)
            }
            _ => None,
        }
    }

    /// Append compressed bytes to the staging region, ahead of whatever
    /// the source produces next.
    pub fn set_unused(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.staged.extend_from_slice(bytes);
        Ok(())
    }

    /// Release the engine and refuse further operations.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.engine = None;
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Recover the underlying byte source.
    pub fn into_inner(self) -> R {
        self.source
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Create the engine on the first read call. Deferring this keeps
    /// construction free of engine work.
    fn ensure_started(&mut self) {
        if self.state == State::Idle {
            self.engine = Some(Decompressor::new(&self.config));
            self.state = State::Running;
        }
    }

    fn at_end(&self) -> bool {
        self.state == State::Done && self.buf.is_empty()
    }

    /// Decode more bytes into the output buffer, pulling compressed input
    /// when the engine is starved. Produced bytes land after any unread
    /// (including pushed-back) bytes.
    fn refill(&mut self) -> Result<Refill> {
        match self.state {
            State::Idle | State::Running => {}
            State::Done => return Ok(Refill::StreamEnd),
            State::Failed(failure) => return Err(failure.to_error()),
        }
        self.ensure_started();
        if self.staged_pos == self.staged.len() {
            let mut chunk = vec![0; INPUT_CHUNK];
            let n = self.source.read(&mut chunk)?;
            if n == 0 {
                debug!("source exhausted before the logical end of stream");
                self.engine = None;
                self.state = State::Failed(Failure::UnexpectedEof);
                return Err(Error::UnexpectedEof);
            }
            chunk.truncate(n);
            trace!("staged {} compressed bytes", n);
            self.staged = chunk;
            self.staged_pos = 0;
        }
        self.buf.compact();
        let result = {
            let spare = self.buf.spare();
            match self.engine.as_mut() {
                Some(engine) => engine.step(&self.staged[self.staged_pos..], spare),
                None => Err(EngineError::Sequence),
            }
        };
        match result {
            Ok(step) => {
                self.staged_pos += step.consumed;
                self.buf.commit(step.produced);
                if step.status == StepStatus::Finished {
                    debug!("logical end of stream reached");
                    self.engine = None;
                    self.state = State::Done;
                }
                Ok(Refill::More)
            }
            Err(kind) => {
                self.engine = None;
                self.state = State::Failed(Failure::Engine(kind));
                Err(Error::Engine(kind))
            }
        }
    }
}

impl<R: Read> Read for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read_at_most(buf.len()) {
            Ok(Some(bytes)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Ok(None) => Ok(0),
            Err(err) => Err(err.into_io()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Iterator over the lines of a [`Reader`], created by
/// [`Reader::lines`]. Yields `Err` once on a decode failure.
pub struct Lines<'a, R> {
    reader: &'a mut Reader<R>,
    sep: Separator,
    table: Option<SkipTable>,
}

impl<R: Read> Iterator for Lines<'_, R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.gets_with(&self.sep, self.table.as_ref()) {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
