//! Buffered rendering and parsing over a carved memory slice.
//!
//! [`RenderBuf`] produces output data (memory buffer plus optional output
//! file); [`ParseBuf`] consumes input data. Both re-anchor their in-memory
//! window so that the buffer offset of the next byte stays congruent with its
//! on-disk offset modulo [`ALIGNMENT_MAX`]. Higher layers may therefore
//! request alignments up to 64 KiB and trust that the in-memory layout
//! matches the on-disk layout.

use crate::errors::{Result, XxlsortError};
use crate::file::{InputFile, OutputFile};
use crate::mem::{align_up, aligned_max, is_valid_alignment, ALIGNMENT_MAX};

/// Upper bound on the wire size of any [`Repr`] type.
pub const MAX_REPR_SIZE: usize = 128;

/// Controls the wire representation produced by [`RenderBuf::put`] and
/// consumed by [`ParseBuf::get`].
///
/// `SIZE` and `ALIGNMENT` are declared by the type, not derived from the host
/// layout; integer fields are encoded in host byte order.
pub trait Repr: Sized {
    /// Alignment of the representation on the wire.
    const ALIGNMENT: usize;
    /// Exact size of the representation in bytes. Must not exceed
    /// [`MAX_REPR_SIZE`].
    const SIZE: usize;

    /// Encodes `self` into `buf`, which is exactly `SIZE` bytes.
    fn encode(&self, buf: &mut [u8]);

    /// Decodes a value from `buf`, which is exactly `SIZE` bytes.
    fn decode(buf: &[u8]) -> Self;
}

/// Append-only buffered writer over a memory slice, periodically flushed to
/// an optional output file.
///
/// A detached buffer (no file) acts as a bump region: offsets returned by
/// [`RenderBuf::write`] and [`RenderBuf::put`] stay valid for its whole
/// lifetime and can be resolved through [`RenderBuf::data`].
pub struct RenderBuf<'a> {
    file: Option<OutputFile>,
    mem: &'a mut [u8],
    /// Start of the current window; congruent with the file position of its
    /// first byte modulo `ALIGNMENT_MAX`.
    base: usize,
    /// Bytes buffered in the current window.
    len: usize,
}

impl<'a> RenderBuf<'a> {
    /// Creates a buffer over `mem` writing through to `file`.
    pub fn new(mem: &'a mut [u8], file: OutputFile) -> Self {
        Self { file: Some(file), mem: aligned_max(mem), base: 0, len: 0 }
    }

    /// Creates a file-less bump buffer over `mem`.
    pub fn detached(mem: &'a mut [u8]) -> Self {
        Self { file: None, mem: aligned_max(mem), base: 0, len: 0 }
    }

    /// Offset at which the next byte will be placed.
    fn cursor(&self) -> usize {
        self.base + self.len
    }

    /// Free bytes remaining before the buffer must spill to its file.
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.mem.len() - self.cursor()
    }

    /// Logical output position: bytes on disk plus bytes buffered.
    #[must_use]
    pub fn file_pos(&self) -> u64 {
        self.file.as_ref().map_or(0, OutputFile::pos) + self.len as u64
    }

    /// The bytes written so far that are still held in memory. For a
    /// detached buffer this is everything ever written, addressed by the
    /// offsets that [`RenderBuf::write`] and [`RenderBuf::put`] returned.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.mem[..self.cursor()]
    }

    /// Spills the window to the file when no free byte remains.
    fn make_room(&mut self) -> Result<()> {
        if self.free_len() > 0 {
            return Ok(());
        }
        let Some(file) = self.file.as_mut() else {
            return Err(XxlsortError::internal("detached render buffer exhausted"));
        };
        if self.mem.is_empty() {
            return Err(XxlsortError::internal("render buffer has no backing memory"));
        }
        file.write(&self.mem[self.base..self.base + self.len])?;
        self.base = 0;
        self.len = 0;
        Ok(())
    }

    /// A writable view of the free tail, spilling first if it was empty.
    /// Pair with [`RenderBuf::commit`] after filling a prefix of it.
    pub fn free_mut(&mut self) -> Result<&mut [u8]> {
        self.make_room()?;
        let cursor = self.cursor();
        Ok(&mut self.mem[cursor..])
    }

    /// Accounts `n` bytes filled into the slice returned by
    /// [`RenderBuf::free_mut`].
    pub fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.free_len());
        self.len += n;
    }

    /// Copies `bytes` through the buffer, spilling as needed, and returns
    /// the offset at which the first byte was placed. The offset names a
    /// stable location only while the bytes stay in the window; detached
    /// buffers never spill, so there it is always stable.
    ///
    /// # Errors
    ///
    /// Fails when a spill is needed and the file write fails, or when a
    /// detached buffer runs out of memory.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut origin = self.cursor();
        let mut rest = bytes;
        let mut first = true;
        while !rest.is_empty() {
            self.make_room()?;
            let cursor = self.cursor();
            if first {
                origin = cursor;
                first = false;
            }
            let take = rest.len().min(self.mem.len() - cursor);
            self.mem[cursor..cursor + take].copy_from_slice(&rest[..take]);
            self.len += take;
            rest = &rest[take..];
        }
        Ok(origin)
    }

    /// Writes `n` zero bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        let mut left = n;
        while left > 0 {
            self.make_room()?;
            let cursor = self.cursor();
            let take = left.min(self.mem.len() - cursor);
            self.mem[cursor..cursor + take].fill(0);
            self.len += take;
            left -= take;
        }
        Ok(())
    }

    /// Writes zero bytes until the next write lands on an `n`-byte boundary
    /// of the output position.
    pub fn align(&mut self, n: usize) -> Result<()> {
        debug_assert!(is_valid_alignment(n));
        let cursor = self.cursor();
        self.skip(align_up(cursor, n) - cursor)
    }

    /// Aligns to `T::ALIGNMENT`, encodes `v`, and returns the offset at which
    /// it was placed.
    pub fn put<T: Repr>(&mut self, v: &T) -> Result<usize> {
        debug_assert!(T::SIZE <= MAX_REPR_SIZE);
        if T::ALIGNMENT != 1 {
            self.align(T::ALIGNMENT)?;
        }
        let mut scratch = [0u8; MAX_REPR_SIZE];
        v.encode(&mut scratch[..T::SIZE]);
        self.write(&scratch[..T::SIZE])
    }

    /// Writes the buffered window out and fsyncs the file. The window is
    /// re-anchored at its old end so the memory/file congruence is kept.
    ///
    /// # Errors
    ///
    /// Fails on write or fsync failure, or when the buffer is detached.
    pub fn flush(&mut self) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(XxlsortError::internal("flushing a detached render buffer"));
        };
        file.write(&self.mem[self.base..self.base + self.len])?;
        self.base += self.len;
        self.len = 0;
        file.flush()
    }
}

/// Buffered reader over an input file into a memory slice.
///
/// Refills re-anchor the window at `file position mod 64 KiB`, so the buffer
/// offset of every unconsumed byte is congruent with its on-disk offset.
#[derive(Debug)]
pub struct ParseBuf<'a> {
    file: InputFile,
    mem: &'a mut [u8],
    win_start: usize,
    win_end: usize,
}

impl<'a> ParseBuf<'a> {
    /// Creates a buffer over `mem` reading from `file`.
    pub fn new(mem: &'a mut [u8], file: InputFile) -> Self {
        let mem = aligned_max(mem);
        debug_assert!(!mem.is_empty());
        Self { file, mem, win_start: 0, win_end: 0 }
    }

    /// On-disk offset of the next unconsumed byte.
    #[must_use]
    pub fn file_pos(&self) -> u64 {
        self.file.pos() - (self.win_end - self.win_start) as u64
    }

    /// Path of the underlying file, for error context.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    /// Whether the underlying file supports seeking.
    #[must_use]
    pub fn is_seekable(&self) -> bool {
        self.file.is_seekable()
    }

    /// Fills `out` from the buffered window, refilling from the file on
    /// demand. Returns the number of bytes copied; fewer than `out.len()`
    /// means end of file.
    ///
    /// # Errors
    ///
    /// Fails on read failure of the underlying file.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < out.len() {
            if self.win_start == self.win_end {
                if self.mem.is_empty() {
                    return Err(XxlsortError::internal("parse buffer has no backing memory"));
                }
                let anchor = (self.file.pos() % ALIGNMENT_MAX as u64) as usize;
                let n = self.file.read(&mut self.mem[anchor..])?;
                if n == 0 {
                    break;
                }
                self.win_start = anchor;
                self.win_end = anchor + n;
            }
            let take = (out.len() - filled).min(self.win_end - self.win_start);
            out[filled..filled + take]
                .copy_from_slice(&self.mem[self.win_start..self.win_start + take]);
            self.win_start += take;
            filled += take;
        }
        Ok(filled)
    }

    /// Advances past `n` bytes, seeking forward once the window is drained.
    ///
    /// # Errors
    ///
    /// Fails when the skip runs past the window and the file is not
    /// seekable.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let buffered = (self.win_end - self.win_start) as u64;
        if n <= buffered {
            self.win_start += n as usize;
        } else {
            let beyond = n - buffered;
            self.win_start = 0;
            self.win_end = 0;
            let target = self.file.pos() + beyond;
            self.file.set_file_pos(target)?;
        }
        Ok(())
    }

    /// Skips the minimum bytes needed to reach an `n`-aligned on-disk
    /// offset.
    pub fn align(&mut self, n: usize) -> Result<()> {
        debug_assert!(is_valid_alignment(n));
        let pos = self.file_pos();
        let rem = pos % n as u64;
        if rem != 0 {
            self.skip(n as u64 - rem)?;
        }
        Ok(())
    }

    /// Aligns to `T::ALIGNMENT` and decodes one value. Returns `None` at a
    /// clean end of file.
    ///
    /// # Errors
    ///
    /// Returns [`XxlsortError::DataCorrupt`] when the stream ends inside the
    /// representation.
    pub fn get<T: Repr>(&mut self) -> Result<Option<T>> {
        debug_assert!(T::SIZE <= MAX_REPR_SIZE);
        if T::ALIGNMENT != 1 {
            self.align(T::ALIGNMENT)?;
        }
        let mut scratch = [0u8; MAX_REPR_SIZE];
        let buf = &mut scratch[..T::SIZE];
        let n = self.read(buf)?;
        if n == 0 {
            return Ok(None);
        }
        if n < T::SIZE {
            return Err(XxlsortError::DataCorrupt {
                path: self.path().to_path_buf(),
                offset: self.file_pos(),
            });
        }
        Ok(Some(T::decode(buf)))
    }
}
