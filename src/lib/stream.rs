//! Iterator-style parser over streams of (header, body) records.
//!
//! [`RecordStream`] separates the on-disk formats from the engine: the same
//! state machine drives external input files (headers validated and widened
//! by the run former) and intermediate run files (headers already in run
//! format, bodies possibly deferred).

use crate::buffer::{ParseBuf, Repr};
use crate::errors::{Result, XxlsortError};
use crate::file::{FileIdRef, InputFile};
use crate::mem;
use crate::record::{RecordHeader, RunHeader, KEY_SIZE, MAX_BODY_SIZE};

/// A header type that can head a record stream.
pub trait StreamHeader: Repr {
    /// Parses the next header from `buf`, returning the header and the
    /// number of body bytes stored in the stream after it. `None` means a
    /// clean end of stream.
    fn read_next(buf: &mut ParseBuf<'_>) -> Result<Option<(Self, u64)>>;

    /// The record's sort key.
    fn key(&self) -> &[u8; KEY_SIZE];
}

impl StreamHeader for RecordHeader {
    fn read_next(buf: &mut ParseBuf<'_>) -> Result<Option<(Self, u64)>> {
        let at = buf.file_pos();
        let Some(hd) = buf.get::<RecordHeader>()? else {
            return Ok(None);
        };
        if hd.body_size > MAX_BODY_SIZE {
            return Err(XxlsortError::MalformedData { path: buf.path().to_path_buf(), offset: at });
        }
        let body_bytes = hd.body_size;
        Ok(Some((hd, body_bytes)))
    }

    fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl StreamHeader for RunHeader {
    fn read_next(buf: &mut ParseBuf<'_>) -> Result<Option<(Self, u64)>> {
        let at = buf.file_pos();
        let Some(hd) = buf.get::<RunHeader>()? else {
            return Ok(None);
        };
        if hd.body_size > MAX_BODY_SIZE {
            return Err(XxlsortError::MalformedData { path: buf.path().to_path_buf(), offset: at });
        }
        let body_bytes = hd.stored_body_size();
        Ok(Some((hd, body_bytes)))
    }

    fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

/// Streaming parser over a file of records with fixed-size headers and
/// variable-length bodies.
///
/// Construction attempts the first parse, so a fresh stream is either at a
/// valid header or exhausted. [`RecordStream::parse_next`] advances past any
/// unread body bytes; exhaustion is terminal.
#[derive(Debug)]
pub struct RecordStream<'a, H: StreamHeader> {
    buf: ParseBuf<'a>,
    header: Option<H>,
    body_bytes_left: u64,
    body_pos: u64,
}

impl<'a, H: StreamHeader> RecordStream<'a, H> {
    /// Opens the identified file with `mem` as the read buffer and parses
    /// the first header.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened or the first record is
    /// malformed.
    pub fn open(memory: &'a mut [u8], id: &FileIdRef) -> Result<Self> {
        if mem::aligned_max(memory).is_empty() {
            return Err(XxlsortError::internal("record stream buffer too small"));
        }
        let buf = ParseBuf::new(memory, InputFile::open(id)?);
        let mut stream = Self { buf, header: None, body_bytes_left: 0, body_pos: 0 };
        stream.parse_next()?;
        Ok(stream)
    }

    /// Skips over the current record, if any, and parses the next one.
    /// Returns false on end of stream.
    ///
    /// # Errors
    ///
    /// Fails on malformed data or I/O failure.
    pub fn parse_next(&mut self) -> Result<bool> {
        self.buf.skip(self.body_bytes_left)?;
        self.body_bytes_left = 0;
        match H::read_next(&mut self.buf)? {
            Some((header, body_bytes)) => {
                self.body_pos = self.buf.file_pos();
                self.header = Some(header);
                self.body_bytes_left = body_bytes;
                Ok(true)
            }
            None => {
                self.header = None;
                Ok(false)
            }
        }
    }

    /// Whether the stream currently sits at a valid header.
    #[must_use]
    pub fn is_header_valid(&self) -> bool {
        self.header.is_some()
    }

    /// The current record's header, when one is valid.
    #[must_use]
    pub fn header(&self) -> Option<&H> {
        self.header.as_ref()
    }

    /// On-disk offset at which the current record's body starts.
    #[must_use]
    pub fn body_pos(&self) -> u64 {
        self.body_pos
    }

    /// Whether the underlying file supports seeking.
    #[must_use]
    pub fn is_seekable(&self) -> bool {
        self.buf.is_seekable()
    }

    /// Reads up to `out.len()` bytes of the current record's body. Returns
    /// the number of bytes produced; zero means the stored body has been
    /// fully consumed.
    ///
    /// # Errors
    ///
    /// Returns [`XxlsortError::DataCorrupt`] when the stream ends before the
    /// declared body size is satisfied.
    pub fn read_body(&mut self, out: &mut [u8]) -> Result<usize> {
        let want = (out.len() as u64).min(self.body_bytes_left) as usize;
        if want == 0 {
            return Ok(0);
        }
        let got = self.buf.read(&mut out[..want])?;
        if got != want {
            return Err(XxlsortError::DataCorrupt {
                path: self.buf.path().to_path_buf(),
                offset: self.buf.file_pos(),
            });
        }
        self.body_bytes_left -= want as u64;
        Ok(want)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RenderBuf;
    use crate::file::{FileId, OutputFile};
    use crate::mem::KIB;

    const BUF_SIZE: usize = 256 * KIB;

    fn key_of(byte: u8) -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        key[0] = byte;
        key
    }

    fn write_external(dir: &tempfile::TempDir, records: &[(u8, Vec<u8>)]) -> FileIdRef {
        let id = FileId::with_path(dir.path().join("records.bin"));
        let mut memory = vec![0u8; BUF_SIZE];
        let mut out = RenderBuf::new(&mut memory, OutputFile::create(&id).unwrap());
        for (byte, body) in records {
            let hd = RecordHeader {
                key: key_of(*byte),
                flags: u64::from(*byte),
                crc: 0,
                body_size: body.len() as u64,
            };
            out.put(&hd).unwrap();
            out.write(body).unwrap();
        }
        out.flush().unwrap();
        id
    }

    #[test]
    fn test_empty_file_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let id = write_external(&dir, &[]);
        let mut memory = vec![0u8; BUF_SIZE];
        let stream = RecordStream::<RecordHeader>::open(&mut memory, &id).unwrap();
        assert!(!stream.is_header_valid());
        assert!(stream.header().is_none());
    }

    #[test]
    fn test_parse_sequence_and_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let id = write_external(
            &dir,
            &[(1, vec![0xAA; 10]), (2, Vec::new()), (3, vec![0xBB; 700])],
        );
        let mut memory = vec![0u8; BUF_SIZE];
        let mut stream = RecordStream::<RecordHeader>::open(&mut memory, &id).unwrap();

        assert!(stream.is_header_valid());
        assert_eq!(stream.header().unwrap().key[0], 1);
        assert_eq!(stream.body_pos(), 88);
        let mut body = vec![0u8; 64];
        assert_eq!(stream.read_body(&mut body).unwrap(), 10);
        assert!(body[..10].iter().all(|&b| b == 0xAA));
        assert_eq!(stream.read_body(&mut body).unwrap(), 0);

        assert!(stream.parse_next().unwrap());
        assert_eq!(stream.header().unwrap().key[0], 2);
        assert_eq!(stream.read_body(&mut body).unwrap(), 0);

        // body of record 2 is skipped implicitly
        assert!(stream.parse_next().unwrap());
        assert_eq!(stream.header().unwrap().key[0], 3);
        let mut total = 0;
        loop {
            let n = stream.read_body(&mut body).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 700);

        assert!(!stream.parse_next().unwrap());
        assert!(!stream.parse_next().unwrap(), "exhausted is terminal");
    }

    #[test]
    fn test_skips_unread_body() {
        let dir = tempfile::tempdir().unwrap();
        let id = write_external(&dir, &[(9, vec![0x11; 5000]), (4, Vec::new())]);
        let mut memory = vec![0u8; BUF_SIZE];
        let mut stream = RecordStream::<RecordHeader>::open(&mut memory, &id).unwrap();
        assert!(stream.parse_next().unwrap());
        assert_eq!(stream.header().unwrap().key[0], 4);
    }

    #[test]
    fn test_truncated_header_is_data_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let id = FileId::with_path(dir.path().join("trunc.bin"));
        std::fs::write(id.path(), [7u8; 40]).unwrap();
        let mut memory = vec![0u8; BUF_SIZE];
        let err = RecordStream::<RecordHeader>::open(&mut memory, &id).unwrap_err();
        assert!(matches!(err, XxlsortError::DataCorrupt { .. }));
    }

    #[test]
    fn test_truncated_body_is_data_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let id = FileId::with_path(dir.path().join("truncbody.bin"));
        let hd = RecordHeader { key: key_of(1), flags: 0, crc: 0, body_size: 1000 };
        let mut bytes = vec![0u8; RecordHeader::SIZE];
        hd.encode(&mut bytes);
        bytes.extend_from_slice(&[0x55; 100]);
        std::fs::write(id.path(), &bytes).unwrap();

        let mut memory = vec![0u8; BUF_SIZE];
        let mut stream = RecordStream::<RecordHeader>::open(&mut memory, &id).unwrap();
        let mut body = vec![0u8; 2000];
        let err = stream.read_body(&mut body).unwrap_err();
        assert!(matches!(err, XxlsortError::DataCorrupt { .. }));
    }

    #[test]
    fn test_oversized_body_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let id = FileId::with_path(dir.path().join("huge.bin"));
        let hd = RecordHeader { key: key_of(1), flags: 0, crc: 0, body_size: MAX_BODY_SIZE + 1 };
        let mut bytes = vec![0u8; RecordHeader::SIZE];
        hd.encode(&mut bytes);
        std::fs::write(id.path(), &bytes).unwrap();

        let mut memory = vec![0u8; BUF_SIZE];
        let err = RecordStream::<RecordHeader>::open(&mut memory, &id).unwrap_err();
        assert!(matches!(err, XxlsortError::MalformedData { offset: 0, .. }));
    }

    #[test]
    fn test_run_stream_defers_absent_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let id = FileId::with_path(dir.path().join("run.bin"));
        {
            let mut memory = vec![0u8; BUF_SIZE];
            let mut out = RenderBuf::new(&mut memory, OutputFile::create(&id).unwrap());
            let external = RecordHeader { key: key_of(5), flags: 0, crc: 0, body_size: 2048 };
            out.put(&RunHeader::from_external(&external, 88, false)).unwrap();
            let external = RecordHeader { key: key_of(6), flags: 0, crc: 0, body_size: 3 };
            out.put(&RunHeader::from_external(&external, 4096, true)).unwrap();
            out.write(b"abc").unwrap();
            out.flush().unwrap();
        }

        let mut memory = vec![0u8; BUF_SIZE];
        let mut stream = RecordStream::<RunHeader>::open(&mut memory, &id).unwrap();
        let hd = *stream.header().unwrap();
        assert!(!hd.body_present);
        assert_eq!(hd.body_pos, 88);
        let mut body = [0u8; 16];
        // deferred body stores no bytes in the run
        assert_eq!(stream.read_body(&mut body).unwrap(), 0);

        assert!(stream.parse_next().unwrap());
        assert_eq!(stream.read_body(&mut body).unwrap(), 3);
        assert_eq!(&body[..3], b"abc");
        assert!(!stream.parse_next().unwrap());
    }
}
