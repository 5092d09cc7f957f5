//! File identities and position-tracked file handles.
//!
//! A [`FileId`] names a file on disk, as opposed to an open handle, and can
//! auto-unlink the file when the last reference to the identity drops. Handles
//! ([`InputFile`], [`OutputFile`]) open lazily by path, track a logical
//! position, and retry interrupted system calls so `EINTR` never surfaces.

use std::cell::Cell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::errors::{Result, XxlsortError};

/// Prefix used for every transient run file created by the engine.
pub const TEMP_PREFIX: &str = "yndx-xxlsort-";

/// Environment variables probed, in order, for the temp-file directory.
const TEMP_DIR_VARS: [&str; 3] = ["TMP", "TEMP", "TMPDIR"];

/// Shared handle to a file identity.
pub type FileIdRef = Rc<FileId>;

/// Something that identifies a file on disk (as opposed to an open file).
/// The file is unlinked when the identity drops, if auto-unlink is set.
#[derive(Debug)]
pub struct FileId {
    path: PathBuf,
    auto_unlink: Cell<bool>,
}

impl FileId {
    /// Creates an identity for an existing path. Auto-unlink starts off.
    pub fn with_path(path: impl Into<PathBuf>) -> FileIdRef {
        Rc::new(FileId { path: path.into(), auto_unlink: Cell::new(false) })
    }

    /// Creates a fresh temporary file in the directory named by the first
    /// non-empty of `TMP`, `TEMP`, `TMPDIR`, falling back to `/tmp`.
    ///
    /// The file is created with user-only permissions and a random suffix
    /// after [`TEMP_PREFIX`]; the creation descriptor is closed immediately
    /// and the file is later re-opened by path. Auto-unlink starts on.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be created.
    pub fn temporary() -> Result<FileIdRef> {
        Self::temporary_in(&resolve_temp_dir())
    }

    /// Same as [`FileId::temporary`] with an explicit directory.
    pub fn temporary_in(dir: &Path) -> Result<FileIdRef> {
        let file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| XxlsortError::io("Creating temporary file in", dir, e))?;
        let (handle, path) = file
            .keep()
            .map_err(|e| XxlsortError::io("Creating temporary file in", dir, e.error))?;
        drop(handle);
        Ok(Rc::new(FileId { path, auto_unlink: Cell::new(true) }))
    }

    /// The path this identity names.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Arms or disarms unlink-on-drop.
    pub fn set_auto_unlink(&self, auto_unlink: bool) {
        self.auto_unlink.set(auto_unlink);
    }
}

impl Drop for FileId {
    fn drop(&mut self) {
        if self.auto_unlink.get() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("Unlinking {}: {e}", self.path.display());
            }
        }
    }
}

/// Picks the temp-file directory per the `TMP`/`TEMP`/`TMPDIR` probe order.
#[must_use]
pub fn resolve_temp_dir() -> PathBuf {
    for var in TEMP_DIR_VARS {
        if let Some(value) = std::env::var_os(var) {
            if !value.is_empty() {
                return PathBuf::from(value);
            }
        }
    }
    PathBuf::from("/tmp")
}

/// Read-only handle with a tracked logical position.
#[derive(Debug)]
pub struct InputFile {
    file: File,
    id: FileIdRef,
    pos: u64,
}

impl InputFile {
    /// Opens the identified file for reading.
    ///
    /// # Errors
    ///
    /// Returns an I/O error carrying the path when the open fails.
    pub fn open(id: &FileIdRef) -> Result<Self> {
        let file = File::open(id.path())
            .map_err(|e| XxlsortError::io("Error opening", id.path(), e))?;
        Ok(Self { file, id: Rc::clone(id), pos: 0 })
    }

    /// Bytes consumed from the file so far (or the last seek target).
    #[must_use]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Path of the underlying file, for error context.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.id.path()
    }

    /// Whether the descriptor refers to a regular, seekable file.
    #[must_use]
    pub fn is_seekable(&self) -> bool {
        self.file.metadata().map(|m| m.file_type().is_file()).unwrap_or(false)
    }

    /// Fills `buf` from the current position, retrying on interrupt, until
    /// the buffer is full or EOF. Returns the number of bytes read; zero
    /// means end of file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error carrying the path on read failure.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    self.pos += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(XxlsortError::io("Reading from", self.path(), e)),
            }
        }
        Ok(filled)
    }

    /// Seeks to an absolute position; a no-op when already there.
    ///
    /// # Errors
    ///
    /// Fails when the descriptor is not seekable (pipe, socket).
    pub fn set_file_pos(&mut self, new_pos: u64) -> Result<()> {
        if self.pos == new_pos {
            return Ok(());
        }
        self.file
            .seek(SeekFrom::Start(new_pos))
            .map_err(|e| XxlsortError::io("Seeking in", self.path(), e))?;
        self.pos = new_pos;
        Ok(())
    }
}

/// Write-only handle with a tracked logical position. Creation truncates.
pub struct OutputFile {
    file: File,
    id: FileIdRef,
    pos: u64,
}

impl OutputFile {
    /// Creates (or truncates) the identified file for writing.
    ///
    /// # Errors
    ///
    /// Returns an I/O error carrying the path when the open fails.
    pub fn create(id: &FileIdRef) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(id.path())
            .map_err(|e| XxlsortError::io("Error opening", id.path(), e))?;
        Ok(Self { file, id: Rc::clone(id), pos: 0 })
    }

    /// Bytes written to the file so far.
    #[must_use]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Path of the underlying file, for error context.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.id.path()
    }

    /// Writes all of `buf`, retrying on interrupt.
    ///
    /// # Errors
    ///
    /// Returns an I/O error carrying the path on write failure.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.file.write(&buf[written..]) {
                Ok(n) => {
                    written += n;
                    self.pos += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(XxlsortError::io("Writing to", self.path(), e)),
            }
        }
        Ok(())
    }

    /// Forces written data to stable storage. Descriptors that cannot fsync
    /// (pipes, sockets) are treated as already flushed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error carrying the path on fsync failure.
    pub fn flush(&mut self) -> Result<()> {
        match self.file.sync_all() {
            Ok(()) => Ok(()),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::InvalidInput | io::ErrorKind::Unsupported
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(XxlsortError::io("Flushing", self.path(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_file_name_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let id = FileId::temporary_in(dir.path()).unwrap();
            path = id.path().to_path_buf();
            assert!(path.exists());
            assert!(path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(TEMP_PREFIX));
        }
        assert!(!path.exists(), "temporary file must unlink on drop");
    }

    #[test]
    fn test_auto_unlink_can_be_disarmed() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let id = FileId::temporary_in(dir.path()).unwrap();
            id.set_auto_unlink(false);
            path = id.path().to_path_buf();
        }
        assert!(path.exists());
    }

    #[test]
    fn test_with_path_never_unlinks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();
        drop(FileId::with_path(&path));
        assert!(path.exists());
    }

    #[test]
    fn test_read_write_roundtrip_and_pos() {
        let dir = tempfile::tempdir().unwrap();
        let id = FileId::with_path(dir.path().join("rw.bin"));

        let mut out = OutputFile::create(&id).unwrap();
        out.write(b"hello world").unwrap();
        assert_eq!(out.pos(), 11);
        out.flush().unwrap();

        let mut inp = InputFile::open(&id).unwrap();
        assert!(inp.is_seekable());
        let mut buf = [0u8; 5];
        assert_eq!(inp.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(inp.pos(), 5);

        inp.set_file_pos(6).unwrap();
        let mut rest = [0u8; 16];
        assert_eq!(inp.read(&mut rest).unwrap(), 5);
        assert_eq!(&rest[..5], b"world");
    }

    #[test]
    fn test_read_at_eof_returns_zero() {
        let dir = tempfile::tempdir().unwrap();
        let id = FileId::with_path(dir.path().join("empty.bin"));
        OutputFile::create(&id).unwrap().flush().unwrap();

        let mut inp = InputFile::open(&id).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(inp.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_open_missing_file_carries_path() {
        let id = FileId::with_path("/no/such/dir/file.bin");
        let err = InputFile::open(&id).unwrap_err();
        assert!(format!("{err}").contains("/no/such/dir/file.bin"));
    }
}
