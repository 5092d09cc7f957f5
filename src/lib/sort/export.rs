//! External-format emission shared by the run former and the merger,
//! including re-fetching deferred bodies from the original input.

use crate::buffer::RenderBuf;
use crate::errors::{Result, XxlsortError};
use crate::file::{FileIdRef, InputFile};
use crate::record::RunHeader;
use crate::stream::{RecordStream, StreamHeader};

/// Lazily opened read handle on the original input, used to fetch bodies
/// that intermediate runs deferred. Kept open for the lifetime of the phase
/// so repeated fetches pay one open.
pub(crate) struct BodySource {
    id: FileIdRef,
    file: Option<InputFile>,
}

impl BodySource {
    pub(crate) fn new(id: FileIdRef) -> Self {
        Self { id, file: None }
    }

    fn file(&mut self) -> Result<&mut InputFile> {
        if self.file.is_none() {
            self.file = Some(InputFile::open(&self.id)?);
        }
        self.file.as_mut().ok_or_else(|| XxlsortError::internal("body source not open"))
    }
}

/// Copies a deferred body from the original input into `output`, seeking to
/// the position recorded in the run header.
pub(crate) fn fetch_deferred(
    output: &mut RenderBuf<'_>,
    hd: &RunHeader,
    source: &mut BodySource,
) -> Result<()> {
    let file = source.file()?;
    file.set_file_pos(hd.body_pos)?;
    let mut left = hd.body_size;
    while left > 0 {
        let free = output.free_mut()?;
        let want = (free.len() as u64).min(left) as usize;
        let got = file.read(&mut free[..want])?;
        if got < want {
            return Err(XxlsortError::DataCorrupt {
                path: file.path().to_path_buf(),
                offset: file.pos(),
            });
        }
        output.commit(got);
        left -= got as u64;
    }
    Ok(())
}

/// Streams the current record's stored body from `stream` into `output`.
pub(crate) fn copy_stream_body<H: StreamHeader>(
    output: &mut RenderBuf<'_>,
    stream: &mut RecordStream<'_, H>,
) -> Result<()> {
    loop {
        let free = output.free_mut()?;
        let n = stream.read_body(free)?;
        if n == 0 {
            return Ok(());
        }
        output.commit(n);
    }
}
