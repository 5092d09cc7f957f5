//! Run forming: split the input into memory-sized sorted runs.
//!
//! Each pass fills the workspace with records in run format while a
//! [`SortElement`] array summarizes them, sorts the elements, and writes one
//! run. Records and elements are charged against the same free-space check,
//! so the two regions can never collide. Bodies at or above the deferral
//! threshold are left on disk during intermediate passes: only their input
//! offset travels through the runs, and the bytes are fetched again at final
//! emission. When the whole input fits into a single pass the run is written
//! straight to the destination in external format and the merge phase has
//! nothing to do.

use std::collections::VecDeque;
use std::path::Path;

use log::{debug, info};

use crate::buffer::{RenderBuf, Repr};
use crate::errors::{Result, XxlsortError};
use crate::file::{FileId, FileIdRef, OutputFile};
use crate::mem::{GIB, MIB};
use crate::record::{RecordHeader, RunHeader};
use crate::sort::element::SortElement;
use crate::sort::export::{fetch_deferred, BodySource};
use crate::stream::RecordStream;

/// Read buffer carved for the input stream.
pub(crate) const INPUT_BUF_SIZE: usize = 4 * MIB;

/// Write buffer carved per pass for the produced run.
pub(crate) const RUN_OUTPUT_BUF_SIZE: usize = 25 * MIB;

/// Bodies of this size or larger stay on disk during intermediate passes,
/// provided the input supports the seeks needed to fetch them back.
pub(crate) const DEFER_BODY_THRESHOLD: u64 = MIB as u64;

/// Upper bound on the per-pass record workspace, so element offsets fit in
/// 32 bits.
const WORKSPACE_LIMIT: usize = 4 * GIB;

/// Outcome of the run-forming phase.
#[derive(Debug, Default)]
pub(crate) struct SplitOutcome {
    /// Records consumed from the input.
    pub records: u64,
    /// Transient runs written (zero when the single-pass short-circuit
    /// emitted the final output directly).
    pub runs_written: usize,
    /// Bytes written into transient runs.
    pub run_bytes: u64,
}

/// Consumes the identified input and produces sorted runs, appending one
/// transient file id per non-final pass to `runs`. A single exhausting pass
/// writes the destination directly in external format.
pub(crate) fn split_and_sort(
    memory: &mut [u8],
    src: &FileIdRef,
    dest: &FileIdRef,
    runs: &mut VecDeque<FileIdRef>,
    temp_dir: Option<&Path>,
) -> Result<SplitOutcome> {
    if memory.len() < INPUT_BUF_SIZE + RUN_OUTPUT_BUF_SIZE + MIB {
        return Err(XxlsortError::InvalidParameter {
            parameter: "memory budget".to_string(),
            reason: format!(
                "{} bytes cannot host the {} MiB input and {} MiB run buffers",
                memory.len(),
                INPUT_BUF_SIZE / MIB,
                RUN_OUTPUT_BUF_SIZE / MIB
            ),
        });
    }

    let (input_mem, work) = memory.split_at_mut(INPUT_BUF_SIZE);
    let mut input = RecordStream::<RecordHeader>::open(input_mem, src)?;
    let defer_threshold = if input.is_seekable() { DEFER_BODY_THRESHOLD } else { u64::MAX };
    let mut deferred_source = BodySource::new(src.clone());

    let mut outcome = SplitOutcome::default();
    let mut pass = 0usize;

    loop {
        let (output_mem, workspace) = work.split_at_mut(RUN_OUTPUT_BUF_SIZE);
        let limit = workspace.len().min(WORKSPACE_LIMIT);
        let workspace = &mut workspace[..limit];

        let mut membuf = RenderBuf::detached(workspace);
        let mut elements: Vec<SortElement> = Vec::new();

        while let Some(hd) = input.header().copied() {
            let keep_body = hd.body_size < defer_threshold;
            let stored_body = if keep_body { hd.body_size as usize } else { 0 };
            let reserved = (elements.len() + 1) * std::mem::size_of::<SortElement>();
            let needed = RunHeader::ALIGNMENT + RunHeader::SIZE + stored_body + reserved;
            if membuf.free_len() < needed {
                break;
            }

            let run_hd = RunHeader::from_external(&hd, input.body_pos(), keep_body);
            let offset = membuf.put(&run_hd)?;
            let offset = u32::try_from(offset)
                .map_err(|_| XxlsortError::internal("workspace offset exceeds 32 bits"))?;
            elements.push(SortElement::new(&run_hd.key, offset));

            if keep_body {
                loop {
                    let free = membuf.free_mut()?;
                    let n = input.read_body(free)?;
                    if n == 0 {
                        break;
                    }
                    membuf.commit(n);
                }
            }

            outcome.records += 1;
            input.parse_next()?;
        }

        if elements.is_empty() && input.is_header_valid() {
            return Err(XxlsortError::InvalidParameter {
                parameter: "memory budget".to_string(),
                reason: "too small to hold a single input record".to_string(),
            });
        }

        {
            let base = membuf.data();
            elements.sort_unstable_by(|a, b| a.compare_in(b, base));
        }

        let is_final = pass == 0 && !input.is_header_valid();
        let output_id = if is_final {
            dest.clone()
        } else {
            let id = match temp_dir {
                Some(dir) => FileId::temporary_in(dir)?,
                None => FileId::temporary()?,
            };
            runs.push_back(id.clone());
            id
        };

        let mut output = RenderBuf::new(output_mem, OutputFile::create(&output_id)?);
        let data = membuf.data();
        for element in &elements {
            let offset = element.offset();
            let hd = RunHeader::decode(&data[offset..offset + RunHeader::SIZE]);
            let body = &data[offset + RunHeader::SIZE..][..hd.stored_body_size() as usize];
            if is_final {
                output.put(&hd.external())?;
                if hd.body_present {
                    output.write(body)?;
                } else {
                    fetch_deferred(&mut output, &hd, &mut deferred_source)?;
                }
            } else {
                output.put(&hd)?;
                output.write(body)?;
            }
        }
        output.flush()?;

        if is_final {
            debug!("single pass: wrote {} records straight to destination", elements.len());
        } else {
            outcome.runs_written += 1;
            outcome.run_bytes += output.file_pos();
            debug!(
                "pass {pass}: spilled {} records ({} bytes) to {}",
                elements.len(),
                output.file_pos(),
                output_id.path().display()
            );
        }

        pass += 1;
        if !input.is_header_valid() {
            break;
        }
    }

    info!(
        "run forming done: {} records in {} pass(es), {} transient run(s)",
        outcome.records, pass, outcome.runs_written
    );
    Ok(outcome)
}
