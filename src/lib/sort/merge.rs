//! K-way merge of sorted runs.
//!
//! Each pass opens as many queued runs as the memory budget allows and
//! merges them through a min-heap. While further runs remain queued the
//! merged output is itself enqueued as a new run; the pass that drains the
//! queue writes the destination in external format, fetching deferred bodies
//! from the original input.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::path::Path;

use log::{debug, info};

use crate::buffer::RenderBuf;
use crate::errors::{Result, XxlsortError};
use crate::file::{FileId, FileIdRef, OutputFile};
use crate::mem::MIB;
use crate::record::{RunHeader, KEY_SIZE};
use crate::sort::export::{copy_stream_body, fetch_deferred, BodySource};
use crate::stream::{RecordStream, StreamHeader};

/// Write buffer carved per merge pass.
pub(crate) const MERGE_OUTPUT_BUF_SIZE: usize = 40 * MIB;

/// Read buffer carved per opened run; caps the merge fan-in at roughly
/// `(budget - 40 MiB) / 25 MiB`.
pub(crate) const MERGE_INPUT_BUF_SIZE: usize = 25 * MIB;

/// Heap entry: the key of the record a run stream currently sits at.
///
/// `BinaryHeap` is a max-heap, so entries are pushed wrapped in
/// `std::cmp::Reverse` to surface the smallest key first. Ties between runs
/// fall back to the stream index, which makes heap order deterministic but
/// carries no stability promise.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct MergeEntry {
    key: [u8; KEY_SIZE],
    stream: usize,
}

/// Merges queued runs until none remain. A no-op when the queue is already
/// empty (the run former already wrote the destination).
pub(crate) fn merge_runs(
    memory: &mut [u8],
    src: &FileIdRef,
    dest: &FileIdRef,
    runs: &mut VecDeque<FileIdRef>,
    temp_dir: Option<&Path>,
) -> Result<usize> {
    if runs.is_empty() {
        return Ok(0);
    }
    if memory.len() < MERGE_OUTPUT_BUF_SIZE + 2 * MERGE_INPUT_BUF_SIZE {
        return Err(XxlsortError::InvalidParameter {
            parameter: "memory budget".to_string(),
            reason: format!(
                "{} bytes cannot host the {} MiB merge output and two {} MiB run buffers",
                memory.len(),
                MERGE_OUTPUT_BUF_SIZE / MIB,
                MERGE_INPUT_BUF_SIZE / MIB
            ),
        });
    }

    let mut deferred_source = BodySource::new(src.clone());
    let mut passes = 0usize;

    while !runs.is_empty() {
        let (output_mem, input_mem) = memory.split_at_mut(MERGE_OUTPUT_BUF_SIZE);

        let mut streams: Vec<RecordStream<'_, RunHeader>> = Vec::new();
        let mut avail = Some(input_mem);
        loop {
            let Some(tail) = avail.take() else { break };
            if tail.len() < MERGE_INPUT_BUF_SIZE {
                break;
            }
            let Some(id) = runs.pop_front() else { break };
            let (buf, rest) = tail.split_at_mut(MERGE_INPUT_BUF_SIZE);
            avail = Some(rest);
            let stream = RecordStream::<RunHeader>::open(buf, &id)?;
            if stream.is_header_valid() {
                streams.push(stream);
            }
        }

        if streams.len() < 2 && !runs.is_empty() {
            return Err(XxlsortError::InvalidParameter {
                parameter: "memory budget".to_string(),
                reason: "merge fan-in below two; runs would never converge".to_string(),
            });
        }

        let mut heap: BinaryHeap<Reverse<MergeEntry>> = BinaryHeap::with_capacity(streams.len());
        for (index, stream) in streams.iter().enumerate() {
            if let Some(hd) = stream.header() {
                heap.push(Reverse(MergeEntry { key: *hd.key(), stream: index }));
            }
        }

        let is_final = runs.is_empty();
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
        let mut merged = 0u64;

        while let Some(Reverse(entry)) = heap.pop() {
            let stream = &mut streams[entry.stream];
            let hd = *stream
                .header()
                .ok_or_else(|| XxlsortError::internal("merge stream lost its header"))?;

            if is_final {
                output.put(&hd.external())?;
                if hd.body_present {
                    copy_stream_body(&mut output, stream)?;
                } else {
                    fetch_deferred(&mut output, &hd, &mut deferred_source)?;
                }
            } else {
                output.put(&hd)?;
                copy_stream_body(&mut output, stream)?;
            }
            merged += 1;

            if stream.parse_next()? {
                let hd = stream
                    .header()
                    .ok_or_else(|| XxlsortError::internal("merge stream lost its header"))?;
                heap.push(Reverse(MergeEntry { key: *hd.key(), stream: entry.stream }));
            }
        }
        output.flush()?;

        debug!(
            "merge pass {passes}: {} run(s), {merged} records -> {}",
            streams.len(),
            output_id.path().display()
        );
        passes += 1;
    }

    info!("merge done in {passes} pass(es)");
    Ok(passes)
}
