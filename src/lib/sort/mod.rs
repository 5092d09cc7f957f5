//! External-memory sort engine.
//!
//! The sort runs in two phases over a single memory arena sized by the
//! configured budget: the run former splits the input into sorted runs
//! (writing the destination directly when one pass suffices), then the
//! merger folds runs together until the destination is written. The
//! destination identity is created with auto-unlink armed, so any failure
//! removes a partial output along with every transient run.

pub mod element;
mod export;
mod merge;
mod split;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use log::info;

use crate::errors::Result;
use crate::file::FileId;
use crate::mem::{Arena, GIB, MIB};

pub use element::SortElement;

/// Default memory budget when none is configured (8 GiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 8 * GIB;

/// Statistics from a sort operation.
#[derive(Debug, Default)]
pub struct SortStats {
    /// Records read from the input (and written to the output).
    pub records: u64,
    /// Transient runs produced by the run former.
    pub runs_written: usize,
    /// Bytes spilled into transient runs by the run former.
    pub run_bytes: u64,
    /// Merge passes needed to drain the run queue.
    pub merge_passes: usize,
}

/// External sorter for record files.
///
/// ```no_run
/// use std::path::Path;
/// use xxlsort_lib::ExternalSorter;
///
/// let stats = ExternalSorter::new()
///     .memory_limit(512 * 1024 * 1024)
///     .sort(Path::new("input.bin"), Path::new("output.bin"))
///     .unwrap();
/// println!("sorted {} records", stats.records);
/// ```
pub struct ExternalSorter {
    memory_limit: usize,
    temp_dir: Option<PathBuf>,
}

impl ExternalSorter {
    /// Creates a sorter with the default memory budget.
    #[must_use]
    pub fn new() -> Self {
        Self { memory_limit: DEFAULT_MEMORY_LIMIT, temp_dir: None }
    }

    /// Sets the memory budget for the arena.
    #[must_use]
    pub fn memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Sets the directory for transient run files. Defaults to the
    /// `TMP`/`TEMP`/`TMPDIR` probe with a `/tmp` fallback.
    #[must_use]
    pub fn temp_dir(mut self, path: PathBuf) -> Self {
        self.temp_dir = Some(path);
        self
    }

    /// Sorts the records of `input` into `output` in ascending key order.
    ///
    /// On failure the output and every transient run are unlinked; on
    /// success the output is committed and only then released from
    /// auto-unlink.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, malformed input, an unallocatable arena, or a
    /// memory budget too small to drive the two phases.
    pub fn sort(&self, input: &Path, output: &Path) -> Result<SortStats> {
        info!("sorting {} -> {}", input.display(), output.display());
        info!("memory budget: {} MiB", self.memory_limit / MIB);

        let mut arena = Arena::alloc(self.memory_limit)?;
        let memory = arena.as_mut_slice();

        let src = FileId::with_path(input);
        let dest = FileId::with_path(output);
        dest.set_auto_unlink(true);

        let mut runs = VecDeque::new();
        let formed =
            split::split_and_sort(memory, &src, &dest, &mut runs, self.temp_dir.as_deref())?;
        let merge_passes =
            merge::merge_runs(memory, &src, &dest, &mut runs, self.temp_dir.as_deref())?;

        dest.set_auto_unlink(false);

        Ok(SortStats {
            records: formed.records,
            runs_written: formed.runs_written,
            run_bytes: formed.run_bytes,
            merge_passes,
        })
    }
}

impl Default for ExternalSorter {
    fn default() -> Self {
        Self::new()
    }
}
