#![deny(unsafe_code)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

//! # xxlsort - external-memory sort of keyed binary records
//!
//! This library sorts streams of variable-length records keyed by a fixed
//! 64-byte binary key, in ascending lexicographic key order, under a
//! configurable memory budget. Inputs may vastly exceed available RAM:
//! sorting happens in two phases, first splitting the input into sorted runs
//! that each fit in memory, then merging runs through a min-heap until a
//! single sorted output remains.
//!
//! ## Modules
//!
//! - **[`sort`]** - the sort engine ([`ExternalSorter`]) and its phases
//! - **[`record`]** - the external and run-file record layouts
//! - **[`stream`]** - streaming record parser over both layouts
//! - **[`buffer`]** - alignment-preserving buffered reader and writer
//! - **[`file`]** - file identities with auto-unlink, position-tracked handles
//! - **[`mem`]** - the memory arena and alignment helpers
//! - **[`errors`]** - the error taxonomy
//! - **[`logging`]** - log formatting helpers

pub mod buffer;
pub mod errors;
pub mod file;
pub mod logging;
pub mod mem;
pub mod record;
pub mod sort;
pub mod stream;

pub use errors::{Result, XxlsortError};
pub use sort::{ExternalSorter, SortStats, DEFAULT_MEMORY_LIMIT};
