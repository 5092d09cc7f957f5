//! Memory sizes, alignment helpers and the anonymous sort arena.
//!
//! All bulk buffers used by the sort engine are carved out of a single
//! [`Arena`] allocated once at startup. The arena view handed to the engine
//! starts on an [`ALIGNMENT_MAX`] boundary with a length that is a multiple of
//! it, so that offsets into any carved sub-slice agree with raw addresses for
//! every supported alignment. That property is what lets the buffered reader
//! and writer keep in-memory offsets congruent with on-disk offsets modulo
//! 64 KiB (see [`crate::buffer`]).

use memmap2::MmapMut;

use crate::errors::{Result, XxlsortError};

/// One kibibyte.
pub const KIB: usize = 1024;
/// One mebibyte.
pub const MIB: usize = 1024 * KIB;
/// One gibibyte.
pub const GIB: usize = 1024 * MIB;

/// Largest alignment any caller may request from the buffer layer.
pub const ALIGNMENT_MAX: usize = 64 * KIB;

/// Returns whether `n` is a supported alignment: a power of two in
/// `1..=ALIGNMENT_MAX`.
#[must_use]
pub fn is_valid_alignment(n: usize) -> bool {
    n.is_power_of_two() && n <= ALIGNMENT_MAX
}

/// Rounds `value` up to the next multiple of `align`.
///
/// `align` must be a supported alignment.
#[must_use]
pub fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(is_valid_alignment(align));
    (value + align - 1) & !(align - 1)
}

/// Shrinks `mem` to the largest sub-slice whose start address is `align`ed
/// and whose length is a multiple of `align`.
///
/// Returns an empty slice when `mem` cannot hold a single aligned quantum.
#[must_use]
pub fn aligned(mem: &mut [u8], align: usize) -> &mut [u8] {
    debug_assert!(is_valid_alignment(align));
    let offset = mem.as_ptr().align_offset(align).min(mem.len());
    let len = (mem.len() - offset) & !(align - 1);
    &mut mem[offset..offset + len]
}

/// Shorthand for [`aligned`] at [`ALIGNMENT_MAX`].
#[must_use]
pub fn aligned_max(mem: &mut [u8]) -> &mut [u8] {
    aligned(mem, ALIGNMENT_MAX)
}

/// The process-wide anonymous memory region sized by the memory budget.
///
/// Backed by an anonymous mapping so untouched pages cost nothing; the
/// mapping is over-allocated by one alignment quantum so the aligned view can
/// be taken without losing budgeted capacity.
pub struct Arena {
    map: MmapMut,
    size: usize,
}

impl Arena {
    /// Allocates an arena of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`XxlsortError::OutOfMemory`] when the mapping cannot be
    /// established.
    pub fn alloc(size: usize) -> Result<Self> {
        let map = MmapMut::map_anon(size + ALIGNMENT_MAX)
            .map_err(|source| XxlsortError::OutOfMemory { size, source })?;
        Ok(Self { map, size })
    }

    /// The usable, maximally aligned view of the arena.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let usable = self.size & !(ALIGNMENT_MAX - 1);
        let view = aligned_max(&mut self.map[..]);
        let len = view.len().min(usable);
        &mut view[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 16, 0)]
    #[case(1, 16, 16)]
    #[case(16, 16, 16)]
    #[case(17, 16, 32)]
    #[case(65_535, ALIGNMENT_MAX, 65_536)]
    fn test_align_up(#[case] value: usize, #[case] align: usize, #[case] expected: usize) {
        assert_eq!(align_up(value, align), expected);
    }

    #[test]
    fn test_is_valid_alignment() {
        assert!(is_valid_alignment(1));
        assert!(is_valid_alignment(16));
        assert!(is_valid_alignment(ALIGNMENT_MAX));
        assert!(!is_valid_alignment(0));
        assert!(!is_valid_alignment(3));
        assert!(!is_valid_alignment(ALIGNMENT_MAX * 2));
    }

    #[test]
    fn test_aligned_start_and_len() {
        let mut backing = vec![0u8; 256 * KIB];
        let view = aligned_max(&mut backing);
        assert_eq!(view.as_ptr() as usize % ALIGNMENT_MAX, 0);
        assert_eq!(view.len() % ALIGNMENT_MAX, 0);
        assert!(view.len() >= 128 * KIB);
    }

    #[test]
    fn test_aligned_too_small_is_empty() {
        let mut backing = vec![0u8; 16];
        assert!(aligned_max(&mut backing).is_empty());
    }

    #[test]
    fn test_arena_view_is_aligned_and_budgeted() {
        let mut arena = Arena::alloc(3 * MIB + 123).unwrap();
        let view = arena.as_mut_slice();
        assert_eq!(view.as_ptr() as usize % ALIGNMENT_MAX, 0);
        assert_eq!(view.len(), 3 * MIB);
    }
}
