//! Compact sort-array element.
//!
//! A pass of the run former sorts an array of 16-byte elements instead of
//! the records themselves: 12 bytes of key prefix plus a 32-bit offset into
//! the pass's record workspace. For high-entropy keys the prefix settles
//! almost every comparison without touching the record, and four elements
//! share a cache line; the offset keeps the element half the size of a
//! pointer-based one. The element is not an owning reference: it is only
//! meaningful together with the workspace slice of the pass that created it,
//! which is why comparison takes that slice as an explicit base.

use std::cmp::Ordering;

use crate::record::KEY_SIZE;

/// Bytes of key embedded directly in the element.
pub const PREFIX_LEN: usize = 12;

/// One entry of the in-memory sort array: key prefix plus the offset of the
/// record header it summarizes, relative to the pass workspace.
#[derive(Debug, Clone, Copy)]
pub struct SortElement {
    prefix: [u8; PREFIX_LEN],
    offset: u32,
}

impl SortElement {
    /// Builds an element for the record header stored at `offset` in the
    /// pass workspace.
    #[must_use]
    pub fn new(key: &[u8; KEY_SIZE], offset: u32) -> Self {
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&key[..PREFIX_LEN]);
        Self { prefix, offset }
    }

    /// Workspace offset of the record header.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    /// Compares two elements by full key. The prefix decides first; only on
    /// a prefix tie are the remaining key bytes fetched from `workspace`,
    /// which must be the record workspace both elements were built over.
    #[must_use]
    pub fn compare_in(&self, other: &Self, workspace: &[u8]) -> Ordering {
        self.prefix.cmp(&other.prefix).then_with(|| {
            let a = &workspace[self.offset()..self.offset() + KEY_SIZE];
            let b = &workspace[other.offset()..other.offset() + KEY_SIZE];
            a[PREFIX_LEN..].cmp(&b[PREFIX_LEN..])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RenderBuf;
    use crate::mem::KIB;
    use crate::record::RecordHeader;

    #[test]
    fn test_element_is_16_bytes() {
        assert_eq!(std::mem::size_of::<SortElement>(), 16);
    }

    fn key_with(prefix: u8, tail: u8) -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        key[0] = prefix;
        key[KEY_SIZE - 1] = tail;
        key
    }

    #[test]
    fn test_prefix_decides_without_workspace_access() {
        let a = SortElement::new(&key_with(1, 0), 0);
        let b = SortElement::new(&key_with(2, 0), 0);
        // offsets point nowhere; an empty workspace proves the records are
        // not touched when prefixes differ
        assert_eq!(a.compare_in(&b, &[]), Ordering::Less);
        assert_eq!(b.compare_in(&a, &[]), Ordering::Greater);
    }

    #[test]
    fn test_prefix_tie_falls_back_to_full_key() {
        let mut workspace = vec![0u8; 128 * KIB];
        let mut bump = RenderBuf::detached(&mut workspace);

        let hd_low = RecordHeader { key: key_with(7, 1), flags: 0, crc: 0, body_size: 0 };
        let hd_high = RecordHeader { key: key_with(7, 2), flags: 0, crc: 0, body_size: 0 };
        let off_low = bump.put(&hd_low).unwrap();
        let off_high = bump.put(&hd_high).unwrap();

        let low = SortElement::new(&hd_low.key, off_low as u32);
        let high = SortElement::new(&hd_high.key, off_high as u32);

        let base = bump.data();
        assert_eq!(low.compare_in(&high, base), Ordering::Less);
        assert_eq!(high.compare_in(&low, base), Ordering::Greater);
        assert_eq!(low.compare_in(&low, base), Ordering::Equal);
    }
}
