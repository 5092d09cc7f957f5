//! Fixed-layout record headers and their wire codecs.
//!
//! The external format is the public on-disk layout: an 88-byte header with
//! no padding, immediately followed by the variable-length body. The run
//! format used inside intermediate run files widens the header with the
//! body's offset in the original input and a presence flag, and is written at
//! 16-byte alignment. Integer fields use host byte order; files are intended
//! to be read on the architecture that wrote them.

use crate::buffer::Repr;
use crate::mem::MIB;

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_ne_bytes(bytes)
}

/// Size of the opaque binary sort key.
pub const KEY_SIZE: usize = 64;

/// Largest body any record may declare.
pub const MAX_BODY_SIZE: u64 = 100 * MIB as u64;

/// External record header: key, flags, crc, body size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Opaque binary sort key, compared lexicographically.
    pub key: [u8; KEY_SIZE],
    /// Opaque 64-bit value, passed through.
    pub flags: u64,
    /// Opaque 64-bit value, passed through.
    pub crc: u64,
    /// Length in bytes of the body that follows the header.
    pub body_size: u64,
}

impl Repr for RecordHeader {
    const ALIGNMENT: usize = 1;
    const SIZE: usize = KEY_SIZE + 8 + 8 + 8;

    fn encode(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf[..KEY_SIZE].copy_from_slice(&self.key);
        buf[64..72].copy_from_slice(&self.flags.to_ne_bytes());
        buf[72..80].copy_from_slice(&self.crc.to_ne_bytes());
        buf[80..88].copy_from_slice(&self.body_size.to_ne_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len(), Self::SIZE);
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&buf[..KEY_SIZE]);
        Self {
            key,
            flags: read_u64(buf, 64),
            crc: read_u64(buf, 72),
            body_size: read_u64(buf, 80),
        }
    }
}

/// Run-file record header: the external fields widened with the body's
/// position in the original input and a presence flag.
///
/// When `body_present` is false the body bytes are not stored in the run;
/// they are re-fetched from the original input at `body_pos` when the record
/// is finally exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHeader {
    /// Opaque binary sort key, compared lexicographically.
    pub key: [u8; KEY_SIZE],
    /// Opaque 64-bit value, passed through.
    pub flags: u64,
    /// Opaque 64-bit value, passed through.
    pub crc: u64,
    /// Length in bytes of the record body.
    pub body_size: u64,
    /// Offset of the body in the original input file.
    pub body_pos: u64,
    /// Whether the body bytes follow this header in the run.
    pub body_present: bool,
}

impl RunHeader {
    /// Widens an external header parsed at `body_pos` in the input.
    #[must_use]
    pub fn from_external(hd: &RecordHeader, body_pos: u64, body_present: bool) -> Self {
        Self {
            key: hd.key,
            flags: hd.flags,
            crc: hd.crc,
            body_size: hd.body_size,
            body_pos,
            body_present,
        }
    }

    /// Narrows back to the external header.
    #[must_use]
    pub fn external(&self) -> RecordHeader {
        RecordHeader {
            key: self.key,
            flags: self.flags,
            crc: self.crc,
            body_size: self.body_size,
        }
    }

    /// Bytes of body stored inline in the run after this header.
    #[must_use]
    pub fn stored_body_size(&self) -> u64 {
        if self.body_present { self.body_size } else { 0 }
    }
}

impl Repr for RunHeader {
    const ALIGNMENT: usize = 16;
    const SIZE: usize = RecordHeader::SIZE + 8 + 1;

    fn encode(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), Self::SIZE);
        self.external().encode(&mut buf[..RecordHeader::SIZE]);
        buf[88..96].copy_from_slice(&self.body_pos.to_ne_bytes());
        buf[96] = u8::from(self.body_present);
    }

    fn decode(buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len(), Self::SIZE);
        let external = RecordHeader::decode(&buf[..RecordHeader::SIZE]);
        Self::from_external(&external, read_u64(buf, 88), buf[96] != 0)
    }
}
