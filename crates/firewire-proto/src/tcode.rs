//! Transaction codes.
//!
//! The low values are the on-the-wire tcodes from IEEE 1394; the extended
//! values (0x10+) are how the kernel interface encodes the lock class of an
//! outbound request, since the wire form (`LOCK_REQUEST`) does not say which
//! atomic operation is meant.

/// Quadlet write request.
pub const WRITE_QUADLET_REQUEST: u32 = 0x0;
/// Block write request.
pub const WRITE_BLOCK_REQUEST: u32 = 0x1;
/// Write response.
pub const WRITE_RESPONSE: u32 = 0x2;
/// Quadlet read request.
pub const READ_QUADLET_REQUEST: u32 = 0x4;
/// Block read request.
pub const READ_BLOCK_REQUEST: u32 = 0x5;
/// Quadlet read response.
pub const READ_QUADLET_RESPONSE: u32 = 0x6;
/// Block read response.
pub const READ_BLOCK_RESPONSE: u32 = 0x7;
/// Cycle start.
pub const CYCLE_START: u32 = 0x8;
/// Lock request (wire form; the extended tcodes below select the operation).
pub const LOCK_REQUEST: u32 = 0x9;
/// Isochronous stream data.
pub const STREAM_DATA: u32 = 0xa;
/// Lock response.
pub const LOCK_RESPONSE: u32 = 0xb;

// ── Extended lock tcodes ─────────────────────────────────────────────────────

/// Mask-swap lock.
pub const LOCK_MASK_SWAP: u32 = 0x11;
/// Compare-swap lock.
pub const LOCK_COMPARE_SWAP: u32 = 0x12;
/// Fetch-add lock (big-endian addition).
pub const LOCK_FETCH_ADD: u32 = 0x13;
/// Little-add lock (little-endian addition).
pub const LOCK_LITTLE_ADD: u32 = 0x14;
/// Bounded-add lock.
pub const LOCK_BOUNDED_ADD: u32 = 0x15;
/// Wrap-add lock.
pub const LOCK_WRAP_ADD: u32 = 0x16;
/// Vendor-dependent lock.
pub const LOCK_VENDOR_DEPENDENT: u32 = 0x17;

/// Picks the write tcode for a payload: the quadlet form exactly when the
/// payload is four bytes at a quadlet-aligned offset, the block form
/// otherwise.
#[must_use]
pub const fn write_tcode(offset: u64, length: usize) -> u32 {
    if length == 4 && offset & 3 == 0 {
        WRITE_QUADLET_REQUEST
    } else {
        WRITE_BLOCK_REQUEST
    }
}

/// Picks the read tcode, by the same quadlet/block rule as [`write_tcode`].
#[must_use]
pub const fn read_tcode(offset: u64, length: usize) -> u32 {
    if length == 4 && offset & 3 == 0 {
        READ_QUADLET_REQUEST
    } else {
        READ_BLOCK_REQUEST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_four_bytes_selects_quadlet() {
        assert_eq!(read_tcode(0xffff_f000_0200, 4), READ_QUADLET_REQUEST);
        assert_eq!(write_tcode(0xffff_f000_0200, 4), WRITE_QUADLET_REQUEST);
    }

    #[test]
    fn unaligned_offset_selects_block() {
        assert_eq!(read_tcode(0x3, 4), READ_BLOCK_REQUEST);
        assert_eq!(write_tcode(0x3, 4), WRITE_BLOCK_REQUEST);
    }

    #[test]
    fn non_quadlet_length_selects_block() {
        assert_eq!(read_tcode(0, 8), READ_BLOCK_REQUEST);
        assert_eq!(read_tcode(0, 1), READ_BLOCK_REQUEST);
        assert_eq!(write_tcode(0x10, 0x200), WRITE_BLOCK_REQUEST);
    }
}
