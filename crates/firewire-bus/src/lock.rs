//! Lock transaction operands.
//!
//! A lock request carries one or two operands whose meaning depends on the
//! atomic operation; the kernel takes them concatenated in one buffer and
//! picks the operation from the extended tcode.

use bytes::{BufMut, Bytes, BytesMut};
use firewire_proto::tcode;

use crate::error::{FwError, Result};

/// Atomic operation of a lock transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOp {
    /// `new = (old & ~arg) | (data & arg)`.
    MaskSwap,
    /// `new = (old == arg) ? data : old`.
    CompareSwap,
    /// `new = old + data`, big-endian.
    FetchAdd,
    /// `new = old + data`, little-endian.
    LittleAdd,
    /// `new = (old != arg) ? old + data : old`.
    BoundedAdd,
    /// `new = (old != arg) ? old + data : data`.
    WrapAdd,
}

impl LockOp {
    /// Extended tcode the kernel interface wants for this operation.
    #[must_use]
    pub const fn tcode(self) -> u32 {
        match self {
            Self::MaskSwap => tcode::LOCK_MASK_SWAP,
            Self::CompareSwap => tcode::LOCK_COMPARE_SWAP,
            Self::FetchAdd => tcode::LOCK_FETCH_ADD,
            Self::LittleAdd => tcode::LOCK_LITTLE_ADD,
            Self::BoundedAdd => tcode::LOCK_BOUNDED_ADD,
            Self::WrapAdd => tcode::LOCK_WRAP_ADD,
        }
    }

    /// Operands the operation takes: the adds without a bound take one,
    /// everything else two.
    #[must_use]
    pub const fn operand_count(self) -> usize {
        match self {
            Self::FetchAdd | Self::LittleAdd => 1,
            Self::MaskSwap | Self::CompareSwap | Self::BoundedAdd | Self::WrapAdd => 2,
        }
    }

    /// Operation name as spelled in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MaskSwap => "mask_swap",
            Self::CompareSwap => "compare_swap",
            Self::FetchAdd => "fetch_add",
            Self::LittleAdd => "little_add",
            Self::BoundedAdd => "bounded_add",
            Self::WrapAdd => "wrap_add",
        }
    }
}

/// Validates lock operands and concatenates them into the request payload.
///
/// Each operand must be 32 or 64 bits; two-operand operations require both
/// widths to match.
///
/// # Errors
///
/// `OperandCount`, `OperandWidth`, or `OperandSizeMismatch` when the
/// operands do not fit the operation.
pub fn encode_operands(op: LockOp, operands: &[Bytes]) -> Result<Bytes> {
    if operands.len() != op.operand_count() {
        return Err(FwError::OperandCount {
            op: op.name(),
            expected: op.operand_count(),
            given: operands.len(),
        });
    }
    for operand in operands {
        if operand.len() != 4 && operand.len() != 8 {
            return Err(FwError::OperandWidth {
                bytes: operand.len(),
            });
        }
    }
    if let [first, second] = operands {
        if first.len() != second.len() {
            return Err(FwError::OperandSizeMismatch {
                first: first.len(),
                second: second.len(),
            });
        }
    }
    let mut payload = BytesMut::with_capacity(operands.iter().map(Bytes::len).sum());
    for operand in operands {
        payload.put_slice(operand);
    }
    Ok(payload.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_swap_concatenates_both_operands() {
        let payload = encode_operands(
            LockOp::CompareSwap,
            &[
                Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
                Bytes::from_static(&[0x01, 0x02, 0x03, 0x04]),
            ],
        )
        .unwrap();
        assert_eq!(&payload[..], &[0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn fetch_add_takes_a_single_operand() {
        let one = Bytes::from_static(&[0, 0, 0, 1]);
        let err = encode_operands(LockOp::FetchAdd, &[one.clone(), one]).unwrap_err();
        assert_eq!(err.to_string(), "fetch_add takes 1 operand(s), got 2");
    }

    #[test]
    fn rejects_odd_widths() {
        let err = encode_operands(LockOp::LittleAdd, &[Bytes::from_static(&[1, 2, 3])])
            .unwrap_err();
        assert_eq!(err.to_string(), "data size must be 32 or 64 bits");
    }

    #[test]
    fn rejects_mixed_widths() {
        let err = encode_operands(
            LockOp::MaskSwap,
            &[
                Bytes::from_static(&[0; 4]),
                Bytes::from_static(&[0; 8]),
            ],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "both data blocks must have the same size");
    }

    #[test]
    fn sixty_four_bit_operands_pass() {
        let payload = encode_operands(
            LockOp::BoundedAdd,
            &[Bytes::from_static(&[0; 8]), Bytes::from_static(&[1; 8])],
        )
        .unwrap();
        assert_eq!(payload.len(), 16);
    }
}
