//! Response codes.

use std::fmt;

/// Outcome of an asynchronous transaction, as reported by the responding
/// node or synthesized by the local stack for delivery failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    /// Transaction completed.
    Complete,
    /// Resource conflict at the responder; may be worth retrying.
    ConflictError,
    /// Data unavailable or hardware error at the responder.
    DataError,
    /// Operation not supported at this address.
    TypeError,
    /// Address not accessible on the target node.
    AddressError,
    /// The local stack could not transmit the request.
    SendError,
    /// Transaction cancelled before completion.
    Cancelled,
    /// Responder busy; the request was never accepted.
    Busy,
    /// The request's bus generation no longer matches the bus.
    Generation,
    /// No acknowledgment from the target node.
    NoAck,
    /// Any value outside the defined set (preserved, not dropped).
    Unknown(u32),
}

impl Rcode {
    /// Decodes the kernel/wire representation.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0x00 => Self::Complete,
            0x04 => Self::ConflictError,
            0x05 => Self::DataError,
            0x06 => Self::TypeError,
            0x07 => Self::AddressError,
            0x10 => Self::SendError,
            0x11 => Self::Cancelled,
            0x12 => Self::Busy,
            0x13 => Self::Generation,
            0x14 => Self::NoAck,
            other => Self::Unknown(other),
        }
    }

    /// The kernel/wire representation.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Complete => 0x00,
            Self::ConflictError => 0x04,
            Self::DataError => 0x05,
            Self::TypeError => 0x06,
            Self::AddressError => 0x07,
            Self::SendError => 0x10,
            Self::Cancelled => 0x11,
            Self::Busy => 0x12,
            Self::Generation => 0x13,
            Self::NoAck => 0x14,
            Self::Unknown(raw) => raw,
        }
    }

    /// `true` for [`Rcode::Complete`].
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("complete"),
            Self::ConflictError => f.write_str("conflict error"),
            Self::DataError => f.write_str("data error"),
            Self::TypeError => f.write_str("type error"),
            Self::AddressError => f.write_str("address error"),
            Self::SendError => f.write_str("send error"),
            Self::Cancelled => f.write_str("error: cancelled"),
            Self::Busy => f.write_str("error: busy"),
            Self::Generation => f.write_str("error: bus reset"),
            Self::NoAck => f.write_str("error: no ack"),
            Self::Unknown(raw) => write!(f, "unknown error (rcode {raw:#x})"),
        }
    }
}
