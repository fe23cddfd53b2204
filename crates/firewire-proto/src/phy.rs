//! PHY packet construction and reply matching.
//!
//! PHY packets are two 32-bit words. For every standard packet the second
//! word is the bitwise complement of the first; VersaPHY packets (top two
//! bits of the first word set) carry an explicit second word instead.
//!
//! Replies are matched with a `(mask, bits)` pattern: an inbound word `q`
//! answers the outstanding request when `q & mask == bits`. The builders
//! below come in pairs, one for the request word and one for the expected
//! reply bits, with the matching mask alongside.

/// A two-word PHY packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyPacket {
    /// First quadlet (the packet proper).
    pub d0: u32,
    /// Second quadlet: complement for standard packets, raw for VersaPHY.
    pub d1: u32,
}

impl PhyPacket {
    /// Standard packet: `d1` is the bitwise complement of `d0`.
    #[must_use]
    pub const fn symmetric(d0: u32) -> Self {
        Self { d0, d1: !d0 }
    }

    /// Packet with an explicit second quadlet (VersaPHY), untransformed.
    #[must_use]
    pub const fn raw(d0: u32, d1: u32) -> Self {
        Self { d0, d1 }
    }
}

/// `true` when `q0` carries the VersaPHY tag (top two bits `0b11`).
#[must_use]
pub const fn is_versaphy(q0: u32) -> bool {
    q0 & 0xc000_0000 == 0xc000_0000
}

// ── Configuration, ping, link-on ─────────────────────────────────────────────

/// Forces the addressed PHY to become root after the next bus reset.
const FORCE_ROOT: u32 = 1 << 23;
/// Marks the gap-count field as valid.
const SET_GAP_COUNT: u32 = 1 << 22;

/// PHY configuration packet. `root` names the PHY to force as root;
/// `gap_count` sets the arbitration gap count (0–63). A packet with neither
/// field is all zero and means nothing.
#[must_use]
pub fn config(root: Option<u32>, gap_count: Option<u32>) -> u32 {
    let mut q = 0;
    if let Some(phy_id) = root {
        q |= FORCE_ROOT | (phy_id << 24);
    }
    if let Some(gap) = gap_count {
        q |= SET_GAP_COUNT | (gap << 16);
    }
    q
}

/// Ping packet for `phy_id`. The reply is that PHY's Self-ID burst.
#[must_use]
pub const fn ping(phy_id: u32) -> u32 {
    phy_id << 24
}

/// Mask for a ping reply: the packet tag and the source PHY id.
pub const PING_REPLY_MASK: u32 = 0xff00_0000;

/// Expected masked bits of a ping reply: a Self-ID-tagged packet from
/// `phy_id`.
#[must_use]
pub const fn ping_reply_bits(phy_id: u32) -> u32 {
    (2 << 30) | (phy_id << 24)
}

/// Link-on packet for `phy_id`.
#[must_use]
pub const fn link_on(phy_id: u32) -> u32 {
    (1 << 30) | (phy_id << 24)
}

/// Resume-all-ports packet, sent with the local PHY's id.
#[must_use]
pub const fn resume_all(phy_id: u32) -> u32 {
    (0xf << 18) | (phy_id << 24)
}

// ── Remote register access ───────────────────────────────────────────────────

/// Remote access packet for base registers 0–7 of `phy_id`.
#[must_use]
pub const fn remote_access(phy_id: u32, register: u32) -> u32 {
    (phy_id << 24) | (1 << 18) | ((register & 7) << 8)
}

/// Remote access packet for paged registers 8–15: `page` 0–7, `port` 0–15;
/// the register number's low three bits select within the page.
#[must_use]
pub const fn remote_access_paged(phy_id: u32, page: u32, port: u32, register: u32) -> u32 {
    (phy_id << 24) | (5 << 18) | (page << 15) | (port << 11) | ((register & 7) << 8)
}

/// Mask for a remote-access reply: everything but the value byte.
pub const REMOTE_REPLY_MASK: u32 = 0xffff_ff00;

/// A remote-access reply echoes the request with the reply opcode (request
/// opcode + 2) and the register value in bits 0–7.
#[must_use]
pub const fn remote_reply_bits(request: u32) -> u32 {
    request | (2 << 18)
}

/// Mask keying a paged reply on source PHY id, opcode and page — port,
/// register and value bits are left free so one pattern matches a whole
/// register scan.
pub const SCAN_REPLY_MASK: u32 = 0xffff_8000;

/// Paged-reply pattern for [`SCAN_REPLY_MASK`].
#[must_use]
pub const fn remote_reply_paged(phy_id: u32, page: u32, port: u32) -> u32 {
    (phy_id << 24) | (7 << 18) | (page << 15) | (port << 11)
}

/// Register number carried in a remote reply (bits 8–10).
#[must_use]
pub const fn reply_register(q: u32) -> u32 {
    (q >> 8) & 7
}

/// Register value carried in a remote reply (bits 0–7).
#[must_use]
pub const fn reply_value(q: u32) -> u8 {
    (q & 0xff) as u8
}

// ── Remote port commands ─────────────────────────────────────────────────────

/// Remote port command opcodes (1394a extended PHY packets; standby and
/// restore are the 1394b additions, carried as opcode 7 plus a modifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    /// No operation; still elicits a confirmation with the port status.
    Nop,
    /// Disable the port.
    Disable,
    /// Suspend the port.
    Suspend,
    /// Clear the port's fault bit.
    Clear,
    /// Enable the port.
    Enable,
    /// Resume the port.
    Resume,
    /// Put the port into standby.
    Standby,
    /// Restore a port from standby.
    Restore,
}

impl RemoteCommand {
    /// Command bits as placed in the packet.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Nop => 0,
            Self::Disable => 1,
            Self::Suspend => 2,
            Self::Clear => 4,
            Self::Enable => 5,
            Self::Resume => 6,
            Self::Standby => 7 | (1 << 15),
            Self::Restore => 7 | (2 << 15),
        }
    }
}

/// Remote command packet addressing `port` of `phy_id`.
#[must_use]
pub const fn remote_command(phy_id: u32, port: u32, command: RemoteCommand) -> u32 {
    (phy_id << 24) | (0x8 << 18) | command.bits() | (port << 11)
}

/// Mask for a remote-command confirmation: echoed id/opcode/port/command
/// bits, with the status bits (3–8) left free.
pub const REMOTE_CONFIRMATION_MASK: u32 = 0xff3f_f807;

/// Expected confirmation bits for a remote command.
#[must_use]
pub const fn remote_confirmation_bits(phy_id: u32, port: u32, command: RemoteCommand) -> u32 {
    (phy_id << 24) | (0xa << 18) | command.bits() | (port << 11)
}

/// Status bits carried in a remote-command confirmation.
pub mod port_status {
    /// Command accepted; a confirmation with this bit clear means the PHY
    /// rejected the command.
    pub const OK: u32 = 1 << 3;
    /// Port is disabled.
    pub const DISABLED: u32 = 1 << 4;
    /// Bias voltage detected.
    pub const BIAS: u32 = 1 << 5;
    /// Port is connected.
    pub const CONNECTED: u32 = 1 << 6;
    /// Fault latched.
    pub const FAULT: u32 = 1 << 7;
    /// Standby fault latched.
    pub const STANDBY_FAULT: u32 = 1 << 8;
    /// All condition bits (everything above [`OK`]).
    pub const CONDITIONS: u32 = 0x1f0;
}

// ── Timing ───────────────────────────────────────────────────────────────────

/// Converts a ping round-trip time from PHY clock ticks (24.576 MHz) to
/// nanoseconds, rounded to nearest.
#[must_use]
pub const fn ping_ticks_to_nanos(ticks: u32) -> u64 {
    (ticks as u64 * 1_000_000 + 12_288) / 24_576
}
