//! Linux firewire character-device ABI
//!
//! Struct layouts and ioctl numbers from `<linux/firewire-cdev.h>`, plus
//! thin typed wrappers around the ioctls this crate issues. All unsafe code
//! in the crate lives here.
//!
//! Events are not read through structs: the kernel delivers them as length-
//! prefixed byte records on `read(2)`, decoded in [`crate::event`].

use std::fs::File;
use std::os::raw::c_ulong;
use std::os::unix::io::AsRawFd;

use crate::error::{FwError, Result};

/// Interface version this client implements and requires.
///
/// Version 4 brought `SEND_PHY_PACKET`/`RECEIVE_PHY_PACKETS`, the
/// `REQUEST2` event and ranged `ALLOCATE`.
pub const ABI_VERSION: u32 = 4;

/// `FW_CDEV_LONG_RESET`
pub const LONG_RESET: u32 = 0;
/// `FW_CDEV_SHORT_RESET`
pub const SHORT_RESET: u32 = 1;

// ── Event type codes (first quadlet after the closure) ───────────────────────

/// `FW_CDEV_EVENT_BUS_RESET`
pub const EVENT_BUS_RESET: u32 = 0x00;
/// `FW_CDEV_EVENT_RESPONSE`
pub const EVENT_RESPONSE: u32 = 0x01;
/// `FW_CDEV_EVENT_REQUEST` (interface versions < 4)
pub const EVENT_REQUEST: u32 = 0x02;
/// `FW_CDEV_EVENT_REQUEST2`
pub const EVENT_REQUEST2: u32 = 0x06;
/// `FW_CDEV_EVENT_PHY_PACKET_SENT`
pub const EVENT_PHY_PACKET_SENT: u32 = 0x07;
/// `FW_CDEV_EVENT_PHY_PACKET_RECEIVED`
pub const EVENT_PHY_PACKET_RECEIVED: u32 = 0x08;

// ── Request structs ───────────────────────────────────────────────────────────

/// `struct fw_cdev_get_info`
#[repr(C)]
#[derive(Debug, Default)]
pub struct GetInfo {
    /// In: version the client implements; out: version the kernel implements.
    pub version: u32,
    pub rom_length: u32,
    pub rom: u64,
    /// Userspace address of a [`BusResetSnapshot`] to fill, or 0.
    pub bus_reset: u64,
    pub bus_reset_closure: u64,
    pub card: u32,
}

/// `struct fw_cdev_event_bus_reset`, used here as the `GET_INFO` snapshot
/// target.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct BusResetSnapshot {
    pub closure: u64,
    pub kind: u32,
    pub node_id: u32,
    pub local_node_id: u32,
    pub bm_node_id: u32,
    pub irm_node_id: u32,
    pub root_node_id: u32,
    pub generation: u32,
}

/// `struct fw_cdev_send_request`
#[repr(C)]
#[derive(Debug, Default)]
pub struct SendRequest {
    pub tcode: u32,
    pub length: u32,
    pub offset: u64,
    pub closure: u64,
    /// Userspace address of the outbound payload, or 0.
    pub data: u64,
    pub generation: u32,
}

/// `struct fw_cdev_send_response`
#[repr(C)]
#[derive(Debug, Default)]
pub struct SendResponse {
    pub rcode: u32,
    pub length: u32,
    pub data: u64,
    pub handle: u32,
}

/// `struct fw_cdev_allocate`
#[repr(C)]
#[derive(Debug, Default)]
pub struct Allocate {
    pub offset: u64,
    pub closure: u64,
    pub length: u32,
    /// Out: handle naming the allocation.
    pub handle: u32,
    /// Upper bound for the kernel's placement; `offset + length` pins the
    /// range exactly.
    pub region_end: u64,
}

/// `struct fw_cdev_initiate_bus_reset`
#[repr(C)]
#[derive(Debug, Default)]
pub struct InitiateBusReset {
    /// [`SHORT_RESET`] or [`LONG_RESET`].
    pub kind: u32,
}

/// `struct fw_cdev_send_phy_packet`
#[repr(C)]
#[derive(Debug, Default)]
pub struct SendPhyPacket {
    pub closure: u64,
    pub data: [u32; 2],
    pub generation: u32,
}

/// `struct fw_cdev_receive_phy_packets`
#[repr(C)]
#[derive(Debug, Default)]
pub struct ReceivePhyPackets {
    pub closure: u64,
}

/// firewire cdev ioctl numbers (from Linux kernel headers)
///
/// These mirror the `_IOW`/`_IOWR` macros: direction in bits 31–30, struct
/// size in bits 29–16, the `'#'` type byte in 15–8, the command number in
/// 7–0.
mod ioctls {
    use std::mem::size_of;
    use std::os::raw::c_ulong;

    use super::{
        Allocate, GetInfo, InitiateBusReset, ReceivePhyPackets, SendPhyPacket, SendRequest,
        SendResponse,
    };

    const DIR_WRITE: c_ulong = 1;
    const DIR_READ: c_ulong = 2;

    /// `'#'`
    const FW_TYPE: c_ulong = 0x23;

    const fn ioc(dir: c_ulong, nr: u8, size: usize) -> c_ulong {
        dir << 30 | (size as c_ulong) << 16 | FW_TYPE << 8 | nr as c_ulong
    }

    const fn iow(nr: u8, size: usize) -> c_ulong {
        ioc(DIR_WRITE, nr, size)
    }

    const fn iowr(nr: u8, size: usize) -> c_ulong {
        ioc(DIR_READ | DIR_WRITE, nr, size)
    }

    pub const GET_INFO: c_ulong = iowr(0x00, size_of::<GetInfo>());
    pub const SEND_REQUEST: c_ulong = iow(0x01, size_of::<SendRequest>());
    pub const ALLOCATE: c_ulong = iowr(0x02, size_of::<Allocate>());
    pub const SEND_RESPONSE: c_ulong = iow(0x04, size_of::<SendResponse>());
    pub const INITIATE_BUS_RESET: c_ulong = iow(0x05, size_of::<InitiateBusReset>());
    pub const SEND_BROADCAST_REQUEST: c_ulong = iow(0x12, size_of::<SendRequest>());
    pub const SEND_PHY_PACKET: c_ulong = iowr(0x15, size_of::<SendPhyPacket>());
    pub const RECEIVE_PHY_PACKETS: c_ulong = iow(0x16, size_of::<ReceivePhyPackets>());
}

/// Issues one ioctl, mapping failure to [`FwError::Ioctl`] with the
/// operation's name.
fn ioctl<T>(file: &File, op: c_ulong, name: &'static str, arg: &mut T) -> Result<()> {
    // SAFETY: `op` is a constant from `ioctls` whose size field equals
    // `size_of::<T>()` at every call site below, so the kernel reads/writes
    // exactly the struct `arg` points to, which lives for the whole call.
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), op as _, std::ptr::from_mut(arg)) };
    if ret < 0 {
        return Err(FwError::Ioctl {
            op: name,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// `GET_INFO`: negotiate the interface version and snapshot the bus state.
pub fn get_info(file: &File, info: &mut GetInfo) -> Result<()> {
    ioctl(file, ioctls::GET_INFO, "GET_INFO", info)
}

/// `SEND_REQUEST`: submit an outbound asynchronous request.
pub fn send_request(file: &File, request: &mut SendRequest) -> Result<()> {
    ioctl(file, ioctls::SEND_REQUEST, "SEND_REQUEST", request)
}

/// `SEND_BROADCAST_REQUEST`: like [`send_request`] but to the broadcast
/// node id.
pub fn send_broadcast_request(file: &File, request: &mut SendRequest) -> Result<()> {
    ioctl(
        file,
        ioctls::SEND_BROADCAST_REQUEST,
        "SEND_BROADCAST_REQUEST",
        request,
    )
}

/// `ALLOCATE`: claim an address range on the local node.
pub fn allocate(file: &File, allocate: &mut Allocate) -> Result<()> {
    ioctl(file, ioctls::ALLOCATE, "ALLOCATE", allocate)
}

/// `SEND_RESPONSE`: answer an inbound request event.
pub fn send_response(file: &File, response: &mut SendResponse) -> Result<()> {
    ioctl(file, ioctls::SEND_RESPONSE, "SEND_RESPONSE", response)
}

/// `INITIATE_BUS_RESET`: schedule a bus reset.
pub fn initiate_bus_reset(file: &File, reset: &mut InitiateBusReset) -> Result<()> {
    ioctl(file, ioctls::INITIATE_BUS_RESET, "INITIATE_BUS_RESET", reset)
}

/// `SEND_PHY_PACKET`: submit an outbound PHY packet.
pub fn send_phy_packet(file: &File, packet: &mut SendPhyPacket) -> Result<()> {
    ioctl(file, ioctls::SEND_PHY_PACKET, "SEND_PHY_PACKET", packet)
}

/// `RECEIVE_PHY_PACKETS`: start delivering inbound PHY packets as events.
pub fn receive_phy_packets(file: &File, receive: &mut ReceivePhyPackets) -> Result<()> {
    ioctl(
        file,
        ioctls::RECEIVE_PHY_PACKETS,
        "RECEIVE_PHY_PACKETS",
        receive,
    )
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn struct_sizes_match_kernel_abi() {
        assert_eq!(size_of::<GetInfo>(), 40);
        assert_eq!(size_of::<BusResetSnapshot>(), 40);
        assert_eq!(size_of::<SendRequest>(), 40);
        assert_eq!(size_of::<SendResponse>(), 24);
        assert_eq!(size_of::<Allocate>(), 32);
        assert_eq!(size_of::<InitiateBusReset>(), 4);
        assert_eq!(size_of::<SendPhyPacket>(), 24);
        assert_eq!(size_of::<ReceivePhyPackets>(), 8);
    }

    #[test]
    fn opcodes_match_kernel_abi() {
        assert_eq!(ioctls::GET_INFO, 0xc028_2300);
        assert_eq!(ioctls::SEND_REQUEST, 0x4028_2301);
        assert_eq!(ioctls::ALLOCATE, 0xc020_2302);
        assert_eq!(ioctls::SEND_RESPONSE, 0x4018_2304);
        assert_eq!(ioctls::INITIATE_BUS_RESET, 0x4004_2305);
        assert_eq!(ioctls::SEND_BROADCAST_REQUEST, 0x4028_2312);
        assert_eq!(ioctls::SEND_PHY_PACKET, 0xc018_2315);
        assert_eq!(ioctls::RECEIVE_PHY_PACKETS, 0x4008_2316);
    }
}
