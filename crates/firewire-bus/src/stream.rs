//! Device event streams.
//!
//! [`EventSource`] is the seam between the transaction engine and the
//! kernel: submit operations, pull one event at a time. [`DeviceStream`] is
//! the real implementation over an open `/dev/fw*` handle;
//! [`crate::testing::ScriptedStream`] drives the engine in tests.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use firewire_proto::phy::PhyPacket;
use rustix::event::{poll, PollFd, PollFlags};
use rustix::io::Errno;

use crate::cdev;
use crate::engine::AsyncRequest;
use crate::error::{FwError, Result};
use crate::event::Event;

/// Largest event record we accept (request events carry payloads).
const EVENT_BUFFER_SIZE: usize = 16 * 1024;

/// Kind of bus reset to initiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusResetKind {
    /// 1394a arbitrated (short) reset.
    Short,
    /// Long reset.
    Long,
}

impl BusResetKind {
    const fn raw(self) -> u32 {
        match self {
            Self::Short => cdev::SHORT_RESET,
            Self::Long => cdev::LONG_RESET,
        }
    }
}

/// One node's view of its bus: outbound submissions plus a single inbound
/// event queue.
pub trait EventSource {
    /// Bus generation at the time the source was opened.
    fn initial_generation(&self) -> u32;

    /// Submits a PHY packet stamped with `generation`.
    fn submit_phy(&mut self, packet: PhyPacket, generation: u32) -> Result<()>;

    /// Submits an async request (normal or broadcast per the request).
    fn submit_async(&mut self, request: &AsyncRequest) -> Result<()>;

    /// Answers an inbound request event.
    fn submit_response(&mut self, handle: u32, rcode: u32) -> Result<()>;

    /// Starts delivery of inbound PHY packets. Idempotent.
    fn listen_phy(&mut self) -> Result<()>;

    /// Claims `offset..offset+length` on the local node so inbound requests
    /// to it become events.
    fn allocate_range(&mut self, offset: u64, length: u32) -> Result<()>;

    /// Blocks up to `timeout` for one event; `None` means the deadline
    /// passed with the queue empty.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<Event>>;
}

/// An open firewire character device.
#[derive(Debug)]
pub struct DeviceStream {
    file: File,
    path: PathBuf,
    buffer: Vec<u8>,
    card: u32,
    node_id: u32,
    local_node_id: u32,
    root_node_id: u32,
    initial_generation: u32,
}

impl DeviceStream {
    /// Opens a device node and negotiates interface version 4.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` when the node does not exist, `NotFirewireDevice`
    /// when it exists but rejects `GET_INFO`, `KernelTooOld` when the kernel
    /// implements an interface older than version 4.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FwError::device_not_found(&path)
                } else {
                    FwError::Io { source: e }
                }
            })?;

        let mut snapshot = cdev::BusResetSnapshot::default();
        let mut info = cdev::GetInfo {
            version: cdev::ABI_VERSION,
            bus_reset: std::ptr::from_mut(&mut snapshot) as u64,
            ..cdev::GetInfo::default()
        };
        cdev::get_info(&file, &mut info).map_err(|e| match &e {
            FwError::Ioctl { source, .. }
                if matches!(
                    source.raw_os_error(),
                    Some(libc::ENOTTY) | Some(libc::EINVAL)
                ) =>
            {
                FwError::not_firewire_device(&path)
            }
            _ => e,
        })?;
        if info.version < cdev::ABI_VERSION {
            return Err(FwError::KernelTooOld {
                version: info.version,
            });
        }

        tracing::debug!(
            path = %path.display(),
            card = info.card,
            node_id = format_args!("{:#06x}", snapshot.node_id),
            generation = snapshot.generation,
            "opened device"
        );

        Ok(Self {
            file,
            path,
            buffer: vec![0; EVENT_BUFFER_SIZE],
            card: info.card,
            node_id: snapshot.node_id,
            local_node_id: snapshot.local_node_id,
            root_node_id: snapshot.root_node_id,
            initial_generation: snapshot.generation,
        })
    }

    /// Device node path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Card (bus) index this node hangs off.
    #[must_use]
    pub const fn card(&self) -> u32 {
        self.card
    }

    /// Raw node id of the device (bus bits included).
    #[must_use]
    pub const fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Raw node id of the bus's local node, as of open time.
    #[must_use]
    pub const fn local_node_id(&self) -> u32 {
        self.local_node_id
    }

    /// PHY id of the device (node id with the bus bits masked off).
    #[must_use]
    pub const fn phy_id(&self) -> u32 {
        self.node_id & 0x3f
    }

    /// PHY id of the bus's root node, as of open time.
    #[must_use]
    pub const fn root_phy_id(&self) -> u32 {
        self.root_node_id & 0x3f
    }

    /// `true` when this device is the bus's local node.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.node_id == self.local_node_id
    }

    /// Errors with `NotLocalNode` unless [`Self::is_local`].
    pub fn require_local(&self) -> Result<()> {
        if self.is_local() {
            Ok(())
        } else {
            Err(FwError::not_local_node(&self.path))
        }
    }

    /// Schedules a bus reset. The kernel reports no completion for this;
    /// the reset shows up later as a `BusReset` event.
    pub fn initiate_bus_reset(&mut self, kind: BusResetKind) -> Result<()> {
        let mut reset = cdev::InitiateBusReset { kind: kind.raw() };
        cdev::initiate_bus_reset(&self.file, &mut reset)
    }
}

impl EventSource for DeviceStream {
    fn initial_generation(&self) -> u32 {
        self.initial_generation
    }

    fn submit_phy(&mut self, packet: PhyPacket, generation: u32) -> Result<()> {
        let mut send = cdev::SendPhyPacket {
            closure: 0,
            data: [packet.d0, packet.d1],
            generation,
        };
        cdev::send_phy_packet(&self.file, &mut send)
    }

    fn submit_async(&mut self, request: &AsyncRequest) -> Result<()> {
        let mut send = cdev::SendRequest {
            tcode: request.tcode,
            length: request.length,
            offset: request.offset,
            closure: 0,
            data: if request.data.is_empty() {
                0
            } else {
                request.data.as_ptr() as u64
            },
            generation: request.generation,
        };
        if request.broadcast {
            cdev::send_broadcast_request(&self.file, &mut send)
        } else {
            cdev::send_request(&self.file, &mut send)
        }
    }

    fn submit_response(&mut self, handle: u32, rcode: u32) -> Result<()> {
        let mut response = cdev::SendResponse {
            rcode,
            length: 0,
            data: 0,
            handle,
        };
        cdev::send_response(&self.file, &mut response)
    }

    fn listen_phy(&mut self) -> Result<()> {
        let mut receive = cdev::ReceivePhyPackets { closure: 0 };
        cdev::receive_phy_packets(&self.file, &mut receive)
    }

    fn allocate_range(&mut self, offset: u64, length: u32) -> Result<()> {
        let mut allocate = cdev::Allocate {
            offset,
            closure: 0,
            length,
            handle: 0,
            region_end: offset + u64::from(length),
        };
        cdev::allocate(&self.file, &mut allocate)
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<Event>> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        loop {
            let mut fds = [PollFd::new(&self.file, PollFlags::IN)];
            match poll(&mut fds, millis) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(Errno::INTR) => {}
                Err(e) => return Err(FwError::Io { source: e.into() }),
            }
        }
        let length = rustix::io::read(&self.file, &mut self.buffer)
            .map_err(|e| FwError::Io { source: e.into() })?;
        Event::decode(&self.buffer[..length]).map(Some)
    }
}
