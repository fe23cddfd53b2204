//! Userspace access to Linux firewire character devices.
//!
//! Opens `/dev/fw*` nodes, negotiates version 4 of the kernel interface,
//! and drives its ioctl + event-stream protocol:
//!
//! - asynchronous read / write / broadcast / lock transactions, stamped
//!   with the bus generation and resubmitted when a reset races them
//! - PHY packet exchanges matched against `(mask, bits)` reply patterns,
//!   including Self-ID burst collection for pings
//! - FCP command/response pairing over the CSR FCP registers
//! - remote PHY register scans for vendor identification
//!
//! # Quick start
//!
//! ```no_run
//! use firewire_bus::{DeviceStream, NodeDirectory, TransactionEngine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = NodeDirectory::discover()?;
//! let local = directory.local_node(None)?;
//! let mut engine = TransactionEngine::new(DeviceStream::open(&local.path)?);
//!
//! let data = engine.read(0xffff_f000_021c, 4)?;
//! println!("bus manager id: {data:02x?}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod cdev;
mod discovery;
mod engine;
mod error;
mod event;
mod lock;
mod phy_scan;
mod stream;
pub mod testing;

pub use discovery::{NodeDirectory, NodeInfo, Target};
pub use engine::{AsyncRequest, PhyReply, TransactionEngine};
pub use error::{FwError, Result};
pub use event::{BusResetEvent, Event, PhyPacketEvent, RequestEvent, ResponseEvent};
pub use lock::{encode_operands, LockOp};
pub use phy_scan::scan_phy_registers;
pub use stream::{BusResetKind, DeviceStream, EventSource};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        BusResetKind, DeviceStream, EventSource, FwError, LockOp, NodeDirectory, NodeInfo,
        PhyReply, Result, Target, TransactionEngine,
    };
}
