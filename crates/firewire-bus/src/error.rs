//! Error types for bus operations

use std::path::PathBuf;

use firewire_proto::rcode::Rcode;
use thiserror::Error;

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, FwError>;

/// Errors that can occur while talking to a FireWire bus
#[derive(Debug, Error)]
pub enum FwError {
    /// Device node does not exist
    #[error("device not found: {path}")]
    DeviceNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// No usable FireWire device nodes on the system
    #[error("no fw devices found")]
    NoDevicesFound,

    /// Device nodes exist but none could be opened
    #[error("/dev/fw*: permission denied")]
    PermissionDenied,

    /// The file exists but does not speak the firewire cdev ABI
    #[error("{path}: not a fw device")]
    NotFirewireDevice {
        /// Path that was probed
        path: PathBuf,
    },

    /// The device is a remote node, but the operation needs the local one
    #[error("{path}: not a local node")]
    NotLocalNode {
        /// Path of the remote node
        path: PathBuf,
    },

    /// No local node matches the bus selection
    #[error("local node{} not found", .card.map(|c| format!(" for card {c}")).unwrap_or_default())]
    LocalNodeNotFound {
        /// Card index that was requested, if any
        card: Option<u32>,
    },

    /// The kernel implements an interface version older than we need
    #[error("kernel interface version {version} is too old (need 4)")]
    KernelTooOld {
        /// Version the kernel reported
        version: u32,
    },

    /// I/O error during device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// An ioctl was rejected by the kernel
    #[error("{op} ioctl failed: {source}")]
    Ioctl {
        /// Name of the ioctl
        op: &'static str,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// A poll deadline passed with no event queued
    #[error("timeout ({waiting})")]
    Timeout {
        /// What the transaction was still missing
        waiting: &'static str,
    },

    /// The kernel delivered fewer bytes than the event type requires
    #[error("short event read ({length} bytes)")]
    ShortEvent {
        /// Bytes actually delivered
        length: usize,
    },

    /// A bus reset arrived in the middle of a non-retryable exchange
    #[error("bus reset")]
    BusReset,

    /// The remote node answered with a non-COMPLETE response code
    #[error("{rcode}")]
    Remote {
        /// Response code from the peer
        rcode: Rcode,
    },

    /// A PHY packet was not acknowledged by the bus
    #[error("PHY packet failed: rcode {}", .rcode.as_raw())]
    PhySendFailed {
        /// Response code from the sent event
        rcode: Rcode,
    },

    /// Lock operand is not 32 or 64 bits wide
    #[error("data size must be 32 or 64 bits")]
    OperandWidth {
        /// Width that was supplied, in bytes
        bytes: usize,
    },

    /// Dual lock operands differ in width
    #[error("both data blocks must have the same size")]
    OperandSizeMismatch {
        /// First operand width in bytes
        first: usize,
        /// Second operand width in bytes
        second: usize,
    },

    /// Wrong number of lock operands for the operation
    #[error("{op} takes {expected} operand(s), got {given}")]
    OperandCount {
        /// Lock operation name
        op: &'static str,
        /// Operands the operation requires
        expected: usize,
        /// Operands supplied
        given: usize,
    },

    /// A caller-supplied value fails a protocol precondition
    #[error("{what}")]
    InvalidArgument {
        /// Description of the rejected value
        what: String,
    },
}

impl FwError {
    /// Create a device not found error
    pub fn device_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DeviceNotFound { path: path.into() }
    }

    /// Create a not-a-firewire-device error
    pub fn not_firewire_device(path: impl Into<PathBuf>) -> Self {
        Self::NotFirewireDevice { path: path.into() }
    }

    /// Create a not-a-local-node error
    pub fn not_local_node(path: impl Into<PathBuf>) -> Self {
        Self::NotLocalNode { path: path.into() }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument { what: what.into() }
    }

    /// `true` for the per-node timeout a multi-PHY scan may skip over
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
