//! Bus and node discovery.
//!
//! Enumerates `/dev/fw*` nodes and resolves the user-facing ways of naming
//! a bus (card number, device name, device path) or a target node (PHY id,
//! device name, device path) onto concrete devices.

use std::path::{Path, PathBuf};

use crate::error::{FwError, Result};
use crate::stream::{DeviceStream, EventSource};

/// Snapshot of one `/dev/fw*` node taken during discovery.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Device node path.
    pub path: PathBuf,
    /// Card (bus) index.
    pub card: u32,
    /// Node id of the device itself.
    pub node_id: u32,
    /// Node id of the bus's local node.
    pub local_node_id: u32,
    /// Bus generation at probe time.
    pub generation: u32,
}

impl NodeInfo {
    /// `true` when this device is its bus's local node.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.node_id == self.local_node_id
    }

    /// PHY id (node id with the bus bits masked off).
    #[must_use]
    pub const fn phy_id(&self) -> u32 {
        self.node_id & 0x3f
    }
}

/// A target node named on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// PHY id of the node.
    pub phy_id: u32,
    /// Card the node was found on, when it was named by device rather than
    /// by PHY id.
    pub card: Option<u32>,
}

/// All firewire nodes visible in `/dev`, in device-number order.
#[derive(Debug)]
pub struct NodeDirectory {
    nodes: Vec<NodeInfo>,
}

impl NodeDirectory {
    /// Probes every `/dev/fw*` node.
    ///
    /// Nodes that fail to probe are skipped with a warning. Errors only
    /// when not a single node could be opened: `PermissionDenied` if any
    /// open was refused, `KernelTooOld` if any node was rejected for its
    /// interface version, `NoDevicesFound` otherwise.
    pub fn discover() -> Result<Self> {
        Self::discover_in(Path::new("/dev"))
    }

    fn discover_in(dev: &Path) -> Result<Self> {
        let mut candidates: Vec<(u32, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dev).map_err(|e| FwError::Io { source: e })? {
            let entry = entry.map_err(|e| FwError::Io { source: e })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(index) = name
                .strip_prefix("fw")
                .and_then(|rest| rest.parse::<u32>().ok())
            else {
                continue;
            };
            candidates.push((index, entry.path()));
        }
        candidates.sort_unstable_by_key(|(index, _)| *index);

        let mut nodes = Vec::new();
        let mut denied = false;
        let mut too_old = None;
        for (_, path) in candidates {
            match probe(&path) {
                Ok(node) => nodes.push(node),
                Err(FwError::Io { source })
                    if source.kind() == std::io::ErrorKind::PermissionDenied =>
                {
                    denied = true;
                    tracing::warn!(path = %path.display(), "permission denied");
                }
                Err(e @ FwError::KernelTooOld { .. }) => {
                    tracing::warn!(path = %path.display(), error = %e, "probe failed");
                    too_old = Some(e);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "probe failed");
                }
            }
        }
        if nodes.is_empty() {
            return Err(if denied {
                FwError::PermissionDenied
            } else if let Some(e) = too_old {
                e
            } else {
                FwError::NoDevicesFound
            });
        }
        Ok(Self { nodes })
    }

    /// Probed nodes, ordered by device number.
    #[must_use]
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    /// Picks the local node of the bus named by `bus`: a card number, a
    /// device name, or a device path. `None` picks the first local node
    /// found.
    pub fn local_node(&self, bus: Option<&str>) -> Result<&NodeInfo> {
        let Some(spec) = bus else {
            return self
                .nodes
                .iter()
                .find(|node| node.is_local())
                .ok_or(FwError::LocalNodeNotFound { card: None });
        };
        if let Some(card) = parse_number(spec) {
            let card = u32::try_from(card)
                .map_err(|_| FwError::invalid_argument("invalid bus number"))?;
            return self.local_node_for_card(card);
        }
        let probed = probe(&device_path(spec))?;
        self.local_node_for_card(probed.card)
    }

    /// Picks the local node of card `card`.
    pub fn local_node_for_card(&self, card: u32) -> Result<&NodeInfo> {
        self.nodes
            .iter()
            .find(|node| node.card == card && node.is_local())
            .ok_or(FwError::LocalNodeNotFound { card: Some(card) })
    }

    /// Resolves a target node named on the command line: a bare PHY id in
    /// `0..=63`, or a device name or path whose PHY id (and card) is looked
    /// up by probing.
    pub fn resolve_target(&self, spec: &str) -> Result<Target> {
        if let Some(value) = parse_number(spec) {
            let phy_id = u32::try_from(value)
                .ok()
                .filter(|&id| id <= 63)
                .ok_or_else(|| FwError::invalid_argument("invalid node id"))?;
            return Ok(Target { phy_id, card: None });
        }
        let node = probe(&device_path(spec))?;
        Ok(Target {
            phy_id: node.node_id & 0x3f,
            card: Some(node.card),
        })
    }

    #[cfg(test)]
    fn from_nodes(nodes: Vec<NodeInfo>) -> Self {
        Self { nodes }
    }
}

fn probe(path: &Path) -> Result<NodeInfo> {
    let stream = DeviceStream::open(path)?;
    Ok(NodeInfo {
        path: stream.path().to_path_buf(),
        card: stream.card(),
        node_id: stream.node_id(),
        local_node_id: stream.local_node_id(),
        generation: stream.initial_generation(),
    })
}

fn device_path(spec: &str) -> PathBuf {
    if spec.contains('/') {
        PathBuf::from(spec)
    } else {
        Path::new("/dev").join(spec)
    }
}

/// Integer parse with `strtol`-style base detection: `0x` means hex, a
/// leading zero means octal, anything else decimal.
fn parse_number(spec: &str) -> Option<i64> {
    let (negative, digits) = match spec.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, spec.strip_prefix('+').unwrap_or(spec)),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse().ok()?
    };
    Some(if negative { -value } else { value })
}
